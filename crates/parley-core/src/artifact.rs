//! Extraction of `<artifact ...>` regions from assistant replies.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::Artifact;

const DEFAULT_KIND: &str = "text/plain";
const DEFAULT_TITLE: &str = "Artifact";

/// Reply text split into what is displayed inline and the artifacts it carried.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extracted {
    pub clean_text: String,
    pub artifacts: Vec<Artifact>,
}

// ── Patterns ────────────────────────────────────────────────────────────────────────────────────────────────

lazy_static! {
    static ref REGION: Regex =
        Regex::new(r"(?s)<artifact\b([^>]*)>(.*?)</artifact>").expect("artifact pattern is valid");
    static ref ATTRIBUTE: Regex =
        Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*"([^"]*)""#).expect("attribute pattern is valid");
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTRIBUTE
        .captures_iter(attrs)
        .find(|cap| &cap[1] == name)
        .map(|cap| cap[2].to_string())
}

/// Pull every terminated artifact region out of `text`, in source order.
///
/// Regions without an `identifier` are removed but yield no artifact.
/// Unterminated tags are left in the text as-is.
pub fn extract(text: &str) -> Extracted {
    let mut artifacts = Vec::new();

    for cap in REGION.captures_iter(text) {
        let attrs = &cap[1];
        let Some(id) = attribute(attrs, "identifier") else {
            tracing::debug!("dropping artifact region without identifier");
            continue;
        };
        artifacts.push(Artifact {
            id,
            kind: attribute(attrs, "type").unwrap_or_else(|| DEFAULT_KIND.to_string()),
            title: attribute(attrs, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            language: attribute(attrs, "language"),
            content: cap[2].trim().to_string(),
        });
    }

    let clean_text = REGION.replace_all(text, "").trim().to_string();

    Extracted {
        clean_text,
        artifacts,
    }
}

/// Render an artifact back into the tagged form [`extract`] understands.
pub fn embed(artifact: &Artifact) -> String {
    let mut open = format!(
        "<artifact identifier=\"{}\" type=\"{}\" title=\"{}\"",
        artifact.id, artifact.kind, artifact.title
    );
    if let Some(ref language) = artifact.language {
        open.push_str(&format!(" language=\"{language}\""));
    }
    format!("{open}>\n{}\n</artifact>", artifact.content)
}
