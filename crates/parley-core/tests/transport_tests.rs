use std::time::Duration;

use parley_core::constants::models;
use parley_core::{ClaudeTransport, ContentBlock, GenerationParams, ModelProvider, ParleyError, Turn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Read one HTTP request (headers plus `content-length` body).
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve a single canned response and hand back the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });

    (url, handle)
}

fn hello() -> Vec<Turn> {
    vec![Turn::user(vec![ContentBlock::text("hello")])]
}

#[tokio::test]
async fn test_success_concatenates_text_blocks() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"id":"msg_1","type":"message","role":"assistant","model":"claude-3-5-sonnet-20241022",
            "content":[{"type":"text","text":"Hi "},{"type":"tool_use","id":"t","name":"x","input":{}},{"type":"text","text":"there"}],
            "stop_reason":"end_turn","usage":{"input_tokens":5,"output_tokens":2}}"#,
    )
    .await;

    let transport = ClaudeTransport::new().with_base_url(url);
    let completion = transport
        .send_completion(&hello(), Some("be brief"), &GenerationParams::default(), "sk-test")
        .await
        .unwrap();

    assert_eq!(completion.content, "Hi there");
    assert_eq!(completion.stop_reason.as_deref(), Some("end_turn"));
    assert_eq!(completion.usage.unwrap().output_tokens, 2);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v1/messages"));
    let lower = request.to_ascii_lowercase();
    assert!(lower.contains("x-api-key: sk-test"));
    assert!(lower.contains("anthropic-version: 2023-06-01"));

    let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
    let body: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["model"], models::PINNED_MODEL);
    assert_eq!(body["system"], "be brief");
    assert_eq!(body["messages"][0]["content"][0]["text"], "hello");
}

#[tokio::test]
async fn test_structured_error_becomes_provider_error() {
    let (url, _server) = serve_once(
        "529 Site Overloaded",
        r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
    )
    .await;

    let err = ClaudeTransport::new()
        .with_base_url(url)
        .send_completion(&hello(), None, &GenerationParams::default(), "sk-test")
        .await
        .unwrap_err();

    match err {
        ParleyError::Provider { kind, message } => {
            assert_eq!(kind, "overloaded_error");
            assert_eq!(message, "Overloaded");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unstructured_error_keeps_status_and_body() {
    let (url, _server) = serve_once("502 Bad Gateway", "upstream down").await;

    let err = ClaudeTransport::new()
        .with_base_url(url)
        .send_completion(&hello(), None, &GenerationParams::default(), "sk-test")
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, ParleyError::Provider { .. }));
    assert!(message.contains("502"));
    assert!(message.contains("upstream down"));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let _server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let err = ClaudeTransport::new()
        .with_base_url(url)
        .with_timeout(Duration::from_millis(200))
        .send_completion(&hello(), None, &GenerationParams::default(), "sk-test")
        .await
        .unwrap_err();

    assert!(matches!(err, ParleyError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = ClaudeTransport::new()
        .with_base_url(url)
        .send_completion(&hello(), None, &GenerationParams::default(), "sk-test")
        .await
        .unwrap_err();

    assert!(matches!(err, ParleyError::Network(_)), "got {err:?}");
}
