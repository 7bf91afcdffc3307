use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::{Collaborators, Reducer, Store};
use crate::error::{ErrorNotice, ParleyError, Result};
use crate::media;
use crate::model::{generate_id, Project, ProjectFile, ProjectFilePatch, ProjectPatch};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectState {
    /// Newest first, each with its file list.
    pub projects: Vec<Project>,
    pub active_project: Option<String>,
    pub pending: usize,
    pub error: Option<ErrorNotice>,
    pub projects_loaded: bool,
    /// Projects deleted locally; keeps in-flight fetches from restoring them.
    pub deleted: HashSet<String>,
}

impl ProjectState {
    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn active(&self) -> Option<&Project> {
        self.active_project.as_deref().and_then(|id| self.project(id))
    }

    fn project_mut(&mut self, id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone)]
pub enum ProjectAction {
    ProjectsLoaded(Vec<Project>),
    ProjectCreated(Project),
    ProjectUpdated { id: String, patch: ProjectPatch, updated_at: DateTime<Utc> },
    ProjectDeleted(String),
    ActiveProjectSet(Option<String>),
    FileAdded(ProjectFile),
    FileUpdated { project_id: String, file_id: String, patch: ProjectFilePatch },
    FileDeleted { project_id: String, file_id: String },
    RequestStarted,
    RequestFinished,
    ErrorRaised(ErrorNotice),
    ErrorDismissed,
    Invalidated,
}

pub struct ProjectReducer;

impl Reducer for ProjectReducer {
    type State = ProjectState;
    type Action = ProjectAction;

    fn reduce(state: &mut ProjectState, action: ProjectAction) {
        match action {
            ProjectAction::ProjectsLoaded(fetched) => {
                let mut projects: Vec<Project> = state
                    .projects
                    .drain(..)
                    .filter(|local| !fetched.iter().any(|p| p.id == local.id))
                    .collect();
                projects.extend(fetched.into_iter().filter(|p| !state.deleted.contains(&p.id)));
                state.projects = projects;
                state.projects_loaded = true;
            }
            ProjectAction::ProjectCreated(project) => {
                state.projects.insert(0, project);
            }
            ProjectAction::ProjectUpdated { id, patch, updated_at } => {
                if let Some(project) = state.project_mut(&id) {
                    if let Some(title) = patch.title {
                        project.title = title;
                    }
                    if let Some(description) = patch.description {
                        project.description = description;
                    }
                    project.updated_at = updated_at;
                }
            }
            ProjectAction::ProjectDeleted(id) => {
                state.projects.retain(|p| p.id != id);
                if state.active_project.as_deref() == Some(id.as_str()) {
                    state.active_project = None;
                }
                state.deleted.insert(id);
            }
            ProjectAction::ActiveProjectSet(id) => state.active_project = id,
            ProjectAction::FileAdded(file) => {
                if let Some(project) = state.project_mut(&file.project_id) {
                    project.files.push(file);
                }
            }
            ProjectAction::FileUpdated { project_id, file_id, patch } => {
                if let Some(file) = state
                    .project_mut(&project_id)
                    .and_then(|p| p.files.iter_mut().find(|f| f.id == file_id))
                {
                    if let Some(name) = patch.name {
                        file.name = name;
                    }
                    if let Some(path) = patch.path {
                        file.path = path;
                    }
                    if let Some(mime_type) = patch.mime_type {
                        file.mime_type = mime_type;
                    }
                }
            }
            ProjectAction::FileDeleted { project_id, file_id } => {
                if let Some(project) = state.project_mut(&project_id) {
                    project.files.retain(|f| f.id != file_id);
                }
            }
            ProjectAction::RequestStarted => state.pending += 1,
            ProjectAction::RequestFinished => state.pending = state.pending.saturating_sub(1),
            ProjectAction::ErrorRaised(notice) => state.error = Some(notice),
            ProjectAction::ErrorDismissed => state.error = None,
            ProjectAction::Invalidated => state.projects_loaded = false,
        }
    }
}

/// Projects and their context files.
pub struct ProjectStore {
    store: Store<ProjectReducer>,
    services: Collaborators,
}

impl ProjectStore {
    pub fn new(services: Collaborators) -> Self {
        Self {
            store: Store::spawn(ProjectState::default()),
            services,
        }
    }

    pub fn state(&self) -> ProjectState {
        self.store.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ProjectState> {
        self.store.subscribe()
    }

    async fn raise(&self, err: &ParleyError) {
        self.store
            .dispatch(ProjectAction::ErrorRaised(ErrorNotice::from(err)))
            .await;
    }

    async fn unconfirmed(&self, what: &str, err: ParleyError) {
        tracing::warn!("{} was applied locally but not persisted: {}", what, err);
        self.raise(&err).await;
    }

    async fn require_project(&self, id: &str) -> Result<Project> {
        match self.store.read(|s| s.project(id).cloned()) {
            Some(project) => Ok(project),
            None => {
                let err = ParleyError::not_found("Project", id);
                self.raise(&err).await;
                Err(err)
            }
        }
    }

    pub async fn dismiss_error(&self) {
        self.store.dispatch(ProjectAction::ErrorDismissed).await;
    }

    pub async fn invalidate(&self) {
        self.store.dispatch(ProjectAction::Invalidated).await;
    }

    /// Fetch all projects, then every project's files concurrently. A project
    /// whose files cannot be fetched is kept with an empty file list.
    pub async fn load_projects(&self) -> Result<()> {
        if self.store.read(|s| s.projects_loaded) {
            return Ok(());
        }

        self.store.dispatch(ProjectAction::RequestStarted).await;
        let result = self.fetch_projects().await;
        self.store.dispatch(ProjectAction::RequestFinished).await;

        match result {
            Ok(projects) => {
                self.store
                    .dispatch(ProjectAction::ProjectsLoaded(projects))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.raise(&e).await;
                Err(e)
            }
        }
    }

    async fn fetch_projects(&self) -> Result<Vec<Project>> {
        let projects = self.services.persistence.get_projects().await?;
        let persistence = &self.services.persistence;

        let file_lists = join_all(
            projects
                .iter()
                .map(|project| persistence.get_project_files(&project.id)),
        )
        .await;

        Ok(projects
            .into_iter()
            .zip(file_lists)
            .map(|(mut project, files)| {
                project.files = files.unwrap_or_else(|e| {
                    tracing::warn!("could not load files of project {}: {}", project.id, e);
                    Vec::new()
                });
                project
            })
            .collect())
    }

    pub async fn create_project(&self, title: impl Into<String>, description: impl Into<String>) -> Result<Project> {
        let project = Project::new(title, description);
        self.store
            .dispatch(ProjectAction::ProjectCreated(project.clone()))
            .await;
        tracing::info!("created project {}", project.id);

        if let Err(e) = self.services.persistence.create_project(&project).await {
            self.unconfirmed("project creation", e).await;
        }
        Ok(project)
    }

    pub async fn update_project(&self, id: &str, patch: ProjectPatch) -> Result<()> {
        self.require_project(id).await?;
        self.store
            .dispatch(ProjectAction::ProjectUpdated {
                id: id.to_string(),
                patch,
                updated_at: Utc::now(),
            })
            .await;

        if let Some(updated) = self.store.read(|s| s.project(id).cloned()) {
            if let Err(e) = self.services.persistence.update_project(&updated).await {
                self.unconfirmed("project update", e).await;
            }
        }
        Ok(())
    }

    pub async fn delete_project(&self, id: &str) -> Result<()> {
        self.store
            .dispatch(ProjectAction::ProjectDeleted(id.to_string()))
            .await;
        tracing::info!("deleted project {}", id);

        if let Err(e) = self.services.persistence.delete_project(id).await {
            self.unconfirmed("project deletion", e).await;
        }
        Ok(())
    }

    pub async fn select_project(&self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            self.require_project(id).await?;
        }
        self.store
            .dispatch(ProjectAction::ActiveProjectSet(id.map(str::to_string)))
            .await;
        Ok(())
    }

    /// Files of the active project, sent as context with each message.
    pub fn project_context(&self) -> Vec<ProjectFile> {
        self.store
            .read(|s| s.active().map(|p| p.files.clone()))
            .unwrap_or_default()
    }

    /// Upload `source` and record it as a file of `project_id`.
    pub async fn add_file(&self, project_id: &str, source: &Path, mime_type: Option<&str>) -> Result<ProjectFile> {
        self.require_project(project_id).await?;

        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ParleyError::Other(format!("not a file: {}", source.display())))?;

        let outcome = self.services.files.upload_file(source).await;
        let path = match outcome.path {
            Some(path) if outcome.success => path,
            _ => {
                let err = ParleyError::Persistence(
                    outcome.error.unwrap_or_else(|| format!("upload of {name} failed")),
                );
                self.raise(&err).await;
                return Err(err);
            }
        };
        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        let file = ProjectFile {
            id: generate_id(),
            project_id: project_id.to_string(),
            mime_type: media::classify(mime_type, &name),
            name,
            path,
            size,
        };
        self.store.dispatch(ProjectAction::FileAdded(file.clone())).await;

        if let Err(e) = self.services.persistence.create_project_file(&file).await {
            self.unconfirmed("project file creation", e).await;
        }
        Ok(file)
    }

    pub async fn update_file(&self, project_id: &str, file_id: &str, patch: ProjectFilePatch) -> Result<()> {
        self.require_file(project_id, file_id).await?;
        self.store
            .dispatch(ProjectAction::FileUpdated {
                project_id: project_id.to_string(),
                file_id: file_id.to_string(),
                patch,
            })
            .await;

        let updated = self.store.read(|s| {
            s.project(project_id)
                .and_then(|p| p.files.iter().find(|f| f.id == file_id).cloned())
        });
        if let Some(updated) = updated {
            if let Err(e) = self.services.persistence.update_project_file(&updated).await {
                self.unconfirmed("project file update", e).await;
            }
        }
        Ok(())
    }

    pub async fn delete_file(&self, project_id: &str, file_id: &str) -> Result<()> {
        let file = self.require_file(project_id, file_id).await?;
        self.store
            .dispatch(ProjectAction::FileDeleted {
                project_id: project_id.to_string(),
                file_id: file_id.to_string(),
            })
            .await;

        if let Err(e) = self.services.persistence.delete_project_file(file_id).await {
            self.unconfirmed("project file deletion", e).await;
        }
        if let Err(e) = self.services.files.delete_file(Path::new(&file.path)).await {
            tracing::warn!("could not remove stored copy of {}: {}", file.name, e);
        }
        Ok(())
    }

    async fn require_file(&self, project_id: &str, file_id: &str) -> Result<ProjectFile> {
        let project = self.require_project(project_id).await?;
        match project.files.into_iter().find(|f| f.id == file_id) {
            Some(file) => Ok(file),
            None => {
                let err = ParleyError::not_found("ProjectFile", file_id);
                self.raise(&err).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(project_id: &str, id: &str) -> ProjectFile {
        ProjectFile {
            id: id.into(),
            project_id: project_id.into(),
            name: format!("{id}.txt"),
            path: format!("/data/{id}.txt"),
            mime_type: "text/plain".into(),
            size: 1,
        }
    }

    #[test]
    fn files_follow_their_project() {
        let mut state = ProjectState::default();
        let project = Project::new("P", "");
        let id = project.id.clone();
        ProjectReducer::reduce(&mut state, ProjectAction::ProjectCreated(project));
        ProjectReducer::reduce(&mut state, ProjectAction::FileAdded(file(&id, "f1")));
        ProjectReducer::reduce(&mut state, ProjectAction::FileAdded(file("other", "f2")));

        assert_eq!(state.project(&id).unwrap().files.len(), 1);

        ProjectReducer::reduce(
            &mut state,
            ProjectAction::FileUpdated {
                project_id: id.clone(),
                file_id: "f1".into(),
                patch: ProjectFilePatch { name: Some("renamed.txt".into()), ..Default::default() },
            },
        );
        assert_eq!(state.project(&id).unwrap().files[0].name, "renamed.txt");

        ProjectReducer::reduce(
            &mut state,
            ProjectAction::FileDeleted { project_id: id.clone(), file_id: "f1".into() },
        );
        assert!(state.project(&id).unwrap().files.is_empty());
    }

    #[test]
    fn deleting_active_project_clears_selection() {
        let mut state = ProjectState::default();
        let project = Project::new("P", "");
        let id = project.id.clone();
        ProjectReducer::reduce(&mut state, ProjectAction::ProjectCreated(project));
        ProjectReducer::reduce(&mut state, ProjectAction::ActiveProjectSet(Some(id.clone())));

        ProjectReducer::reduce(&mut state, ProjectAction::ProjectDeleted(id));
        assert!(state.active_project.is_none());
        assert!(state.projects.is_empty());
    }

    #[test]
    fn fetch_does_not_restore_deleted_project() {
        let mut state = ProjectState::default();
        let doomed = Project::new("Doomed", "");
        ProjectReducer::reduce(&mut state, ProjectAction::ProjectDeleted(doomed.id.clone()));

        let kept = Project::new("Kept", "");
        ProjectReducer::reduce(&mut state, ProjectAction::ProjectsLoaded(vec![doomed, kept.clone()]));
        let ids: Vec<_> = state.projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![kept.id.as_str()]);
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut state = ProjectState::default();
        let project = Project::new("Title", "Desc");
        let id = project.id.clone();
        ProjectReducer::reduce(&mut state, ProjectAction::ProjectCreated(project));

        let later = Utc::now() + chrono::Duration::seconds(5);
        ProjectReducer::reduce(
            &mut state,
            ProjectAction::ProjectUpdated {
                id: id.clone(),
                patch: ProjectPatch { description: Some("New".into()), ..Default::default() },
                updated_at: later,
            },
        );
        let project = state.project(&id).unwrap();
        assert_eq!(project.title, "Title");
        assert_eq!(project.description, "New");
        assert_eq!(project.updated_at, later);
    }
}
