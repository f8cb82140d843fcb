//! Projects tie an outline, a component library and a data payload
//! together and carry them through the director's stages.

use crate::backend::{Backend, Pooled};
use crate::config::ProjectConfig;
use crate::director::Director;
use crate::error::FiatResult;
use crate::library::Library;
use crate::outline::Outline;
use crate::parameters::ParameterSource;
use crate::types::{Section, Summary};
use crate::workflow::Workflow;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Read-only snapshot of a project used during execution
#[derive(Clone)]
pub struct Context {
    pub name: String,
    pub identification: String,
    pub outline: Arc<Outline>,
    pub library: Arc<Library>,
    pub data: Arc<Value>,
    pub parallelize: bool,
    pub iteration_limit: Option<u64>,
    pub cancel: CancellationToken,
    pub backend: Arc<dyn Backend>,
}

impl ParameterSource for Context {
    fn section(&self, name: &str) -> Option<&Section> {
        self.outline.section(name)
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::String(self.name.clone())),
            "identification" => Some(Value::String(self.identification.clone())),
            "parallelize" => Some(Value::Bool(self.parallelize)),
            "data" => Some((*self.data).clone()),
            key => self.data.get(key).cloned(),
        }
    }
}

/// A configured run of the engine
pub struct Project {
    pub name: String,
    /// `<name>_<uuid>`, unique per project.
    pub identification: String,
    pub outline: Outline,
    pub library: Library,
    pub workflow: Option<Workflow>,
    pub summary: Option<Summary>,
    pub data: Value,
    pub config: ProjectConfig,
    backend: Arc<dyn Backend>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("identification", &self.identification)
            .field("outline", &self.outline)
            .field("library", &self.library)
            .field("workflow", &self.workflow)
            .field("summary", &self.summary)
            .field("data", &self.data)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Project {
    pub fn new(name: impl Into<String>, outline: Outline) -> Self {
        let name = name.into();
        let config = ProjectConfig {
            name: name.clone(),
            ..Default::default()
        };
        Self {
            identification: format!("{}_{}", name, Uuid::new_v4()),
            name,
            outline,
            library: Library::new(),
            workflow: None,
            summary: None,
            data: Value::Null,
            config,
            backend: Arc::new(Pooled::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a project named by the outline's `[project]` section.
    pub fn from_outline(outline: Outline) -> FiatResult<Self> {
        let config = ProjectConfig::from_outline(&outline)?;
        let mut project = Self::new(config.name.clone(), outline);
        project.config = config;
        Ok(project)
    }

    pub fn with_library(mut self, library: Library) -> Self {
        self.library = library;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_parallelize(mut self, parallelize: bool) -> Self {
        self.config.parallelize = parallelize;
        self
    }

    pub fn with_iteration_limit(mut self, limit: u64) -> Self {
        self.config.iteration_limit = Some(limit);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Rename the project, regenerating its identification.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.config.name = self.name.clone();
        self.identification = format!("{}_{}", self.name, Uuid::new_v4());
    }

    /// Token that stops execution when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot the state execution needs.
    pub fn context(&self) -> Context {
        Context {
            name: self.name.clone(),
            identification: self.identification.clone(),
            outline: Arc::new(self.outline.clone()),
            library: Arc::new(self.library.clone()),
            data: Arc::new(self.data.clone()),
            parallelize: self.config.parallelize,
            iteration_limit: self.config.iteration_limit,
            cancel: self.cancel.clone(),
            backend: Arc::clone(&self.backend),
        }
    }

    /// Drive the project through every configured stage.
    pub async fn execute(&mut self) -> FiatResult<()> {
        let stages = ProjectConfig::from_outline(&self.outline)?.stage_order()?;
        let mut director = Director::new(stages);
        director.complete(self).await
    }
}
