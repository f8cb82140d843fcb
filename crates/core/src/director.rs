//! Stage stepper for projects.
//!
//! A director starts before its first stage. Each call to `advance` builds
//! the next stage onto the project and makes it current; once every stage
//! has been built `advance` returns `Ok(None)`.

use crate::config::ProjectConfig;
use crate::error::{ConfigurationError, FiatResult};
use crate::outline::Resolved;
use crate::project::Project;
use crate::types::Stage;
use crate::workflow::{create_workflow, WorkflowExecutor};
use futures::future::BoxFuture;
use futures::FutureExt;

type StageBuilder = for<'a> fn(&'a mut Project) -> BoxFuture<'a, FiatResult<()>>;

/// Dispatch table from stage to the function that builds it.
fn builder(stage: Stage) -> StageBuilder {
    match stage {
        Stage::Settings => create_settings,
        Stage::Workflow => create_workflow_stage,
        Stage::Summary => create_summary,
    }
}

/// Validate the outline and apply its `[project]` section.
fn create_settings(project: &mut Project) -> BoxFuture<'_, FiatResult<()>> {
    async move {
        let loaded = ProjectConfig::from_outline(&project.outline)?;
        loaded.stage_order()?;
        Resolved::resolve(&project.outline, &project.library)?;

        let config = &mut project.config;
        config.parallelize |= loaded.parallelize;
        config.iteration_limit = config.iteration_limit.or(loaded.iteration_limit);
        config.summary_prefix = loaded.summary_prefix;
        config.stages = loaded.stages;
        Ok(())
    }
    .boxed()
}

/// Resolve the outline into components and the project workflow.
fn create_workflow_stage(project: &mut Project) -> BoxFuture<'_, FiatResult<()>> {
    async move {
        let workflow = create_workflow(&project.outline, &mut project.library)?;
        project.workflow = Some(workflow);
        Ok(())
    }
    .boxed()
}

/// Execute every path of the workflow.
fn create_summary(project: &mut Project) -> BoxFuture<'_, FiatResult<()>> {
    async move {
        let workflow = project.workflow.as_ref().ok_or_else(|| ConfigurationError::StageOrder {
            stage: Stage::Summary.to_string(),
            requires: Stage::Workflow.to_string(),
        })?;
        let summary = WorkflowExecutor::new(project.context())
            .with_prefix(project.config.summary_prefix.clone())
            .execute(workflow)
            .await;
        project.summary = Some(summary);
        Ok(())
    }
    .boxed()
}

/// Steps a project through an ordered list of stages
#[derive(Debug, Clone)]
pub struct Director {
    stages: Vec<Stage>,
    /// Number of stages built so far.
    completed: usize,
}

impl Director {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            completed: 0,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The most recently built stage, `None` before the first advance.
    pub fn current(&self) -> Option<Stage> {
        self.completed
            .checked_sub(1)
            .and_then(|index| self.stages.get(index).copied())
    }

    /// The stage the next advance will build.
    pub fn subsequent(&self) -> Option<Stage> {
        self.stages.get(self.completed).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.stages.len()
    }

    /// Build the next stage. Returns `Ok(None)` once every stage is built.
    pub async fn advance(&mut self, project: &mut Project) -> FiatResult<Option<Stage>> {
        let Some(stage) = self.subsequent() else {
            tracing::debug!("All stages complete for {}", project.name);
            return Ok(None);
        };

        tracing::info!("Creating {} for {}", stage, project.name);
        builder(stage)(project).await?;
        self.completed += 1;
        tracing::info!("Completed {} for {}", stage, project.name);
        Ok(Some(stage))
    }

    /// Advance until no stages remain.
    pub async fn complete(&mut self, project: &mut Project) -> FiatResult<()> {
        while self.advance(project).await?.is_some() {}
        Ok(())
    }
}

impl Default for Director {
    fn default() -> Self {
        Self::new(Stage::ALL.to_vec())
    }
}
