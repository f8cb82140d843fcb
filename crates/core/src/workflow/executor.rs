use super::dag::Workflow;
use super::step_executor::StepExecutor;
use crate::backend::{Backend, Job};
use crate::component::Category;
use crate::project::Context;
use crate::types::{PathResult, PathStatus, Summary};
use futures::FutureExt;

/// Executes every path of a workflow and collects the results
pub struct WorkflowExecutor {
    step_executor: StepExecutor,
    prefix: String,
}

impl WorkflowExecutor {
    pub fn new(context: Context) -> Self {
        Self {
            step_executor: StepExecutor::new(context),
            prefix: "path".to_string(),
        }
    }

    /// Prefix for result names (`<prefix>_<n>`)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Execute each path in order. A failing path is recorded and the
    /// remaining paths still run.
    ///
    /// When the project parallelizes, sibling paths below a manager with
    /// more than one branch are handed to the backend together.
    pub async fn execute(&self, workflow: &Workflow) -> Summary {
        let mut summary = Summary::new(self.prefix.clone());
        let paths = workflow.paths();

        tracing::info!(
            "Starting workflow execution: run_id={}, paths={}",
            summary.id,
            paths.len()
        );

        for group in self.group(workflow, paths) {
            let named: Vec<(String, Vec<String>)> = group
                .into_iter()
                .enumerate()
                .map(|(offset, path)| (format!("{}_{}", summary.prefix, summary.len() + offset + 1), path))
                .collect();

            if named.len() > 1 {
                for result in self.execute_group(named).await {
                    summary.insert(result);
                }
            } else {
                for (name, path) in named {
                    summary.insert(execute_path(&self.step_executor, name, path).await);
                }
            }
        }
        summary.finish();

        tracing::info!(
            "Workflow execution finished: run_id={}, completed={}, failed={}",
            summary.id,
            summary.completed(),
            summary.failed()
        );
        summary
    }

    /// Split paths into runs that may execute together. Without
    /// parallelization every path is its own group.
    fn group(&self, workflow: &Workflow, paths: Vec<Vec<String>>) -> Vec<Vec<Vec<String>>> {
        let context = self.step_executor.context();
        if !context.parallelize {
            return paths.into_iter().map(|path| vec![path]).collect();
        }

        let fans_out = |node: &str| {
            context.library.classify(node).ok() == Some(Category::Manager)
                && workflow.successors_of(node).map_or(false, |next| next.len() > 1)
        };

        let mut groups: Vec<(Option<Vec<String>>, Vec<Vec<String>>)> = Vec::new();
        for path in paths {
            let key = path
                .iter()
                .position(|node| fans_out(node))
                .map(|index| path[..=index].to_vec());
            match groups.last_mut() {
                Some((last, members)) if key.is_some() && *last == key => members.push(path),
                _ => groups.push((key, vec![path])),
            }
        }
        groups.into_iter().map(|(_, members)| members).collect()
    }

    async fn execute_group(&self, named: Vec<(String, Vec<String>)>) -> Vec<PathResult> {
        let context = self.step_executor.context();
        tracing::debug!(
            "Running {} sibling paths on the {} backend",
            named.len(),
            context.backend.name()
        );

        let jobs: Vec<Job> = named
            .iter()
            .cloned()
            .map(|(name, path)| {
                let executor = self.step_executor.clone();
                async move { Ok(execute_path(&executor, name, path).await) }.boxed()
            })
            .collect();

        context
            .backend
            .run(jobs)
            .await
            .into_iter()
            .zip(named)
            .map(|(result, (name, path))| {
                result.unwrap_or_else(|e| {
                    tracing::error!("Path {} failed: {}", name, e);
                    let mut failed = PathResult::new(name, path);
                    failed.finish(PathStatus::Failed(e.to_string()));
                    failed
                })
            })
            .collect()
    }
}

async fn execute_path(step_executor: &StepExecutor, name: String, path: Vec<String>) -> PathResult {
    let mut result = PathResult::new(name, path.clone());
    let context = step_executor.context();

    if context.cancel.is_cancelled() {
        tracing::warn!("Skipping path {}: execution cancelled", result.name);
        result.finish(PathStatus::Cancelled);
        return result;
    }

    tracing::info!("Executing path {}: {}", result.name, path.join(" -> "));
    let input = (*context.data).clone();
    let status = match step_executor.run_path(&path, input, &mut result).await {
        Ok(_) => PathStatus::Completed,
        Err(e) if e.is_cancelled() => {
            tracing::warn!("Path {} cancelled", result.name);
            PathStatus::Cancelled
        }
        Err(e) => {
            tracing::error!("Path {} failed: {}", result.name, e);
            PathStatus::Failed(e.to_string())
        }
    };
    result.finish(status);
    result
}
