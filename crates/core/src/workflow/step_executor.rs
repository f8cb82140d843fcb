use crate::backend::{Backend, Job, Sequential};
use crate::component::{Component, Contents, Initialization, Invocation, Kind, Resolution};
use crate::error::ExecutionError;
use crate::project::Context;
use crate::types::{Flow, Iterations, ParameterMap, PathResult, PathStatus};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

/// Executes components against a shared project context
#[derive(Clone)]
pub struct StepExecutor {
    context: Context,
}

impl StepExecutor {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run the nodes of a path in order, threading the value through each.
    ///
    /// Nodes with no matching component are skipped and noted in `record`.
    /// The first error stops the path.
    pub async fn run_path(
        &self,
        path: &[String],
        input: Value,
        record: &mut PathResult,
    ) -> Result<Value, ExecutionError> {
        let mut value = input;
        for node in path {
            if self.context.cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }

            let component = match self
                .context
                .library
                .instance(&[node.as_str()], Initialization::default())
            {
                Ok(component) => component,
                Err(e) => {
                    tracing::warn!("Skipping node {}: {}", node, e);
                    record.skip(node.clone());
                    continue;
                }
            };

            value = self.traverse(&component, value).await?;
            record.record(node.clone(), value.clone());
        }
        Ok(value)
    }

    /// Execute a component as a node of a path. Workers are junctions here:
    /// their children follow on the same path, so the input passes through.
    pub async fn traverse(&self, component: &Component, input: Value) -> Result<Value, ExecutionError> {
        if component.is_worker() {
            tracing::debug!("Passing through worker {}", component.name);
            return Ok(input);
        }
        self.execute(component, input).await
    }

    /// Execute a component on its own, once per configured iteration.
    pub fn execute<'a>(
        &'a self,
        component: &'a Component,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, ExecutionError>> {
        let base = self.step_parameters(component);
        self.implement(component, input, base)
    }

    /// Run every branch from the same input, concurrently when the project
    /// parallelizes and there is more than one branch.
    async fn run_branches(
        &self,
        branches: Vec<Vec<String>>,
        input: Value,
    ) -> Result<Vec<Value>, ExecutionError> {
        let parallel = self.context.parallelize && branches.len() > 1;
        let jobs: Vec<Job> = branches
            .into_iter()
            .enumerate()
            .map(|(index, branch)| {
                let executor = self.clone();
                let input = input.clone();
                async move {
                    let mut record = PathResult::new(format!("branch_{}", index + 1), branch.clone());
                    executor.run_path(&branch, input, &mut record).await?;
                    record.finish(PathStatus::Completed);
                    Ok(record)
                }
                .boxed()
            })
            .collect();

        let results = if parallel {
            tracing::debug!(
                "Running {} branches on the {} backend",
                jobs.len(),
                self.context.backend.name()
            );
            self.context.backend.run(jobs).await
        } else {
            Sequential.run(jobs).await
        };

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            let record = result?;
            outcomes.push(record.output().cloned().unwrap_or_else(|| input.clone()));
        }
        Ok(outcomes)
    }

    /// Combine branch outcomes. A `criteria` component overrides the default rule.
    async fn resolve(
        &self,
        component: &Component,
        resolution: Resolution,
        outcomes: Vec<Value>,
    ) -> Result<Value, ExecutionError> {
        if let Some(criteria) = &component.criteria {
            let judge = self
                .context
                .library
                .instance(&[criteria.as_str()], Initialization::default())?;
            return self.execute(&judge, Value::Array(outcomes)).await;
        }

        let unresolvable = |reason: &str| ExecutionError::Unresolvable {
            component: component.name.clone(),
            reason: reason.to_string(),
        };

        match resolution {
            Resolution::Study => Ok(Value::Array(outcomes)),
            Resolution::Contest => {
                let mut best: Option<(f64, Value)> = None;
                for outcome in outcomes {
                    let Some(score) = outcome.as_f64() else {
                        continue;
                    };
                    if best.as_ref().map_or(true, |(top, _)| score > *top) {
                        best = Some((score, outcome));
                    }
                }
                best.map(|(_, value)| value)
                    .ok_or_else(|| unresolvable("no branch produced a numeric outcome"))
            }
            Resolution::Survey => {
                let scores: Vec<f64> = outcomes.iter().filter_map(Value::as_f64).collect();
                if scores.is_empty() {
                    return Err(unresolvable("no branch produced a numeric outcome"));
                }
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                serde_json::Number::from_f64(mean)
                    .map(Value::Number)
                    .ok_or_else(|| unresolvable("average is not a finite number"))
            }
        }
    }

    /// Parameters of the step a technique was declared under.
    fn step_parameters(&self, component: &Component) -> ParameterMap {
        match &component.step {
            Some(step) => match self
                .context
                .library
                .instance(&[step.as_str()], Initialization::default())
            {
                Ok(step) => step.parameters.finalize(&self.context, &ParameterMap::new()),
                Err(e) => {
                    tracing::debug!("Step {} of {} not found: {}", step, component.name, e);
                    ParameterMap::new()
                }
            },
            None => ParameterMap::new(),
        }
    }

    /// Repeat `perform` for each configured iteration, threading the value.
    /// `base` sits beneath the component's own parameters.
    fn implement<'a>(
        &'a self,
        component: &'a Component,
        input: Value,
        base: ParameterMap,
    ) -> BoxFuture<'a, Result<Value, ExecutionError>> {
        async move {
            tracing::debug!("Executing {} ({:?})", component.name, component.kind);
            let parameters = component.parameters.finalize(&self.context, &base);
            let limit = match component.iterations {
                Iterations::Infinite => self.context.iteration_limit,
                Iterations::Count(_) => None,
            };

            let mut value = input;
            let mut completed = 0u64;
            while component.iterations.allows(completed) {
                if self.context.cancel.is_cancelled() {
                    return Err(ExecutionError::Cancelled);
                }
                if let Some(limit) = limit {
                    if completed >= limit {
                        return Err(ExecutionError::IterationLimit {
                            component: component.name.clone(),
                            limit,
                        });
                    }
                }

                let flow = self.perform(component, value, &parameters, completed).await?;
                completed += 1;

                let halted = matches!(flow, Flow::Halt(_));
                value = flow.into_value();
                if halted {
                    break;
                }
                tokio::task::yield_now().await;
            }

            tracing::debug!("{} finished after {} iterations", component.name, completed);
            Ok(value)
        }
        .boxed()
    }

    /// One iteration of a component.
    async fn perform(
        &self,
        component: &Component,
        input: Value,
        parameters: &ParameterMap,
        iteration: u64,
    ) -> Result<Flow, ExecutionError> {
        let output = match (&component.kind, &component.contents) {
            (_, Contents::Algorithm(algorithm)) => {
                return algorithm(Invocation {
                    component: &component.name,
                    input: &input,
                    parameters,
                    data: &self.context.data,
                    iteration,
                })
                .map_err(|source| ExecutionError::Algorithm {
                    component: component.name.clone(),
                    source,
                });
            }
            (_, Contents::Technique(technique)) => match technique.contents {
                Contents::Algorithm(_) => {
                    self.implement(technique, input, parameters.clone()).await?
                }
                _ => self.execute(technique, input).await?,
            },
            (Kind::Laborer, Contents::Workflow(workflow)) => {
                match workflow.paths().into_iter().next() {
                    Some(path) => {
                        let mut record = PathResult::new(component.name.clone(), path.clone());
                        self.run_path(&path, input, &mut record).await?
                    }
                    None => input,
                }
            }
            (Kind::Manager(resolution), Contents::Workflow(workflow)) => {
                let branches = workflow.paths();
                if branches.is_empty() {
                    input
                } else {
                    let outcomes = self.run_branches(branches, input).await?;
                    self.resolve(component, *resolution, outcomes).await?
                }
            }
            _ => input,
        };
        Ok(Flow::Continue(output))
    }
}
