pub mod builder;
pub mod dag;
pub mod executor;
pub mod step_executor;

pub use builder::{create_workflow, serial_order};
pub use dag::{Adjacency, Edges, Matrix, Pipeline, Pipelines, Segment, Workflow, WorkflowSource};
pub use executor::WorkflowExecutor;
pub use step_executor::StepExecutor;
