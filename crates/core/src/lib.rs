// Core types and functionality for fiat, a configuration-driven workflow engine

pub mod backend;
pub mod component;
pub mod config;
pub mod director;
pub mod error;
pub mod library;
pub mod outline;
pub mod parameters;
pub mod project;
pub mod types;
pub mod workflow;

pub use backend::{Backend, Job, Pooled, Sequential};
pub use component::{Blueprint, Category, Component, Contents, Initialization, Invocation, Kind, Resolution};
pub use config::ProjectConfig;
pub use director::Director;
pub use error::{
    AlgorithmError, ConfigurationError, ExecutionError, FiatError, FiatResult, GraphError, LibraryError,
};
pub use library::{Library, Registration, Registry};
pub use outline::Outline;
pub use parameters::{ParameterSource, Parameters};
pub use project::{Context, Project};
pub use types::*;
pub use workflow::{Workflow, WorkflowExecutor};
