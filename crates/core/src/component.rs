//! Components: the nodes of a project.
//!
//! A component is either a task (technique or step) that does work on a
//! value, or a worker (laborer or manager) that organizes other components.
//! Blueprints are the registered designs components are built from.

use crate::error::AlgorithmError;
use crate::parameters::Parameters;
use crate::types::{Flow, Iterations, ParameterMap};
use crate::workflow::Workflow;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// What an algorithm sees on each iteration
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub component: &'a str,
    pub input: &'a Value,
    pub parameters: &'a ParameterMap,
    /// The project's data payload.
    pub data: &'a Value,
    /// Zero-based iteration counter.
    pub iteration: u64,
}

/// Callable that does a technique's work.
pub type Algorithm = Arc<dyn Fn(Invocation<'_>) -> Result<Flow, AlgorithmError> + Send + Sync>;

/// How a manager combines the outcomes of its branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Keep the best outcome.
    Contest,
    /// Keep every outcome.
    Study,
    /// Average the outcomes.
    Survey,
}

/// Category of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Technique,
    Step,
    /// Runs its sub-components in serial.
    Laborer,
    /// Runs its sub-components as parallel branches.
    Manager(Resolution),
}

impl Kind {
    pub fn is_worker(&self) -> bool {
        matches!(self, Self::Laborer | Self::Manager(_))
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Technique | Self::Step => Category::Task,
            Self::Laborer => Category::Laborer,
            Self::Manager(_) => Category::Manager,
        }
    }
}

/// Coarse grouping reported by the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Laborer,
    Manager,
    Task,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Laborer => "laborer",
            Self::Manager => "manager",
            Self::Task => "task",
        };
        f.write_str(name)
    }
}

/// What a component holds
#[derive(Clone, Default)]
pub enum Contents {
    #[default]
    Empty,
    Algorithm(Algorithm),
    /// A step's bound technique.
    Technique(Box<Component>),
    /// A worker's sub-workflow.
    Workflow(Workflow),
}

impl std::fmt::Debug for Contents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Algorithm(_) => f.write_str("Algorithm(..)"),
            Self::Technique(technique) => f.debug_tuple("Technique").field(technique).finish(),
            Self::Workflow(workflow) => f.debug_tuple("Workflow").field(workflow).finish(),
        }
    }
}

/// A node in a project
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub design: String,
    pub kind: Kind,
    pub contents: Contents,
    pub parameters: Parameters,
    pub iterations: Iterations,
    /// Step whose parameters sit beneath this technique's.
    pub step: Option<String>,
    /// Library component that resolves a manager's branches.
    pub criteria: Option<String>,
}

impl Component {
    pub fn new(name: impl Into<String>, design: impl Into<String>, kind: Kind) -> Self {
        let name = name.into();
        Self {
            parameters: Parameters::new(name.clone()),
            name,
            design: design.into(),
            kind,
            contents: Contents::Empty,
            iterations: Iterations::default(),
            step: None,
            criteria: None,
        }
    }

    /// A technique that runs `algorithm`.
    pub fn technique<F>(name: impl Into<String>, algorithm: F) -> Self
    where
        F: Fn(Invocation<'_>) -> Result<Flow, AlgorithmError> + Send + Sync + 'static,
    {
        let mut component = Self::new(name, "technique", Kind::Technique);
        component.contents = Contents::Algorithm(Arc::new(algorithm));
        component
    }

    pub fn step(name: impl Into<String>) -> Self {
        Self::new(name, "step", Kind::Step)
    }

    pub fn laborer(name: impl Into<String>) -> Self {
        Self::new(name, "laborer", Kind::Laborer)
    }

    pub fn manager(name: impl Into<String>, resolution: Resolution) -> Self {
        let design = match resolution {
            Resolution::Contest => "contest",
            Resolution::Study => "study",
            Resolution::Survey => "survey",
        };
        Self::new(name, design, Kind::Manager(resolution))
    }

    pub fn with_design(mut self, design: impl Into<String>) -> Self {
        self.design = design.into();
        self
    }

    pub fn with_iterations(mut self, iterations: Iterations) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_parameters(mut self, contents: ParameterMap) -> Self {
        self.parameters.contents = contents;
        self
    }

    pub fn with_default_parameters(mut self, default: ParameterMap) -> Self {
        self.parameters.default = default;
        self
    }

    /// Bind a technique to this step.
    pub fn with_technique(mut self, technique: Component) -> Self {
        self.contents = Contents::Technique(Box::new(technique));
        self
    }

    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.contents = Contents::Workflow(workflow);
        self
    }

    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.criteria = Some(criteria.into());
        self
    }

    pub fn is_worker(&self) -> bool {
        self.kind.is_worker()
    }

    /// Rename the component and the parameter lookups that follow its name.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.parameters.name = self.name.clone();
    }

    /// The sub-workflow of a worker, if it has one.
    pub fn workflow(&self) -> Option<&Workflow> {
        match &self.contents {
            Contents::Workflow(workflow) => Some(workflow),
            _ => None,
        }
    }

    /// Apply initialization overrides.
    pub fn apply(&mut self, init: Initialization) {
        if let Some(iterations) = init.iterations {
            self.iterations = iterations;
        }
        if let Some(criteria) = init.criteria {
            self.criteria = Some(criteria);
        }
        if let Some(selected) = init.selected {
            self.parameters.selected = selected;
        }
        if let Some(implementation) = init.implementation {
            self.parameters.implementation = implementation;
        }
        if let Some(parameters) = init.parameters {
            self.parameters.contents.extend(parameters);
        }
        if let Some(step) = init.step {
            self.step = Some(step);
        }
        if let Some(contents) = init.contents {
            self.contents = contents;
        }
    }
}

/// Keyword overrides applied when a component is instanced
#[derive(Debug, Clone, Default)]
pub struct Initialization {
    pub iterations: Option<Iterations>,
    pub criteria: Option<String>,
    pub selected: Option<Vec<String>>,
    pub implementation: Option<IndexMap<String, String>>,
    /// Merged into the component's explicit parameters.
    pub parameters: Option<ParameterMap>,
    pub step: Option<String>,
    pub contents: Option<Contents>,
}

impl Initialization {
    /// Outline fields that map onto initialization overrides.
    pub const FIELDS: [&'static str; 4] = ["iterations", "criteria", "selected", "implementation"];
}

/// A registered design that components are built from
#[derive(Clone)]
pub struct Blueprint {
    pub design: String,
    pub kind: Kind,
    pub algorithm: Option<Algorithm>,
    pub default: ParameterMap,
    pub iterations: Iterations,
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("design", &self.design)
            .field("kind", &self.kind)
            .field("algorithm", &self.algorithm.is_some())
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl Blueprint {
    pub fn new(design: impl Into<String>, kind: Kind) -> Self {
        Self {
            design: design.into(),
            kind,
            algorithm: None,
            default: ParameterMap::new(),
            iterations: Iterations::default(),
        }
    }

    pub fn with_algorithm<F>(mut self, algorithm: F) -> Self
    where
        F: Fn(Invocation<'_>) -> Result<Flow, AlgorithmError> + Send + Sync + 'static,
    {
        self.algorithm = Some(Arc::new(algorithm));
        self
    }

    pub fn with_default(mut self, default: ParameterMap) -> Self {
        self.default = default;
        self
    }

    /// Build a fresh component named `name`.
    pub fn build(&self, name: impl Into<String>, init: Initialization) -> Component {
        let mut component = Component::new(name, self.design.clone(), self.kind);
        component.iterations = self.iterations;
        component.parameters.default = self.default.clone();
        if let Some(algorithm) = &self.algorithm {
            component.contents = Contents::Algorithm(Arc::clone(algorithm));
        }
        component.apply(init);
        component
    }
}

impl From<&Component> for Blueprint {
    fn from(component: &Component) -> Self {
        let algorithm = match &component.contents {
            Contents::Algorithm(algorithm) => Some(Arc::clone(algorithm)),
            _ => None,
        };
        Self {
            design: component.design.clone(),
            kind: component.kind,
            algorithm,
            default: component.parameters.default.clone(),
            iterations: component.iterations,
        }
    }
}
