//! Error types for fiat projects.
//!
//! Structural and configuration problems surface at the call that caused
//! them. Execution problems are recorded per path by the workflow executor.

/// Result type for operations that can fail anywhere in a project run.
pub type FiatResult<T> = Result<T, FiatError>;

/// Boxed error returned by component algorithms.
pub type AlgorithmError = Box<dyn std::error::Error + Send + Sync>;

/// Any error a project run can produce.
#[derive(Debug, thiserror::Error)]
pub enum FiatError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Problems with an outline or project settings. Fatal before execution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// No design could be found for a node.
    #[error("no design could be resolved for node '{0}'")]
    UnresolvedDesign(String),

    /// A declaring key holds something other than a name or list of names.
    #[error("declaration '{key}' in section '{section}' must be a name or a list of names")]
    InvalidDeclaration { section: String, key: String },

    /// A setting has the wrong shape.
    #[error("invalid value for '{key}' in section '{section}': {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },

    /// A node is declared as its own descendant.
    #[error("node '{0}' is declared inside its own sub-components")]
    CyclicDeclaration(String),

    /// Techniques are leaves.
    #[error("technique '{0}' cannot declare sub-components")]
    TechniqueWithChildren(String),

    /// Declarations exist but every declaring node is also declared as a child.
    #[error("outline declares components but no root component")]
    MissingRoot,

    #[error("unknown project stage '{0}'")]
    UnknownStage(String),

    /// A stage was reached before the stage it depends on.
    #[error("stage '{stage}' requires '{requires}' to be created first")]
    StageOrder { stage: String, requires: String },

    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid [project] section: {0}")]
    Project(#[source] serde_json::Error),
}

/// Structural violations in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("the start of an edge cannot be the same as its stop ('{0}') in an acyclic workflow")]
    SelfLoop(String),

    #[error("connecting '{start}' to '{stop}' would create a cycle")]
    Cycle { start: String, stop: String },

    /// Named ancestors or descendants are not in the graph.
    #[error("{role} {nodes:?} are not in the stored graph")]
    MissingNodes { role: &'static str, nodes: Vec<String> },

    #[error("'{0}' does not exist in the graph")]
    MissingNode(String),

    #[error("either include or exclude must be given")]
    EmptySubset,

    #[error("adjacency matrix must be square and match its labels")]
    RaggedMatrix,
}

/// Registry lookups and registrations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("no matching item for {0:?} was found")]
    NotFound(Vec<String>),

    #[error("'{0}' is not a recognized component category")]
    Unclassified(String),

    /// Neither a name nor a design was available to key the entry.
    #[error("cannot register a component without a name or design: {0}")]
    InvalidRegistration(String),
}

/// Failures while executing components.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A component's algorithm returned an error.
    #[error("component '{component}' failed: {source}")]
    Algorithm {
        component: String,
        #[source]
        source: AlgorithmError,
    },

    #[error("execution was cancelled")]
    Cancelled,

    /// An infinite component ran into the configured safety cap.
    #[error("component '{component}' reached the iteration limit of {limit}")]
    IterationLimit { component: String, limit: u64 },

    /// A manager could not combine its branch outcomes.
    #[error("manager '{component}' could not resolve its branches: {reason}")]
    Unresolvable { component: String, reason: String },

    #[error("criteria component lookup failed: {0}")]
    Criteria(#[from] LibraryError),

    /// A pooled job panicked or was aborted.
    #[error("backend job failed to join: {0}")]
    Join(String),
}

impl ExecutionError {
    /// Whether this error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
