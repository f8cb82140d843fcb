use crate::error::GraphError;
use indexmap::{IndexMap, IndexSet};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Node → successors, insertion ordered.
pub type Adjacency = IndexMap<String, IndexSet<String>>;

/// Directed edges as (start, stop) pairs.
pub type Edges = Vec<(String, String)>;

/// Nodes executed one after another.
pub type Pipeline = Vec<String>;

/// Every root-to-endpoint path of a workflow.
pub type Pipelines = Vec<Pipeline>;

/// Square connection matrix with one label per row and column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    pub labels: Vec<String>,
    /// `cells[i][j]` is true when `labels[i]` connects to `labels[j]`.
    pub cells: Vec<Vec<bool>>,
}

/// A node name or a nested group of them, flattened before use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Node(String),
    Group(Vec<Segment>),
}

impl Segment {
    pub fn group<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        Self::Group(items.into_iter().map(Into::into).collect())
    }

    fn flatten_into(self, out: &mut Vec<String>) {
        match self {
            Self::Node(node) => out.push(node),
            Self::Group(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<&str> for Segment {
    fn from(node: &str) -> Self {
        Self::Node(node.to_string())
    }
}

impl From<String> for Segment {
    fn from(node: String) -> Self {
        Self::Node(node)
    }
}

impl From<&String> for Segment {
    fn from(node: &String) -> Self {
        Self::Node(node.clone())
    }
}

impl From<Vec<Segment>> for Segment {
    fn from(items: Vec<Segment>) -> Self {
        Self::Group(items)
    }
}

/// Any structure a workflow can be combined with
#[derive(Debug, Clone)]
pub enum WorkflowSource {
    Workflow(Workflow),
    Adjacency(Adjacency),
    Edges(Edges),
    Matrix(Matrix),
    Pipeline(Pipeline),
}

impl From<Workflow> for WorkflowSource {
    fn from(workflow: Workflow) -> Self {
        Self::Workflow(workflow)
    }
}

impl From<Adjacency> for WorkflowSource {
    fn from(adjacency: Adjacency) -> Self {
        Self::Adjacency(adjacency)
    }
}

impl From<Edges> for WorkflowSource {
    fn from(edges: Edges) -> Self {
        Self::Edges(edges)
    }
}

impl From<Matrix> for WorkflowSource {
    fn from(matrix: Matrix) -> Self {
        Self::Matrix(matrix)
    }
}

impl From<Pipeline> for WorkflowSource {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipeline(pipeline)
    }
}

impl From<&str> for WorkflowSource {
    fn from(node: &str) -> Self {
        Self::Pipeline(vec![node.to_string()])
    }
}

/// Directed acyclic graph of component names
///
/// Every mutation keeps the graph acyclic and free of self loops; a
/// violating call fails without changing the graph.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    graph: StableDiGraph<String, ()>,
    indices: IndexMap<String, NodeIndex>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_adjacency(adjacency: &Adjacency) -> Result<Self, GraphError> {
        let mut workflow = Self::new();
        for node in adjacency.keys() {
            workflow.ensure(node);
        }
        for (start, stops) in adjacency {
            for stop in stops {
                workflow.connect(start, stop)?;
            }
        }
        Ok(workflow)
    }

    pub fn from_edges<S: AsRef<str>>(edges: &[(S, S)]) -> Result<Self, GraphError> {
        let mut workflow = Self::new();
        for (start, stop) in edges {
            workflow.connect(start.as_ref(), stop.as_ref())?;
        }
        Ok(workflow)
    }

    pub fn from_matrix(matrix: &Matrix) -> Result<Self, GraphError> {
        let size = matrix.labels.len();
        if matrix.cells.len() != size || matrix.cells.iter().any(|row| row.len() != size) {
            return Err(GraphError::RaggedMatrix);
        }

        let mut workflow = Self::new();
        for label in &matrix.labels {
            workflow.ensure(label);
        }
        for (row, start) in matrix.cells.iter().zip(&matrix.labels) {
            for (connected, stop) in row.iter().zip(&matrix.labels) {
                if *connected {
                    workflow.connect(start, stop)?;
                }
            }
        }
        Ok(workflow)
    }

    /// Chain the nodes in order.
    pub fn from_pipeline<S: AsRef<str>>(pipeline: &[S]) -> Result<Self, GraphError> {
        let mut workflow = Self::new();
        workflow.extend(pipeline.iter().map(|node| node.as_ref()))?;
        Ok(workflow)
    }

    pub fn from_source(source: WorkflowSource) -> Result<Self, GraphError> {
        match source {
            WorkflowSource::Workflow(workflow) => Ok(workflow),
            WorkflowSource::Adjacency(adjacency) => Self::from_adjacency(&adjacency),
            WorkflowSource::Edges(edges) => Self::from_edges(&edges),
            WorkflowSource::Matrix(matrix) => Self::from_matrix(&matrix),
            WorkflowSource::Pipeline(pipeline) => Self::from_pipeline(&pipeline),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.indices.contains_key(node)
    }

    /// Node names in insertion order
    pub fn nodes(&self) -> Vec<String> {
        self.indices.keys().cloned().collect()
    }

    fn ensure(&mut self, node: &str) -> NodeIndex {
        if let Some(index) = self.indices.get(node) {
            return *index;
        }
        let index = self.graph.add_node(node.to_string());
        self.indices.insert(node.to_string(), index);
        index
    }

    fn index(&self, node: &str) -> Result<NodeIndex, GraphError> {
        self.indices
            .get(node)
            .copied()
            .ok_or_else(|| GraphError::MissingNode(node.to_string()))
    }

    /// Successors in the order their edges were added.
    fn successors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut successors: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        successors.reverse();
        successors
    }

    fn has_incoming(&self, index: NodeIndex) -> bool {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .next()
            .is_some()
    }

    fn has_outgoing(&self, index: NodeIndex) -> bool {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .next()
            .is_some()
    }

    /// Successor names of `node`
    pub fn successors_of(&self, node: &str) -> Result<Vec<String>, GraphError> {
        let index = self.index(node)?;
        Ok(self
            .successors(index)
            .into_iter()
            .map(|s| self.graph[s].clone())
            .collect())
    }

    /// Nodes with no predecessors
    pub fn roots(&self) -> Vec<String> {
        self.indices
            .iter()
            .filter(|(_, index)| !self.has_incoming(**index))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Nodes with no successors
    pub fn endpoints(&self) -> Vec<String> {
        self.indices
            .iter()
            .filter(|(_, index)| !self.has_outgoing(**index))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Insert a node with no edges. Existing nodes keep their edges.
    pub fn add(&mut self, node: &str) -> &mut Self {
        self.ensure(node);
        self
    }

    /// Insert a node wired to existing ancestors and descendants.
    pub fn add_with<S: AsRef<str>>(
        &mut self,
        node: &str,
        ancestors: &[S],
        descendants: &[S],
    ) -> Result<&mut Self, GraphError> {
        for (role, names) in [("ancestors", ancestors), ("descendants", descendants)] {
            let missing: Vec<String> = names
                .iter()
                .map(|name| name.as_ref())
                .filter(|name| !self.contains(name))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(GraphError::MissingNodes {
                    role,
                    nodes: missing,
                });
            }
        }

        self.ensure(node);
        for ancestor in ancestors {
            self.connect(ancestor.as_ref(), node)?;
        }
        for descendant in descendants {
            self.connect(node, descendant.as_ref())?;
        }
        Ok(self)
    }

    /// Add an edge, creating either endpoint if absent.
    pub fn connect(&mut self, start: &str, stop: &str) -> Result<&mut Self, GraphError> {
        if start == stop {
            return Err(GraphError::SelfLoop(start.to_string()));
        }

        if let (Some(&from), Some(&to)) = (self.indices.get(start), self.indices.get(stop)) {
            if self.graph.find_edge(from, to).is_some() {
                return Ok(self);
            }
            if has_path_connecting(&self.graph, to, from, None) {
                return Err(GraphError::Cycle {
                    start: start.to_string(),
                    stop: stop.to_string(),
                });
            }
        }

        let from = self.ensure(start);
        let to = self.ensure(stop);
        self.graph.add_edge(from, to, ());
        Ok(self)
    }

    /// Remove an edge.
    pub fn disconnect(&mut self, start: &str, stop: &str) -> Result<&mut Self, GraphError> {
        let from = self.index(start)?;
        let to = self.index(stop)?;
        if let Some(edge) = self.graph.find_edge(from, to) {
            self.graph.remove_edge(edge);
        }
        Ok(self)
    }

    /// Remove a node and every edge touching it.
    pub fn delete(&mut self, node: &str) -> Result<&mut Self, GraphError> {
        let index = self.index(node)?;
        self.graph.remove_node(index);
        self.indices.shift_remove(node);
        Ok(self)
    }

    /// Chain nodes serially after the current endpoints.
    ///
    /// An empty workflow starts the chain at its first node.
    pub fn extend<I, S>(&mut self, nodes: I) -> Result<&mut Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        let start = self.endpoints();
        self.extend_from(nodes, &start)
    }

    /// Chain nodes serially, the first one connected from each `start` node.
    pub fn extend_from<I, S, T>(&mut self, nodes: I, start: &[T]) -> Result<&mut Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
        T: AsRef<str>,
    {
        let mut flat = Vec::new();
        Segment::group(nodes).flatten_into(&mut flat);
        self.chain(&flat, start)?;
        Ok(self)
    }

    fn chain<S: AsRef<str>, T: AsRef<str>>(&mut self, nodes: &[S], start: &[T]) -> Result<(), GraphError> {
        let Some(first) = nodes.first() else {
            return Ok(());
        };
        if start.is_empty() {
            self.ensure(first.as_ref());
        } else {
            for node in start {
                self.connect(node.as_ref(), first.as_ref())?;
            }
        }
        for pair in nodes.windows(2) {
            self.connect(pair[0].as_ref(), pair[1].as_ref())?;
        }
        Ok(())
    }

    /// Add one path per combination of the groups, after the current endpoints.
    pub fn branchify<S: AsRef<str>>(&mut self, groups: &[Vec<S>]) -> Result<&mut Self, GraphError> {
        let start = self.endpoints();
        self.branchify_from(groups, &start)
    }

    /// Add one serial path per element of the Cartesian product of `groups`,
    /// each connected from every `start` node.
    pub fn branchify_from<S: AsRef<str>, T: AsRef<str>>(
        &mut self,
        groups: &[Vec<S>],
        start: &[T],
    ) -> Result<&mut Self, GraphError> {
        for path in product(groups) {
            self.chain(&path, start)?;
        }
        Ok(self)
    }

    /// Union another structure into this one. Edges are only ever added.
    pub fn merge(&mut self, item: impl Into<WorkflowSource>) -> Result<&mut Self, GraphError> {
        let other = Self::from_source(item.into())?;
        self.absorb(&other)?;
        Ok(self)
    }

    fn absorb(&mut self, other: &Workflow) -> Result<(), GraphError> {
        for node in other.indices.keys() {
            self.ensure(node);
        }
        for (start, stop) in other.edges() {
            self.connect(&start, &stop)?;
        }
        Ok(())
    }

    /// Merge `item` and connect the current endpoints to its roots.
    pub fn append(&mut self, item: impl Into<WorkflowSource>) -> Result<&mut Self, GraphError> {
        let other = Self::from_source(item.into())?;
        let endpoints = self.endpoints();
        self.absorb(&other)?;
        for endpoint in &endpoints {
            for root in other.roots() {
                if *endpoint != root {
                    self.connect(endpoint, &root)?;
                }
            }
        }
        Ok(self)
    }

    /// Merge `item` and connect its endpoints to the current roots.
    pub fn prepend(&mut self, item: impl Into<WorkflowSource>) -> Result<&mut Self, GraphError> {
        let other = Self::from_source(item.into())?;
        let roots = self.roots();
        self.absorb(&other)?;
        for endpoint in other.endpoints() {
            for root in &roots {
                if endpoint != *root {
                    self.connect(&endpoint, root)?;
                }
            }
        }
        Ok(self)
    }

    /// Every path from a root to an endpoint, depth first.
    pub fn paths(&self) -> Pipelines {
        let mut paths = Vec::new();
        for root in self.roots() {
            if let Ok(index) = self.index(&root) {
                let mut trail = vec![index];
                self.collect_paths(index, &mut trail, &mut paths);
            }
        }
        paths
    }

    fn collect_paths(&self, index: NodeIndex, trail: &mut Vec<NodeIndex>, paths: &mut Pipelines) {
        let successors = self.successors(index);
        if successors.is_empty() {
            paths.push(trail.iter().map(|i| self.graph[*i].clone()).collect());
            return;
        }
        for successor in successors {
            if trail.contains(&successor) {
                continue;
            }
            trail.push(successor);
            self.collect_paths(successor, trail, paths);
            trail.pop();
        }
    }

    /// Every path from `start` to `stop`.
    pub fn walk(&self, start: &str, stop: &str) -> Result<Pipelines, GraphError> {
        let from = self.index(start)?;
        let to = self.index(stop)?;
        let mut paths = Vec::new();
        let mut trail = vec![from];
        self.collect_walks(from, to, &mut trail, &mut paths);
        Ok(paths)
    }

    fn collect_walks(
        &self,
        index: NodeIndex,
        stop: NodeIndex,
        trail: &mut Vec<NodeIndex>,
        paths: &mut Pipelines,
    ) {
        if index == stop {
            paths.push(trail.iter().map(|i| self.graph[*i].clone()).collect());
            return;
        }
        for successor in self.successors(index) {
            if trail.contains(&successor) {
                continue;
            }
            trail.push(successor);
            self.collect_walks(successor, stop, trail, paths);
            trail.pop();
        }
    }

    /// A copy keeping only `include` nodes (if given) minus `exclude` nodes.
    pub fn subset<S: AsRef<str>>(
        &self,
        include: Option<&[S]>,
        exclude: Option<&[S]>,
    ) -> Result<Workflow, GraphError> {
        if include.is_none() && exclude.is_none() {
            return Err(GraphError::EmptySubset);
        }

        let mut removed: Vec<String> = Vec::new();
        if let Some(include) = include {
            removed.extend(
                self.indices
                    .keys()
                    .filter(|node| !include.iter().any(|kept| kept.as_ref() == node.as_str()))
                    .cloned(),
            );
        }
        if let Some(exclude) = exclude {
            removed.extend(exclude.iter().map(|node| node.as_ref().to_string()));
        }

        let mut copy = self.clone();
        for node in &removed {
            if copy.contains(node) {
                copy.delete(node)?;
            }
        }
        Ok(copy)
    }

    /// Nodes ordered so every edge points forward.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            let node = self.graph[cycle.node_id()].clone();
            GraphError::Cycle {
                start: node.clone(),
                stop: node,
            }
        })?;
        Ok(order.into_iter().map(|i| self.graph[i].clone()).collect())
    }

    /// Adjacency list including endpoints with empty successor sets.
    pub fn adjacency(&self) -> Adjacency {
        self.indices
            .iter()
            .map(|(name, index)| {
                let successors = self
                    .successors(*index)
                    .into_iter()
                    .map(|s| self.graph[s].clone())
                    .collect();
                (name.clone(), successors)
            })
            .collect()
    }

    pub fn edges(&self) -> Edges {
        let mut edges = Vec::new();
        for (name, index) in &self.indices {
            for successor in self.successors(*index) {
                edges.push((name.clone(), self.graph[successor].clone()));
            }
        }
        edges
    }

    pub fn matrix(&self) -> Matrix {
        let labels = self.nodes();
        let cells = self
            .indices
            .values()
            .map(|from| {
                self.indices
                    .values()
                    .map(|to| self.graph.find_edge(*from, *to).is_some())
                    .collect()
            })
            .collect();
        Matrix { labels, cells }
    }
}

/// Cartesian product of the groups, in order.
fn product<S: AsRef<str>>(groups: &[Vec<S>]) -> Vec<Vec<String>> {
    if groups.is_empty() {
        return Vec::new();
    }
    let mut combinations: Vec<Vec<String>> = vec![Vec::new()];
    for group in groups {
        let mut next = Vec::with_capacity(combinations.len() * group.len());
        for prefix in &combinations {
            for item in group {
                let mut combination = prefix.clone();
                combination.push(item.as_ref().to_string());
                next.push(combination);
            }
        }
        combinations = next;
    }
    combinations
}

impl PartialEq for Workflow {
    fn eq(&self, other: &Self) -> bool {
        self.adjacency() == other.adjacency()
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "workflow:")?;
        for (node, successors) in self.adjacency() {
            if successors.is_empty() {
                writeln!(f, "  {}", node)?;
            } else {
                let joined: Vec<&str> = successors.iter().map(String::as_str).collect();
                writeln!(f, "  {} -> {}", node, joined.join(", "))?;
            }
        }
        Ok(())
    }
}

impl Serialize for Workflow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.adjacency().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Workflow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let adjacency = Adjacency::deserialize(deserializer)?;
        Self::from_adjacency(&adjacency).map_err(serde::de::Error::custom)
    }
}
