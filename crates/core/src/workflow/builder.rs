// Builds a project workflow and its components from an outline

use super::dag::Workflow;
use crate::component::{Component, Contents, Initialization, Kind};
use crate::error::{ConfigurationError, FiatResult};
use crate::library::Library;
use crate::outline::{listify, Connections, Outline, Resolved};
use crate::types::Iterations;
use indexmap::IndexMap;
use serde_json::Value;

/// Every descendant of `name` in depth-first declared order.
///
/// Fails if a node is declared inside its own sub-components.
pub fn serial_order(name: &str, connections: &Connections) -> Result<Vec<String>, ConfigurationError> {
    let mut order = Vec::new();
    let mut trail = vec![name.to_string()];
    visit(name, connections, &mut trail, &mut order)?;
    Ok(order)
}

fn visit(
    name: &str,
    connections: &Connections,
    trail: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<(), ConfigurationError> {
    let Some(children) = connections.get(name) else {
        return Ok(());
    };
    for child in children {
        if trail.contains(child) {
            return Err(ConfigurationError::CyclicDeclaration(child.clone()));
        }
        order.push(child.clone());
        trail.push(child.clone());
        visit(child, connections, trail, order)?;
        trail.pop();
    }
    Ok(())
}

/// Resolve the outline, build every component, register them with the
/// library and return the project workflow.
pub fn create_workflow(outline: &Outline, library: &mut Library) -> FiatResult<Workflow> {
    let resolved = Resolved::resolve(outline, library)?;

    let mut components: IndexMap<String, Component> = IndexMap::new();
    for node in &resolved.nodes {
        let component = create_component(node, outline, &resolved, library)?;
        components.insert(node.clone(), component);
    }
    let kinds: IndexMap<String, Kind> = components
        .iter()
        .map(|(name, component)| (name.clone(), component.kind))
        .collect();

    let roots = resolved.roots();
    if roots.is_empty() && !resolved.connections.is_empty() {
        return Err(ConfigurationError::MissingRoot.into());
    }

    let mut workflow = Workflow::new();
    for root in &roots {
        workflow.add(root);
        expand(&mut workflow, root, &resolved.connections, &kinds)?;
    }

    for (name, component) in components.iter_mut() {
        if component.is_worker() {
            let contents = organize(name, &resolved.connections, &kinds)?;
            component.contents = Contents::Workflow(contents);
        }
    }

    for (_, component) in components {
        library.register(component)?;
    }

    tracing::info!(
        "Created workflow with {} nodes and {} paths",
        workflow.len(),
        workflow.paths().len()
    );
    Ok(workflow)
}

/// Build one component from its design and outline settings.
fn create_component(
    node: &str,
    outline: &Outline,
    resolved: &Resolved,
    library: &Library,
) -> FiatResult<Component> {
    let design = resolved
        .designs
        .get(node)
        .ok_or_else(|| ConfigurationError::UnresolvedDesign(node.to_string()))?;
    let declarer = resolved
        .declarers
        .get(node)
        .map(String::as_str)
        .unwrap_or(node);

    let mut init = initialization(node, declarer, outline)?;

    let kind = library.select(&[node, design.as_str()])?.kind;
    if kind == Kind::Technique {
        if let Some(parent) = resolved.parent(node) {
            let parent_design = resolved.designs.get(parent).map(String::as_str);
            let parent_kind = match parent_design {
                Some(design) => library.select(&[parent, design]).ok().map(|b| b.kind),
                None => None,
            };
            if parent_kind == Some(Kind::Step) {
                init.step = Some(parent.to_string());
            }
        }
    }

    let mut component = library.instance(&[node, design.as_str()], init)?;
    component.rename(node);
    tracing::debug!(
        "Created component {} ({}, {:?})",
        component.name,
        component.design,
        component.kind
    );
    Ok(component)
}

/// Collect `<node>_<field>` settings from the declaring section, then the
/// node's own section, which also accepts bare field names.
fn initialization(node: &str, declarer: &str, outline: &Outline) -> Result<Initialization, ConfigurationError> {
    let mut init = Initialization::default();
    let mut scanned = vec![declarer];
    if declarer != node {
        scanned.push(node);
    }

    for section_name in scanned {
        let Some(section) = outline.section(section_name) else {
            continue;
        };
        for field in Initialization::FIELDS {
            let qualified = format!("{}_{}", node, field);
            let found = section.get(&qualified).map(|v| (qualified.as_str(), v)).or_else(|| {
                (section_name == node)
                    .then(|| section.get(field).map(|v| (field, v)))
                    .flatten()
            });
            if let Some((key, value)) = found {
                apply_field(&mut init, field, value, section_name, key)?;
            }
        }
    }
    Ok(init)
}

fn apply_field(
    init: &mut Initialization,
    field: &str,
    value: &Value,
    section: &str,
    key: &str,
) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    };

    match field {
        "iterations" => {
            let iterations = Iterations::from_value(value)
                .ok_or_else(|| invalid("expected a non-negative integer or \"infinite\""))?;
            init.iterations = Some(iterations);
        }
        "criteria" => {
            let criteria = value.as_str().ok_or_else(|| invalid("expected a name"))?;
            init.criteria = Some(criteria.to_string());
        }
        "selected" => {
            init.selected = Some(listify(value, section, key)?);
        }
        "implementation" => {
            let table = value
                .as_object()
                .ok_or_else(|| invalid("expected a table of parameter = attribute"))?;
            let mut implementation = IndexMap::new();
            for (parameter, attribute) in table {
                let attribute = attribute
                    .as_str()
                    .ok_or_else(|| invalid("attribute names must be strings"))?;
                implementation.insert(parameter.clone(), attribute.to_string());
            }
            init.implementation = Some(implementation);
        }
        _ => {}
    }
    Ok(())
}

/// Add the structure below `node` to `workflow`. `node` must already be present.
fn expand(
    workflow: &mut Workflow,
    node: &str,
    connections: &Connections,
    kinds: &IndexMap<String, Kind>,
) -> FiatResult<()> {
    let Some(children) = connections.get(node) else {
        return Ok(());
    };
    match kinds.get(node).copied().unwrap_or(Kind::Technique) {
        Kind::Technique => Err(ConfigurationError::TechniqueWithChildren(node.to_string()).into()),
        Kind::Laborer => {
            let order = serial_order(node, connections)?;
            workflow.extend_from(&order, &[node])?;
            Ok(())
        }
        Kind::Step | Kind::Manager(_) => {
            workflow.branchify_from(&[children.clone()], &[node])?;
            for child in children {
                expand(workflow, child, connections, kinds)?;
            }
            Ok(())
        }
    }
}

/// The sub-workflow a worker runs: its children expanded the same way
/// the project workflow expands them.
fn organize(
    node: &str,
    connections: &Connections,
    kinds: &IndexMap<String, Kind>,
) -> FiatResult<Workflow> {
    let mut workflow = Workflow::new();
    let Some(children) = connections.get(node) else {
        return Ok(workflow);
    };
    match kinds.get(node).copied().unwrap_or(Kind::Technique) {
        Kind::Laborer => {
            let order = serial_order(node, connections)?;
            workflow.extend(&order)?;
        }
        _ => {
            workflow.branchify(&[children.clone()])?;
            for child in children {
                expand(&mut workflow, child, connections, kinds)?;
            }
        }
    }
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Category, Resolution};
    use crate::error::FiatError;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn connections(pairs: &[(&str, &[&str])]) -> Connections {
        pairs
            .iter()
            .map(|(parent, children)| (parent.to_string(), names(children)))
            .collect()
    }

    #[test]
    fn test_serial_order_depth_first() {
        let connections = connections(&[("a", &["b", "c"]), ("b", &["d"])]);
        assert_eq!(serial_order("a", &connections).unwrap(), names(&["b", "d", "c"]));
        assert!(serial_order("z", &connections).unwrap().is_empty());
    }

    #[test]
    fn test_serial_order_detects_cycles() {
        let connections = connections(&[("a", &["b"]), ("b", &["a"])]);
        assert!(matches!(
            serial_order("a", &connections),
            Err(ConfigurationError::CyclicDeclaration(node)) if node == "a"
        ));
    }

    #[test]
    fn test_manager_with_step_branches() {
        let outline = Outline::from_toml_str(
            r#"
            [pipeline]
            design = "manager"
            pipeline_steps = ["search", "divide"]

            [search]
            search_techniques = ["find", "locate"]
            "#,
        )
        .unwrap();
        let mut library = Library::new();
        let workflow = create_workflow(&outline, &mut library).unwrap();

        let mut paths = workflow.paths();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                names(&["pipeline", "divide"]),
                names(&["pipeline", "search", "find"]),
                names(&["pipeline", "search", "locate"]),
            ]
        );

        assert_eq!(library.classify("pipeline").unwrap(), Category::Manager);
        assert_eq!(library.classify("find").unwrap(), Category::Task);

        let find = library.instance(&["find"], Initialization::default()).unwrap();
        assert_eq!(find.step.as_deref(), Some("search"));

        let pipeline = library
            .instance(&["pipeline"], Initialization::default())
            .unwrap();
        assert_eq!(pipeline.kind, Kind::Manager(Resolution::Study));
        let mut branches = pipeline.workflow().map(|w| w.paths()).unwrap_or_default();
        branches.sort();
        assert_eq!(
            branches,
            vec![
                names(&["divide"]),
                names(&["search", "find"]),
                names(&["search", "locate"]),
            ]
        );
    }

    #[test]
    fn test_registered_root_without_design() {
        let outline = Outline::from_toml_str(
            r#"
            [pipeline]
            pipeline_steps = ["search", "divide"]

            [search]
            search_techniques = ["find", "locate"]
            "#,
        )
        .unwrap();
        let mut library = Library::new();
        library
            .register(Component::manager("pipeline", Resolution::Contest))
            .unwrap();

        let workflow = create_workflow(&outline, &mut library).unwrap();
        assert_eq!(workflow.paths().len(), 3);

        let pipeline = library.instance(&["pipeline"], Initialization::default()).unwrap();
        assert_eq!(pipeline.kind, Kind::Manager(Resolution::Contest));
        assert!(pipeline.workflow().is_some());
    }

    #[test]
    fn test_laborer_is_serial() {
        let outline = Outline::from_toml_str(
            r#"
            [cleaner]
            design = "laborer"
            cleaner_steps = "scrub, rinse"

            [scrub]
            scrub_techniques = ["soap"]
            "#,
        )
        .unwrap();
        let mut library = Library::new();
        let workflow = create_workflow(&outline, &mut library).unwrap();

        assert_eq!(
            workflow.paths(),
            vec![names(&["cleaner", "scrub", "soap", "rinse"])]
        );

        let cleaner = library.instance(&["cleaner"], Initialization::default()).unwrap();
        assert!(matches!(cleaner.contents, Contents::Workflow(_)));
        assert_eq!(
            cleaner.workflow().map(|w| w.paths()).unwrap_or_default(),
            vec![names(&["scrub", "soap", "rinse"])]
        );
    }

    #[test]
    fn test_initialization_fields() {
        let outline = Outline::from_toml_str(
            r#"
            [pipeline]
            design = "contest"
            pipeline_steps = ["search"]
            search_iterations = 3
            criteria = "judge"

            [search]
            iterations = 5
            selected = "depth, width"

            [search.implementation]
            seed = "data"
            "#,
        )
        .unwrap();
        let mut library = Library::new();
        create_workflow(&outline, &mut library).unwrap();

        let search = library.instance(&["search"], Initialization::default()).unwrap();
        assert_eq!(search.iterations, Iterations::Count(5));
        assert_eq!(search.parameters.selected, names(&["depth", "width"]));
        assert_eq!(
            search.parameters.implementation.get("seed").map(String::as_str),
            Some("data")
        );

        let pipeline = library.instance(&["pipeline"], Initialization::default()).unwrap();
        assert_eq!(pipeline.criteria.as_deref(), Some("judge"));
        assert_eq!(pipeline.kind, Kind::Manager(Resolution::Contest));
    }

    #[test]
    fn test_technique_with_children_rejected() {
        let outline = Outline::from_toml_str(
            r#"
            [root]
            design = "technique"
            root_steps = ["child"]
            "#,
        )
        .unwrap();
        let result = create_workflow(&outline, &mut Library::new());
        assert!(matches!(
            result,
            Err(FiatError::Configuration(ConfigurationError::TechniqueWithChildren(_)))
        ));
    }

    #[test]
    fn test_missing_root() {
        let outline = Outline::from_toml_str(
            r#"
            [a]
            design = "manager"
            a_steps = ["b"]

            [b]
            design = "manager"
            b_steps = ["a"]
            "#,
        )
        .unwrap();
        let result = create_workflow(&outline, &mut Library::new());
        assert!(matches!(
            result,
            Err(FiatError::Configuration(ConfigurationError::MissingRoot))
        ));
    }

    #[test]
    fn test_invalid_iterations() {
        let outline = Outline::from_toml_str(
            r#"
            [pipeline]
            design = "manager"
            pipeline_steps = ["search"]
            search_iterations = "often"
            "#,
        )
        .unwrap();
        let result = create_workflow(&outline, &mut Library::new());
        assert!(matches!(
            result,
            Err(FiatError::Configuration(ConfigurationError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_empty_outline_yields_empty_workflow() {
        let outline = Outline::from_toml_str("[general]\nseed = 1\n").unwrap();
        let workflow = create_workflow(&outline, &mut Library::new()).unwrap();
        assert!(workflow.is_empty());
    }
}
