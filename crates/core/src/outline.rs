//! Outline loading and resolution.
//!
//! An outline is a two-level ordered map of section name to settings. Keys
//! ending in a registered design suffix declare sub-components; everything
//! else is an ordinary setting. The functions here derive the component
//! structure from those declarations. Apart from its suffixes, the library
//! is only consulted for the design of a node nothing declares.

use crate::config::PROJECT_SECTION;
use crate::error::ConfigurationError;
use crate::library::Library;
use crate::types::Section;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;

/// Parent node → declared children, in declaration order.
pub type Connections = IndexMap<String, Vec<String>>;

/// Two-level settings map, document order preserved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outline {
    sections: IndexMap<String, Section>,
}

impl Outline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sections(sections: IndexMap<String, Section>) -> Self {
        Self { sections }
    }

    /// Parse TOML text. Every top-level entry must be a table.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        let table: toml::Table = toml::from_str(content)?;
        let mut sections = IndexMap::new();

        for (name, value) in table {
            let converted = serde_json::to_value(&value).map_err(|e| {
                ConfigurationError::InvalidValue {
                    section: name.clone(),
                    key: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            match converted {
                Value::Object(section) => {
                    sections.insert(name, section);
                }
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        section: name.clone(),
                        key: name,
                        reason: "top-level entries must be sections".to_string(),
                    })
                }
            }
        }

        Ok(Self { sections })
    }

    /// Load an outline from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let outline = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded outline from {} ({} sections)",
            path.display(),
            outline.len()
        );
        Ok(outline)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|s| s.get(key))
    }

    pub fn insert_section(&mut self, name: impl Into<String>, section: Section) {
        self.sections.insert(name.into(), section);
    }

    /// Set a single value, creating the section if needed.
    pub fn set(&mut self, section: &str, key: impl Into<String>, value: Value) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Section)> {
        self.sections.iter()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Sections that may declare components.
    fn declaring_sections(&self) -> impl Iterator<Item = (&String, &Section)> {
        self.sections
            .iter()
            .filter(|(name, _)| name.as_str() != PROJECT_SECTION)
    }
}

/// A key that declares sub-components
#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration<'a> {
    prefix: &'a str,
    suffix: &'a str,
}

/// Split a key into prefix and suffix if it ends in a registered suffix.
/// The longest matching suffix wins.
fn divide_key<'a>(key: &'a str, suffixes: &'a [String]) -> Option<Declaration<'a>> {
    let suffix = suffixes
        .iter()
        .filter(|suffix| {
            key == suffix.as_str()
                || (key.len() > suffix.len() + 1
                    && key.ends_with(suffix.as_str())
                    && key.as_bytes()[key.len() - suffix.len() - 1] == b'_')
        })
        .max_by_key(|suffix| suffix.len())?;

    let prefix = if key == suffix.as_str() {
        key
    } else {
        &key[..key.len() - suffix.len() - 1]
    };

    Some(Declaration {
        prefix,
        suffix: suffix.as_str(),
    })
}

/// Normalize a declaration value into a list of names.
///
/// Strings are split on commas; arrays must hold only strings.
pub fn listify(value: &Value, section: &str, key: &str) -> Result<Vec<String>, ConfigurationError> {
    let invalid = || ConfigurationError::InvalidDeclaration {
        section: section.to_string(),
        key: key.to_string(),
    };

    match value {
        Value::String(text) => Ok(text
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(|s| s.trim().to_string()).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Every declaring key in the outline as (section, key, suffix, children).
fn declarations<'a>(
    outline: &'a Outline,
    suffixes: &'a [String],
) -> Result<Vec<(&'a str, Declaration<'a>, Vec<String>)>, ConfigurationError> {
    let mut found = Vec::new();
    for (name, section) in outline.declaring_sections() {
        for (key, value) in section {
            if let Some(declaration) = divide_key(key, suffixes) {
                let children = listify(value, name, key)?;
                found.push((name.as_str(), declaration, children));
            }
        }
    }
    Ok(found)
}

/// Map each declaring node to its declared children.
///
/// A qualified key (`search_techniques`) attributes its children to the
/// prefix; a bare key (`techniques`) attributes them to its section. Lists
/// for the same parent are extended, never replaced.
pub fn connections(outline: &Outline, suffixes: &[String]) -> Result<Connections, ConfigurationError> {
    let mut connections = Connections::new();
    for (section, declaration, children) in declarations(outline, suffixes)? {
        let parent = if declaration.prefix == declaration.suffix {
            section
        } else {
            declaration.prefix
        };
        let entry = connections.entry(parent.to_string()).or_default();
        for child in children {
            if !entry.contains(&child) {
                entry.push(child);
            }
        }
    }
    Ok(connections)
}

/// Map each node to the first section that declares it as a child.
pub fn declarers(
    outline: &Outline,
    suffixes: &[String],
) -> Result<IndexMap<String, String>, ConfigurationError> {
    let mut declarers: IndexMap<String, String> = IndexMap::new();
    for (section, _, children) in declarations(outline, suffixes)? {
        for child in children {
            match declarers.get(&child) {
                Some(existing) if existing != section => {
                    tracing::debug!(
                        "Node {} declared by both {} and {}, keeping {}",
                        child,
                        existing,
                        section,
                        existing
                    );
                }
                Some(_) => {}
                None => {
                    declarers.insert(child, section.to_string());
                }
            }
        }
    }
    Ok(declarers)
}

/// Map each node to the section that owns it.
///
/// A declaring section owns itself. Any other node is owned by the first
/// section that declares it.
pub fn sections(
    outline: &Outline,
    suffixes: &[String],
) -> Result<IndexMap<String, String>, ConfigurationError> {
    let mut owners = IndexMap::new();
    for (section, _, _) in declarations(outline, suffixes)? {
        owners.insert(section.to_string(), section.to_string());
    }
    for (node, declarer) in declarers(outline, suffixes)? {
        owners.entry(node).or_insert(declarer);
    }
    Ok(owners)
}

/// Every node mentioned as a parent or child, deduplicated, first appearance first.
pub fn nodes(outline: &Outline, suffixes: &[String]) -> Result<Vec<String>, ConfigurationError> {
    let connections = connections(outline, suffixes)?;
    Ok(flatten_connections(&connections))
}

fn flatten_connections(connections: &Connections) -> Vec<String> {
    let mut nodes: Vec<String> = Vec::new();
    for (parent, children) in connections {
        for name in std::iter::once(parent).chain(children) {
            if !nodes.contains(name) {
                nodes.push(name.clone());
            }
        }
    }
    nodes
}

/// Resolve the design of every node from the outline alone.
pub fn designs(
    outline: &Outline,
    suffixes: &[String],
) -> Result<IndexMap<String, String>, ConfigurationError> {
    designs_with(outline, suffixes, |_| None)
}

/// Resolve the design of every node.
///
/// Checked in order: `<name>_design` or `design` in the node's own section,
/// `<name>_design` in the declaring section, the suffix of the key that
/// declared the node, then `registered`, which looks the bare name up in a
/// library.
pub fn designs_with(
    outline: &Outline,
    suffixes: &[String],
    registered: impl Fn(&str) -> Option<String>,
) -> Result<IndexMap<String, String>, ConfigurationError> {
    let declarers = declarers(outline, suffixes)?;
    let found = declarations(outline, suffixes)?;
    let nodes = nodes(outline, suffixes)?;

    let mut designs = IndexMap::new();
    for node in &nodes {
        let qualified = format!("{}_design", node);
        let declarer = declarers.get(node).map(String::as_str);

        let explicit = outline
            .get(node, &qualified)
            .map(|value| (node.as_str(), qualified.as_str(), value))
            .or_else(|| outline.get(node, "design").map(|value| (node.as_str(), "design", value)))
            .or_else(|| {
                declarer
                    .filter(|declarer| *declarer != node.as_str())
                    .and_then(|declarer| {
                        outline
                            .get(declarer, &qualified)
                            .map(|v| (declarer, qualified.as_str(), v))
                    })
            });

        let design = match explicit {
            Some((section, key, value)) => value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigurationError::InvalidValue {
                    section: section.to_string(),
                    key: key.to_string(),
                    reason: "design must be a string".to_string(),
                })?,
            None => {
                let declared_by = found.iter().find(|(section, _, children)| {
                    Some(*section) == declarer && children.contains(node)
                });
                match declared_by {
                    Some((_, declaration, _)) => singularize(declaration.suffix, suffixes),
                    None => registered(node)
                        .ok_or_else(|| ConfigurationError::UnresolvedDesign(node.clone()))?,
                }
            }
        };
        designs.insert(node.clone(), design);
    }
    Ok(designs)
}

/// Turn a matched suffix back into its design tag.
fn singularize(suffix: &str, suffixes: &[String]) -> String {
    match suffix.strip_suffix('s') {
        Some(stem) if suffixes.iter().any(|s| s == stem) => stem.to_string(),
        _ => suffix.to_string(),
    }
}

/// Every resolver output for one outline and library
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub connections: Connections,
    pub sections: IndexMap<String, String>,
    pub declarers: IndexMap<String, String>,
    pub designs: IndexMap<String, String>,
    pub nodes: Vec<String>,
}

impl Resolved {
    pub fn resolve(outline: &Outline, library: &Library) -> Result<Self, ConfigurationError> {
        let suffixes = library.suffixes();
        let connections = connections(outline, &suffixes)?;
        let nodes = flatten_connections(&connections);
        let registered = |node: &str| {
            library
                .select(&[node])
                .ok()
                .map(|blueprint| blueprint.design.clone())
        };

        let resolved = Self {
            sections: sections(outline, &suffixes)?,
            declarers: declarers(outline, &suffixes)?,
            designs: designs_with(outline, &suffixes, registered)?,
            connections,
            nodes,
        };
        tracing::debug!(
            "Resolved outline: {} nodes, {} declaring",
            resolved.nodes.len(),
            resolved.connections.len()
        );
        Ok(resolved)
    }

    /// Declaring nodes that no other node declares.
    pub fn roots(&self) -> Vec<String> {
        self.connections
            .keys()
            .filter(|parent| {
                !self
                    .connections
                    .values()
                    .any(|children| children.contains(parent))
            })
            .cloned()
            .collect()
    }

    /// The node that declared `node`, if any.
    pub fn parent(&self, node: &str) -> Option<&str> {
        self.connections
            .iter()
            .find(|(_, children)| children.iter().any(|child| child == node))
            .map(|(parent, _)| parent.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Resolution};
    use serde_json::json;
    use std::io::Write;

    fn suffixes() -> Vec<String> {
        ["technique", "techniques", "step", "steps", "manager", "managers", "worker", "workers"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn sample() -> Outline {
        Outline::from_toml_str(
            r#"
            [pipeline]
            design = "manager"
            pipeline_steps = ["search", "divide"]

            [search]
            search_techniques = "find, locate"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_listify() {
        assert_eq!(
            listify(&json!("a, b,c"), "s", "k").unwrap(),
            vec!["a", "b", "c"]
        );
        assert_eq!(listify(&json!(["x"]), "s", "k").unwrap(), vec!["x"]);
        assert_eq!(listify(&json!("solo"), "s", "k").unwrap(), vec!["solo"]);
        assert!(matches!(
            listify(&json!(3), "s", "k"),
            Err(ConfigurationError::InvalidDeclaration { .. })
        ));
        assert!(listify(&json!(["x", 1]), "s", "k").is_err());
    }

    #[test]
    fn test_divide_key_prefers_longest_suffix() {
        let suffixes = vec!["steps".to_string(), "sub_steps".to_string()];
        let declaration = divide_key("pipeline_sub_steps", &suffixes).unwrap();
        assert_eq!(declaration.prefix, "pipeline");
        assert_eq!(declaration.suffix, "sub_steps");

        let bare = divide_key("steps", &suffixes).unwrap();
        assert_eq!(bare.prefix, bare.suffix);

        assert!(divide_key("footsteps", &suffixes).is_none());
        assert!(divide_key("seed", &suffixes).is_none());
    }

    #[test]
    fn test_connections() {
        let connections = connections(&sample(), &suffixes()).unwrap();
        assert_eq!(connections["pipeline"], vec!["search", "divide"]);
        assert_eq!(connections["search"], vec!["find", "locate"]);
    }

    #[test]
    fn test_bare_key_attributes_to_section() {
        let outline = Outline::from_toml_str(
            r#"
            [search]
            techniques = ["find"]
            search_techniques = ["locate", "find"]
            "#,
        )
        .unwrap();
        let connections = connections(&outline, &suffixes()).unwrap();
        assert_eq!(connections["search"], vec!["find", "locate"]);
    }

    #[test]
    fn test_sections_and_nodes() {
        let outline = sample();
        let owners = sections(&outline, &suffixes()).unwrap();
        assert_eq!(owners["pipeline"], "pipeline");
        assert_eq!(owners["search"], "search");
        assert_eq!(owners["divide"], "pipeline");
        assert_eq!(owners["find"], "search");

        let declarers = declarers(&outline, &suffixes()).unwrap();
        assert_eq!(declarers["search"], "pipeline");
        assert!(!declarers.contains_key("pipeline"));

        let nodes = nodes(&outline, &suffixes()).unwrap();
        assert_eq!(nodes, vec!["pipeline", "search", "divide", "find", "locate"]);
    }

    #[test]
    fn test_designs_from_suffix_and_explicit() {
        let mut outline = sample();
        outline.set("search", "locate_design", json!("worker"));
        let designs = designs(&outline, &suffixes()).unwrap();

        assert_eq!(designs["pipeline"], "manager");
        assert_eq!(designs["search"], "step");
        assert_eq!(designs["divide"], "step");
        assert_eq!(designs["find"], "technique");
        assert_eq!(designs["locate"], "worker");
    }

    #[test]
    fn test_unresolved_design() {
        let outline = Outline::from_toml_str("[pipeline]\npipeline_steps = [\"a\"]\n").unwrap();
        assert!(matches!(
            designs(&outline, &suffixes()),
            Err(ConfigurationError::UnresolvedDesign(node)) if node == "pipeline"
        ));
    }

    #[test]
    fn test_project_section_never_declares() {
        let outline = Outline::from_toml_str("[project]\nsteps = [\"a\"]\n").unwrap();
        assert!(connections(&outline, &suffixes()).unwrap().is_empty());
    }

    #[test]
    fn test_resolution_roots_and_parent() {
        let resolved = Resolved::resolve(&sample(), &Library::new()).unwrap();
        assert_eq!(resolved.roots(), vec!["pipeline"]);
        assert_eq!(resolved.parent("find"), Some("search"));
        assert_eq!(resolved.parent("pipeline"), None);
    }

    #[test]
    fn test_declaring_section_design_for_child() {
        let mut outline = sample();
        outline.set("pipeline", "search_design", json!("survey"));
        let designs = designs(&outline, &suffixes()).unwrap();
        assert_eq!(designs["search"], "survey");
    }

    #[test]
    fn test_registered_root_supplies_design() {
        let outline = Outline::from_toml_str(
            r#"
            [pipeline]
            pipeline_steps = ["search", "divide"]
            "#,
        )
        .unwrap();
        let mut library = Library::new();
        library
            .register(Component::manager("pipeline", Resolution::Contest))
            .unwrap();

        let resolved = Resolved::resolve(&outline, &library).unwrap();
        assert_eq!(resolved.designs["pipeline"], "contest");
        assert_eq!(resolved.designs["search"], "step");

        assert!(matches!(
            Resolved::resolve(&outline, &Library::new()),
            Err(ConfigurationError::UnresolvedDesign(node)) if node == "pipeline"
        ));
    }

    #[test]
    fn test_same_parent_across_sections_accumulates() {
        let outline = Outline::from_toml_str(
            r#"
            [a]
            x_steps = ["p"]

            [b]
            x_steps = ["q", "p"]
            "#,
        )
        .unwrap();
        let connections = connections(&outline, &suffixes()).unwrap();
        assert_eq!(connections["x"], vec!["p", "q"]);

        let declarers = declarers(&outline, &suffixes()).unwrap();
        assert_eq!(declarers["p"], "a");
        assert_eq!(declarers["q"], "b");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\nverbose = true\nseed = 43").unwrap();

        let outline = Outline::load(file.path()).unwrap();
        assert_eq!(outline.get("general", "seed"), Some(&json!(43)));
        assert_eq!(outline.get("general", "verbose"), Some(&json!(true)));
    }

    #[test]
    fn test_top_level_values_rejected() {
        assert!(matches!(
            Outline::from_toml_str("name = \"loose\"\n"),
            Err(ConfigurationError::InvalidValue { .. })
        ));
        assert!(matches!(
            Outline::load("/nonexistent/fiat.toml"),
            Err(ConfigurationError::Io(_))
        ));
    }
}
