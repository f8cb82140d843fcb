// Component library: registered designs and named instances

use crate::component::{Blueprint, Category, Component, Initialization, Kind, Resolution};
use crate::error::LibraryError;
use heck::ToSnakeCase;
use indexmap::IndexMap;

/// Ordered name → item store
#[derive(Debug, Clone)]
pub struct Registry<T> {
    contents: IndexMap<String, T>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            contents: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, item: T) {
        self.contents.insert(name.into(), item);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.contents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contents.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.contents.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.contents.iter()
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can be registered with a library
#[derive(Debug, Clone)]
pub enum Registration {
    Blueprint(Blueprint),
    Component(Component),
}

impl From<Blueprint> for Registration {
    fn from(blueprint: Blueprint) -> Self {
        Self::Blueprint(blueprint)
    }
}

impl From<Component> for Registration {
    fn from(component: Component) -> Self {
        Self::Component(component)
    }
}

/// Registry of designs (`subclasses`) and configured components (`instances`)
#[derive(Debug, Clone)]
pub struct Library {
    pub subclasses: Registry<Blueprint>,
    pub instances: Registry<Component>,
}

/// Normalize a registry key.
pub fn keyify(name: &str) -> String {
    name.to_snake_case()
}

impl Library {
    /// A library with no registered designs.
    pub fn empty() -> Self {
        Self {
            subclasses: Registry::new(),
            instances: Registry::new(),
        }
    }

    /// A library holding the built-in designs.
    pub fn new() -> Self {
        let mut library = Self::empty();
        let builtins = [
            Blueprint::new("technique", Kind::Technique),
            Blueprint::new("step", Kind::Step),
            Blueprint::new("laborer", Kind::Laborer),
            Blueprint::new("worker", Kind::Laborer),
            Blueprint::new("manager", Kind::Manager(Resolution::Study)),
            Blueprint::new("contest", Kind::Manager(Resolution::Contest)),
            Blueprint::new("study", Kind::Manager(Resolution::Study)),
            Blueprint::new("survey", Kind::Manager(Resolution::Survey)),
        ];
        for blueprint in builtins {
            library
                .subclasses
                .insert(keyify(&blueprint.design), blueprint);
        }
        library
    }

    /// Register a design or a configured component.
    ///
    /// Registering a component also registers a blueprint for its design if
    /// none exists yet, so every instance's design can be selected.
    pub fn register(&mut self, item: impl Into<Registration>) -> Result<(), LibraryError> {
        match item.into() {
            Registration::Blueprint(blueprint) => {
                let key = keyify(&blueprint.design);
                if key.is_empty() {
                    return Err(LibraryError::InvalidRegistration(format!("{:?}", blueprint)));
                }
                tracing::debug!("Registered design {}", key);
                self.subclasses.insert(key, blueprint);
            }
            Registration::Component(component) => {
                let design = keyify(&component.design);
                let name = if component.name.is_empty() {
                    design.clone()
                } else {
                    keyify(&component.name)
                };
                if name.is_empty() {
                    return Err(LibraryError::InvalidRegistration(format!("{:?}", component)));
                }
                if !design.is_empty() && !self.subclasses.contains(&design) {
                    tracing::debug!("Registered design {} from instance {}", design, name);
                    self.subclasses.insert(design, Blueprint::from(&component));
                }
                tracing::debug!("Registered instance {}", name);
                self.instances.insert(name, component);
            }
        }
        Ok(())
    }

    /// Find the design for the first matching name.
    ///
    /// Designs are checked before instances; an instance match returns the
    /// design it was built from.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<&Blueprint, LibraryError> {
        for name in names {
            let key = keyify(name.as_ref());
            if let Some(blueprint) = self.subclasses.get(&key) {
                return Ok(blueprint);
            }
            if let Some(blueprint) = self
                .instances
                .get(&key)
                .and_then(|instance| self.subclasses.get(&keyify(&instance.design)))
            {
                return Ok(blueprint);
            }
        }
        Err(not_found(names))
    }

    /// Produce a component for the first matching name.
    ///
    /// Instances are checked before designs. An instance match returns an
    /// independent copy with `init` applied; a design match builds a new
    /// component named after the first candidate.
    pub fn instance<S: AsRef<str>>(
        &self,
        names: &[S],
        init: Initialization,
    ) -> Result<Component, LibraryError> {
        let primary = names
            .first()
            .map(|name| name.as_ref().to_string())
            .ok_or_else(|| LibraryError::NotFound(Vec::new()))?;

        for name in names {
            let key = keyify(name.as_ref());
            if let Some(instance) = self.instances.get(&key) {
                let mut component = instance.clone();
                component.apply(init);
                return Ok(component);
            }
            if let Some(blueprint) = self.subclasses.get(&key) {
                return Ok(blueprint.build(primary, init));
            }
        }
        Err(not_found(names))
    }

    /// Report which category a registered name belongs to.
    pub fn classify(&self, name: &str) -> Result<Category, LibraryError> {
        let key = keyify(name);
        self.instances
            .get(&key)
            .map(|instance| instance.kind)
            .or_else(|| self.subclasses.get(&key).map(|blueprint| blueprint.kind))
            .map(|kind| kind.category())
            .ok_or_else(|| LibraryError::Unclassified(name.to_string()))
    }

    /// Every design tag and its plural, used to recognize declaring keys.
    pub fn suffixes(&self) -> Vec<String> {
        let mut suffixes = Vec::new();
        for design in self.subclasses.keys() {
            suffixes.push(design.clone());
            suffixes.push(format!("{}s", design));
        }
        suffixes
    }

    fn names_in(&self, category: Category) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let kinds = self
            .subclasses
            .iter()
            .map(|(name, blueprint)| (name, blueprint.kind))
            .chain(self.instances.iter().map(|(name, c)| (name, c.kind)));
        for (name, kind) in kinds {
            if kind.category() == category && !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn laborers(&self) -> Vec<String> {
        self.names_in(Category::Laborer)
    }

    pub fn managers(&self) -> Vec<String> {
        self.names_in(Category::Manager)
    }

    pub fn tasks(&self) -> Vec<String> {
        self.names_in(Category::Task)
    }

    /// Laborers and managers together.
    pub fn workers(&self) -> Vec<String> {
        let mut workers = self.laborers();
        workers.extend(self.managers());
        workers
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found<S: AsRef<str>>(names: &[S]) -> LibraryError {
    LibraryError::NotFound(names.iter().map(|n| n.as_ref().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Flow, Iterations};
    use serde_json::json;

    #[test]
    fn test_builtins_and_suffixes() {
        let library = Library::new();
        let suffixes = library.suffixes();

        assert!(suffixes.contains(&"technique".to_string()));
        assert!(suffixes.contains(&"techniques".to_string()));
        assert!(suffixes.contains(&"steps".to_string()));
        assert_eq!(library.select(&["worker"]).unwrap().kind, Kind::Laborer);
    }

    #[test]
    fn test_register_keys_are_snake_case() {
        let mut library = Library::new();
        library
            .register(Component::step("DivideData"))
            .unwrap();

        assert!(library.instances.contains("divide_data"));
        assert!(library.instance(&["divide_data"], Initialization::default()).is_ok());
    }

    #[test]
    fn test_register_instance_adds_design() {
        let mut library = Library::empty();
        library
            .register(Component::technique("scale", |call| {
                Ok(Flow::Halt(call.input.clone()))
            }).with_design("scaler"))
            .unwrap();

        let blueprint = library.select(&["scaler"]).unwrap();
        assert_eq!(blueprint.kind, Kind::Technique);
        assert!(blueprint.algorithm.is_some());
    }

    #[test]
    fn test_unnamed_registration_rejected() {
        let mut library = Library::new();
        let result = library.register(Component::new("", "", Kind::Step));
        assert!(matches!(result, Err(LibraryError::InvalidRegistration(_))));
    }

    #[test]
    fn test_select_falls_through_candidates() {
        let library = Library::new();
        let blueprint = library.select(&["search", "step"]).unwrap();
        assert_eq!(blueprint.design, "step");

        assert!(matches!(
            library.select(&["missing", "absent"]),
            Err(LibraryError::NotFound(names)) if names == vec!["missing", "absent"]
        ));
    }

    #[test]
    fn test_select_instance_returns_its_design() {
        let mut library = Library::new();
        library
            .register(Component::manager("pipeline", Resolution::Contest))
            .unwrap();

        let blueprint = library.select(&["pipeline"]).unwrap();
        assert_eq!(blueprint.kind, Kind::Manager(Resolution::Contest));
    }

    #[test]
    fn test_instance_prefers_instances() {
        let mut library = Library::new();
        library
            .register(Component::step("search").with_iterations(Iterations::Count(4)))
            .unwrap();

        let component = library
            .instance(&["search", "step"], Initialization::default())
            .unwrap();
        assert_eq!(component.iterations, Iterations::Count(4));

        let fresh = library
            .instance(&["divide", "step"], Initialization::default())
            .unwrap();
        assert_eq!(fresh.name, "divide");
        assert_eq!(fresh.iterations, Iterations::Count(1));
    }

    #[test]
    fn test_instances_are_independent_copies() {
        let mut library = Library::new();
        library.register(Component::step("search")).unwrap();

        let mut first = library
            .instance(&["search"], Initialization::default())
            .unwrap();
        first.parameters.set("depth", json!(3));

        let second = library
            .instance(&["search"], Initialization::default())
            .unwrap();
        assert!(second.parameters.contents.is_empty());
        assert!(library
            .instances
            .get("search")
            .map(|c| c.parameters.contents.is_empty())
            .unwrap_or(false));
    }

    #[test]
    fn test_classify() {
        let mut library = Library::new();
        library.register(Component::laborer("clean")).unwrap();

        assert_eq!(library.classify("clean").unwrap(), Category::Laborer);
        assert_eq!(library.classify("survey").unwrap(), Category::Manager);
        assert_eq!(library.classify("technique").unwrap(), Category::Task);
        assert!(matches!(
            library.classify("unknown"),
            Err(LibraryError::Unclassified(_))
        ));
    }

    #[test]
    fn test_category_listings() {
        let library = Library::new();
        assert_eq!(library.laborers(), vec!["laborer", "worker"]);
        assert_eq!(library.managers(), vec!["manager", "contest", "study", "survey"]);
        assert_eq!(library.tasks(), vec!["technique", "step"]);
        assert_eq!(library.workers().len(), 6);
    }
}
