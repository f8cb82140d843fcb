use crate::types::{ParameterMap, Section};
use indexmap::IndexMap;
use serde_json::Value;

/// Where parameters come from at finalization time
pub trait ParameterSource {
    /// A settings section, e.g. `find_parameters`.
    fn section(&self, name: &str) -> Option<&Section>;

    /// A project attribute available at runtime.
    fn attribute(&self, name: &str) -> Option<Value>;
}

/// Parameter bundle for one component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    /// Used to find matching `<name>_parameters` sections.
    pub name: String,
    /// Explicit values; always win.
    pub contents: ParameterMap,
    /// Fallbacks; always lose.
    pub default: ParameterMap,
    /// Parameter name → project attribute looked up at runtime.
    pub implementation: IndexMap<String, String>,
    /// When non-empty, only these parameters survive finalization.
    pub selected: Vec<String>,
}

impl Parameters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_contents(mut self, contents: ParameterMap) -> Self {
        self.contents = contents;
        self
    }

    pub fn with_default(mut self, default: ParameterMap) -> Self {
        self.default = default;
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.contents.insert(key.into(), value);
    }

    /// Merge every layer into the final argument map.
    ///
    /// Priority, lowest first: `default`, `overrides`, settings sections,
    /// runtime attributes, `contents`. The result is then filtered to
    /// `selected` if any names are selected.
    pub fn finalize(&self, source: &dyn ParameterSource, overrides: &ParameterMap) -> ParameterMap {
        let mut merged = self.default.clone();
        merged.extend(overrides.clone());
        merged.extend(self.from_settings(source));
        merged.extend(self.at_runtime(source));
        merged.extend(self.contents.clone());

        if !self.selected.is_empty() {
            merged.retain(|key, _| self.selected.contains(key));
        }
        merged
    }

    /// Values from `<name>_parameters`, else `<prefix>_parameters`, else `<suffix>_parameters`.
    fn from_settings(&self, source: &dyn ParameterSource) -> ParameterMap {
        let mut candidates = vec![format!("{}_parameters", self.name)];
        if let Some((prefix, suffix)) = self.name.rsplit_once('_') {
            candidates.push(format!("{}_parameters", prefix));
            candidates.push(format!("{}_parameters", suffix));
        }

        candidates
            .iter()
            .find_map(|key| source.section(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Look up each implementation entry; missing attributes are skipped.
    fn at_runtime(&self, source: &dyn ParameterSource) -> ParameterMap {
        let mut found = ParameterMap::new();
        for (parameter, attribute) in &self.implementation {
            match source.attribute(attribute) {
                Some(value) => {
                    found.insert(parameter.clone(), value);
                }
                None => tracing::debug!(
                    "Attribute {} not found for parameter {} of {}",
                    attribute,
                    parameter,
                    self.name
                ),
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeSource {
        sections: HashMap<String, Section>,
        attributes: HashMap<String, Value>,
    }

    impl ParameterSource for FakeSource {
        fn section(&self, name: &str) -> Option<&Section> {
            self.sections.get(name)
        }

        fn attribute(&self, name: &str) -> Option<Value> {
            self.attributes.get(name).cloned()
        }
    }

    fn map(value: Value) -> ParameterMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_layer_priority() {
        let mut source = FakeSource::default();
        source.sections.insert(
            "find_parameters".to_string(),
            map(json!({"depth": 2, "width": 5})),
        );
        source.attributes.insert("seed".to_string(), json!(43));

        let mut parameters = Parameters::new("find")
            .with_default(map(json!({"depth": 1, "width": 1, "mode": "fast"})))
            .with_contents(map(json!({"width": 9})));
        parameters
            .implementation
            .insert("random_state".to_string(), "seed".to_string());

        let finalized = parameters.finalize(&source, &map(json!({"mode": "slow"})));
        assert_eq!(
            Value::Object(finalized),
            json!({"depth": 2, "width": 9, "mode": "slow", "random_state": 43})
        );
    }

    #[test]
    fn test_prefix_and_suffix_sections() {
        let mut source = FakeSource::default();
        source
            .sections
            .insert("tree_parameters".to_string(), map(json!({"leaves": 3})));

        let parameters = Parameters::new("random_tree");
        let finalized = parameters.finalize(&source, &ParameterMap::new());
        assert_eq!(finalized.get("leaves"), Some(&json!(3)));
    }

    #[test]
    fn test_missing_runtime_attribute_skipped() {
        let source = FakeSource::default();
        let mut parameters = Parameters::new("find");
        parameters
            .implementation
            .insert("random_state".to_string(), "seed".to_string());

        assert!(parameters.finalize(&source, &ParameterMap::new()).is_empty());
    }

    #[test]
    fn test_selected_filters_result() {
        let source = FakeSource::default();
        let mut parameters =
            Parameters::new("find").with_contents(map(json!({"keep": 1, "drop": 2})));
        parameters.selected = vec!["keep".to_string()];

        let finalized = parameters.finalize(&source, &ParameterMap::new());
        assert_eq!(Value::Object(finalized), json!({"keep": 1}));
    }
}
