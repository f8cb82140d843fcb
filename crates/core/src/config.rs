use crate::error::ConfigurationError;
use crate::outline::Outline;
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outline section reserved for project settings.
pub const PROJECT_SECTION: &str = "project";

/// Settings read from the `[project]` section of an outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub parallelize: bool,

    /// Safety cap for components with infinite iterations.
    #[serde(default)]
    pub iteration_limit: Option<u64>,

    #[serde(default = "default_stages")]
    pub stages: Vec<String>,

    #[serde(default = "default_summary_prefix")]
    pub summary_prefix: String,
}

fn default_name() -> String {
    "fiat_project".to_string()
}

fn default_stages() -> Vec<String> {
    Stage::ALL.iter().map(|stage| stage.to_string()).collect()
}

fn default_summary_prefix() -> String {
    "path".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            parallelize: false,
            iteration_limit: None,
            stages: default_stages(),
            summary_prefix: default_summary_prefix(),
        }
    }
}

impl ProjectConfig {
    /// Read the `[project]` section, falling back to defaults when absent.
    pub fn from_outline(outline: &Outline) -> Result<Self, ConfigurationError> {
        match outline.section(PROJECT_SECTION) {
            Some(section) => serde_json::from_value(Value::Object(section.clone()))
                .map_err(ConfigurationError::Project),
            None => {
                tracing::debug!("No [project] section found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse the configured stage names in order.
    pub fn stage_order(&self) -> Result<Vec<Stage>, ConfigurationError> {
        self.stages
            .iter()
            .map(|name| name.parse().map_err(ConfigurationError::UnknownStage))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_project_section() {
        let outline = Outline::from_toml_str("[general]\nseed = 43\n").unwrap();
        let config = ProjectConfig::from_outline(&outline).unwrap();

        assert_eq!(config, ProjectConfig::default());
        assert_eq!(
            config.stage_order().unwrap(),
            vec![Stage::Settings, Stage::Workflow, Stage::Summary]
        );
    }

    #[test]
    fn test_project_section_overrides() {
        let outline = Outline::from_toml_str(
            r#"
            [project]
            name = "wisconsin"
            parallelize = true
            iteration_limit = 50
            "#,
        )
        .unwrap();
        let config = ProjectConfig::from_outline(&outline).unwrap();

        assert_eq!(config.name, "wisconsin");
        assert!(config.parallelize);
        assert_eq!(config.iteration_limit, Some(50));
        assert_eq!(config.summary_prefix, "path");
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let outline =
            Outline::from_toml_str("[project]\nstages = [\"settings\", \"publish\"]\n").unwrap();
        let config = ProjectConfig::from_outline(&outline).unwrap();

        assert!(matches!(
            config.stage_order(),
            Err(ConfigurationError::UnknownStage(name)) if name == "publish"
        ));
    }

    #[test]
    fn test_malformed_project_section() {
        let outline = Outline::from_toml_str("[project]\nparallelize = \"sometimes\"\n").unwrap();
        assert!(matches!(
            ProjectConfig::from_outline(&outline),
            Err(ConfigurationError::Project(_))
        ));
    }
}
