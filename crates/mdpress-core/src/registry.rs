use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a mapped component is exported from its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportType {
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "named")]
    Named,
}

impl Default for ExportType {
    fn default() -> Self {
        ExportType::Default
    }
}

/// A renderable component a directive can map to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    pub module_path: String,
    #[serde(default)]
    pub export_type: ExportType,
}

/// Static directive/component mapping, part of the pipeline config
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Directive name -> component name
    #[serde(default)]
    pub directives: IndexMap<String, String>,

    /// Component name -> definition
    #[serde(default)]
    pub components: IndexMap<String, ComponentDefinition>,
}

/// Read-only lookup over the configured mappings
///
/// Built once per session from static configuration; consumed by the
/// built-in injection step and exposed to user hooks through the
/// transform context.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    config: RegistryConfig,
}

impl ComponentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    /// Component name for a directive, if mapped
    pub fn lookup_directive(&self, name: &str) -> Option<&str> {
        self.config.directives.get(name).map(|s| s.as_str())
    }

    pub fn lookup_component(&self, name: &str) -> Option<&ComponentDefinition> {
        self.config.components.get(name)
    }

    pub fn all_components(&self) -> impl Iterator<Item = (&str, &ComponentDefinition)> {
        self.config
            .components
            .iter()
            .map(|(name, def)| (name.as_str(), def))
    }

    pub fn is_empty(&self) -> bool {
        self.config.directives.is_empty() && self.config.components.is_empty()
    }
}
