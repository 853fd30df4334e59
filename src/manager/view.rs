//! Read-only serializable snapshots of the management model.

use serde::Serialize;
use serde_json::Value;

use crate::manager::{Instance, Scope};
use crate::plugins::PluginInstance;
use crate::registry::FactoryInfo;
use crate::rules::RuleInstance;

#[derive(Debug, Clone, Serialize)]
pub struct CatalogueView {
    pub plugins: Vec<FactoryInfo>,
    pub rules: Vec<FactoryInfo>,
}

/// A rule or a plugin.
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub config: Value,
    pub metadata: Value,
}

impl From<&PluginInstance> for ItemView {
    fn from(plugin: &PluginInstance) -> Self {
        Self {
            id: plugin.id().to_string(),
            name: plugin.name().to_string(),
            description: plugin.description().to_string(),
            enabled: plugin.is_enabled(),
            config: plugin.config().clone(),
            metadata: plugin.metadata().clone(),
        }
    }
}

impl From<&RuleInstance> for ItemView {
    fn from(rule: &RuleInstance) -> Self {
        Self {
            id: rule.id().to_string(),
            name: rule.name().to_string(),
            description: rule.description().to_string(),
            enabled: true,
            config: rule.config().clone(),
            metadata: rule.metadata().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeView {
    pub id: String,
    pub name: String,
    pub rules: Vec<ItemView>,
    pub plugins: Vec<ItemView>,
}

impl From<&Scope> for ScopeView {
    fn from(scope: &Scope) -> Self {
        Self {
            id: scope.id().to_string(),
            name: scope.name().to_string(),
            rules: scope.rules().iter().map(|r| ItemView::from(r.as_ref())).collect(),
            plugins: scope
                .plugins()
                .iter()
                .map(|p| ItemView::from(p.as_ref()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub scopes: Vec<ScopeView>,
}

impl From<&Instance> for InstanceView {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id().to_string(),
            name: instance.name().to_string(),
            description: instance.description().to_string(),
            scopes: instance
                .scopes()
                .iter()
                .map(|s| ScopeView::from(s.as_ref()))
                .collect(),
        }
    }
}
