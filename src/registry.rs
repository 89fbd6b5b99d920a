//! Bubble capability registry.
//!
//! A closed, pre-registered table of bubble descriptors resolved by registry name
//! or by source class name. It is built once and only read afterwards, so one
//! registry can back any number of parser sessions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ir::types::BubbleNodeType;

/// Read-only view of bubble capabilities consumed by the analyzer.
pub trait CapabilityRegistry {
    /// Look a bubble up by its registry name (`"slack"`, `"ai-agent"`).
    fn get(&self, name: &str) -> Option<&BubbleDescriptor>;

    /// Look a bubble up by the class identifier used in source (`SlackBubble`).
    fn bubble_for_class(&self, class_name: &str) -> Option<&BubbleDescriptor>;
}

/// A constructor parameter the bubble declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterShape {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// One named instance of a dependency (a bubble may use the same dependency twice).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyInstance {
    #[serde(default)]
    pub variable_name: Option<String>,
    /// Tools configured on this instance when the dependency is an agent.
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySpec {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<DependencyInstance>,
}

impl DependencySpec {
    /// Instances to expand; a spec with none declared expands once, unnamed.
    pub fn expanded_instances(&self) -> Vec<DependencyInstance> {
        if self.instances.is_empty() {
            vec![DependencyInstance::default()]
        } else {
            self.instances.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubbleDescriptor {
    pub name: String,
    pub class_name: String,
    #[serde(rename = "type", default)]
    pub node_type: BubbleNodeType,
    #[serde(default)]
    pub parameters: Vec<ParameterShape>,
    /// Flat dependency names.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Detailed dependency specs; take precedence over `dependencies` when present.
    #[serde(default)]
    pub dependency_details: Vec<DependencySpec>,
    /// Agent bubbles own a configurable `tools` list.
    #[serde(default)]
    pub is_agent: bool,
    #[serde(default)]
    pub credentials: Vec<String>,
}

impl BubbleDescriptor {
    pub fn new(name: &str, class_name: &str, node_type: BubbleNodeType) -> Self {
        BubbleDescriptor {
            name: name.into(),
            class_name: class_name.into(),
            node_type,
            parameters: Vec::new(),
            dependencies: Vec::new(),
            dependency_details: Vec::new(),
            is_agent: false,
            credentials: Vec::new(),
        }
    }

    pub fn agent(mut self) -> Self {
        self.is_agent = true;
        self
    }

    pub fn with_dependencies(mut self, names: &[&str]) -> Self {
        self.dependencies.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_dependency(mut self, spec: DependencySpec) -> Self {
        if !self.dependencies.contains(&spec.name) {
            self.dependencies.push(spec.name.clone());
        }
        self.dependency_details.push(spec);
        self
    }

    pub fn with_credentials(mut self, names: &[&str]) -> Self {
        self.credentials.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_parameter(mut self, name: &str, param_type: &str, required: bool) -> Self {
        self.parameters.push(ParameterShape {
            name: name.into(),
            param_type: Some(param_type.into()),
            required,
        });
        self
    }

    /// Dependency specs to expand, falling back to the flat name list.
    pub fn dependency_specs(&self) -> Vec<DependencySpec> {
        if !self.dependency_details.is_empty() {
            return self.dependency_details.clone();
        }
        self.dependencies
            .iter()
            .map(|name| DependencySpec {
                name: name.clone(),
                instances: Vec::new(),
            })
            .collect()
    }

    /// Every dependency name this bubble reaches in one step, including tools
    /// configured on agent dependency instances.
    pub fn direct_dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for spec in self.dependency_specs() {
            if !names.contains(&spec.name) {
                names.push(spec.name.clone());
            }
            for instance in &spec.instances {
                for tool in &instance.tools {
                    if !names.contains(tool) {
                        names.push(tool.clone());
                    }
                }
            }
        }
        names
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryManifest {
    pub bubbles: Vec<BubbleDescriptor>,
}

/// Name- and class-keyed descriptor table.
#[derive(Debug, Clone, Default)]
pub struct BubbleRegistry {
    descriptors: Vec<BubbleDescriptor>,
    by_name: HashMap<String, usize>,
    by_class: HashMap<String, usize>,
}

impl BubbleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = BubbleDescriptor>) -> Self {
        let mut registry = Self::new();
        for d in descriptors {
            registry.register(d);
        }
        registry
    }

    /// Load a registry from `{"bubbles": [...]}` JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let manifest: RegistryManifest = serde_json::from_str(json)?;
        Ok(Self::from_descriptors(manifest.bubbles))
    }

    /// Register a descriptor, replacing any previous entry with the same name.
    pub fn register(&mut self, descriptor: BubbleDescriptor) {
        if let Some(&idx) = self.by_name.get(&descriptor.name) {
            self.by_class.remove(&self.descriptors[idx].class_name);
            self.by_class.insert(descriptor.class_name.clone(), idx);
            self.descriptors[idx] = descriptor;
            return;
        }
        let idx = self.descriptors.len();
        self.by_name.insert(descriptor.name.clone(), idx);
        self.by_class.insert(descriptor.class_name.clone(), idx);
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[BubbleDescriptor] {
        &self.descriptors
    }
}

impl CapabilityRegistry for BubbleRegistry {
    fn get(&self, name: &str) -> Option<&BubbleDescriptor> {
        self.by_name.get(name).map(|&i| &self.descriptors[i])
    }

    fn bubble_for_class(&self, class_name: &str) -> Option<&BubbleDescriptor> {
        self.by_class.get(class_name).map(|&i| &self.descriptors[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_class() {
        let registry = BubbleRegistry::from_descriptors([
            BubbleDescriptor::new("slack", "SlackBubble", BubbleNodeType::Service),
            BubbleDescriptor::new("ai-agent", "AIAgentBubble", BubbleNodeType::Service).agent(),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("slack").unwrap().class_name, "SlackBubble");
        assert!(registry.bubble_for_class("AIAgentBubble").unwrap().is_agent);
        assert!(registry.bubble_for_class("Unknown").is_none());
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = BubbleRegistry::new();
        registry.register(BubbleDescriptor::new("http", "HttpBubble", BubbleNodeType::Service));
        registry.register(BubbleDescriptor::new("http", "HttpRequestBubble", BubbleNodeType::Service));
        assert_eq!(registry.len(), 1);
        assert!(registry.bubble_for_class("HttpBubble").is_none());
        assert!(registry.bubble_for_class("HttpRequestBubble").is_some());
    }

    #[test]
    fn from_json_manifest() {
        let json = r#"{"bubbles":[
            {"name":"web-search-tool","className":"WebSearchTool","type":"tool","dependencies":["firecrawl"]},
            {"name":"firecrawl","className":"FirecrawlBubble","type":"service","credentials":["FIRECRAWL_API_KEY"]}
        ]}"#;
        let registry = BubbleRegistry::from_json(json).unwrap();
        let tool = registry.get("web-search-tool").unwrap();
        assert_eq!(tool.node_type, BubbleNodeType::Tool);
        assert_eq!(tool.direct_dependency_names(), vec!["firecrawl".to_string()]);
        assert_eq!(registry.get("firecrawl").unwrap().credentials, vec!["FIRECRAWL_API_KEY"]);
    }

    #[test]
    fn detailed_specs_take_precedence() {
        let d = BubbleDescriptor::new("research-agent-tool", "ResearchAgentTool", BubbleNodeType::Tool)
            .with_dependency(DependencySpec {
                name: "ai-agent".into(),
                instances: vec![DependencyInstance {
                    variable_name: Some("researcher".into()),
                    tools: vec!["web-search-tool".into()],
                }],
            });
        assert_eq!(d.dependency_specs().len(), 1);
        assert_eq!(
            d.direct_dependency_names(),
            vec!["ai-agent".to_string(), "web-search-tool".to_string()]
        );
    }
}
