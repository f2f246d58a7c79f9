//! Resource - Cloud resources declared from a network plan and their created state

use std::collections::{BTreeMap, HashSet};

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "vpc", "nat_gateway")
    pub resource_type: String,
    /// Resource name, also the binding other resources refer to it by
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Map(BTreeMap<String, Value>),
    /// Reference to another resource's attribute (binding_name, attribute_name)
    ResourceRef(String, String),
}

impl Value {
    /// Reference to the cloud identifier of another resource
    pub fn id_of(binding: impl Into<String>) -> Self {
        Value::ResourceRef(binding.into(), "id".to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Collect the bindings this value refers to
    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Value::ResourceRef(binding, _) => refs.push(binding),
            Value::Map(map) => map.values().for_each(|v| v.collect_references(refs)),
            Value::String(_) | Value::Bool(_) => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Desired resource to create
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: BTreeMap<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Bindings of the resources this one depends on, in attribute order
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        for value in self.attributes.values() {
            value.collect_references(&mut refs);
        }
        let mut seen = HashSet::new();
        refs.retain(|r| seen.insert(*r));
        refs
    }
}

/// State of a resource after it was created
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Cloud identifier (e.g., vpc-xxx, subnet-xxx)
    pub identifier: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

impl State {
    pub fn new(id: ResourceId, attributes: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Look up an attribute, treating "id" as the cloud identifier
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if name == "id" {
            return self.identifier.clone().map(Value::String);
        }
        self.attributes.get(name).cloned()
    }
}
