//! Node variants of the configuration tree.
//!
//! Every node is a [`ConfigNode`]: the fields shared by all variants plus a
//! [`NodeKind`] payload. Links between nodes are [`NodeId`] handles into the
//! owning [`ConfigTree`](crate::domain::ConfigTree) arena.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use generational_arena::Index;
use indexmap::IndexMap;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::state::NodeState;
use crate::domain::version::{Version, VersionRequirement};

/// Handle of a node inside its configuration's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) Index);

/// Origin of a node's value; only `DataBase` nodes take part in overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSource {
    #[default]
    Local,
    File,
    DataBase,
}

impl FromStr for NodeSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(NodeSource::Local),
            "file" => Ok(NodeSource::File),
            "database" | "db" => Ok(NodeSource::DataBase),
            other => Err(DomainError::TypeCoercion {
                value: other.to_string(),
                target: "node source".to_string(),
            }),
        }
    }
}

/// Declared type of a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    String,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Class,
    Enum,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Char => "char",
            ValueType::Short => "short",
            ValueType::Int => "int",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Class => "class",
            ValueType::Enum => "enum",
        }
    }

    /// Checks that `value` can be read as this type.
    pub fn check(&self, value: &str) -> DomainResult<()> {
        let ok = match self {
            ValueType::String => true,
            ValueType::Bool => parse_bool(value).is_some(),
            ValueType::Char => value.chars().count() == 1,
            ValueType::Short => value.trim().parse::<i16>().is_ok(),
            ValueType::Int => value.trim().parse::<i32>().is_ok(),
            ValueType::Long => value.trim().parse::<i64>().is_ok(),
            ValueType::Float => value.trim().parse::<f32>().is_ok(),
            ValueType::Double => value.trim().parse::<f64>().is_ok(),
            ValueType::Class => {
                !value.is_empty()
                    && value
                        .chars()
                        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | ':'))
            }
            ValueType::Enum => !value.trim().is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::TypeCoercion {
                value: value.to_string(),
                target: self.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(ValueType::String),
            "bool" | "boolean" => Ok(ValueType::Bool),
            "char" => Ok(ValueType::Char),
            "short" => Ok(ValueType::Short),
            "int" | "integer" => Ok(ValueType::Int),
            "long" => Ok(ValueType::Long),
            "float" => Ok(ValueType::Float),
            "double" => Ok(ValueType::Double),
            "class" => Ok(ValueType::Class),
            "enum" => Ok(ValueType::Enum),
            other => Err(DomainError::TypeCoercion {
                value: other.to_string(),
                target: "value type".to_string(),
            }),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// The three reserved key/value sub-nodes of a path node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKind {
    Parameters,
    Attributes,
    Properties,
}

impl ReservedKind {
    pub const ALL: [ReservedKind; 3] = [
        ReservedKind::Parameters,
        ReservedKind::Attributes,
        ReservedKind::Properties,
    ];
}

impl fmt::Display for ReservedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservedKind::Parameters => "parameters",
            ReservedKind::Attributes => "attributes",
            ReservedKind::Properties => "properties",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathNode {
    pub(crate) children: IndexMap<String, NodeId>,
    pub(crate) parameters: Option<NodeId>,
    pub(crate) attributes: Option<NodeId>,
    pub(crate) properties: Option<NodeId>,
}

impl PathNode {
    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn reserved(&self, kind: ReservedKind) -> Option<NodeId> {
        match kind {
            ReservedKind::Parameters => self.parameters,
            ReservedKind::Attributes => self.attributes,
            ReservedKind::Properties => self.properties,
        }
    }

    pub(crate) fn reserved_mut(&mut self, kind: ReservedKind) -> &mut Option<NodeId> {
        match kind {
            ReservedKind::Parameters => &mut self.parameters,
            ReservedKind::Attributes => &mut self.attributes,
            ReservedKind::Properties => &mut self.properties,
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Single scalar value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueNode {
    pub(crate) value: String,
    pub(crate) encrypted: bool,
    pub(crate) value_type: ValueType,
    pub(crate) required: bool,
}

impl ValueNode {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn typed(value: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            value: value.into(),
            value_type,
            ..Self::default()
        }
    }

    /// Raw stored value (ciphertext when `encrypted`).
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn parse<T: FromStr>(&self) -> DomainResult<T> {
        self.value
            .trim()
            .parse::<T>()
            .map_err(|_| DomainError::TypeCoercion {
                value: self.value.clone(),
                target: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn as_bool(&self) -> DomainResult<bool> {
        parse_bool(&self.value).ok_or_else(|| DomainError::TypeCoercion {
            value: self.value.clone(),
            target: ValueType::Bool.to_string(),
        })
    }

    pub fn as_i64(&self) -> DomainResult<i64> {
        self.parse()
    }

    pub fn as_f64(&self) -> DomainResult<f64> {
        self.parse()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListValueNode {
    pub(crate) values: Vec<NodeId>,
}

impl ListValueNode {
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListElementNode {
    pub(crate) elements: Vec<NodeId>,
}

impl ListElementNode {
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.elements.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Ordered key → value node mapping behind Parameters, Attributes and Properties.
#[derive(Debug, Clone)]
pub struct KeyValueNode {
    pub(crate) kind: ReservedKind,
    pub(crate) entries: IndexMap<String, NodeId>,
}

impl KeyValueNode {
    pub fn new(kind: ReservedKind) -> Self {
        Self {
            kind,
            entries: IndexMap::new(),
        }
    }

    pub fn reserved_kind(&self) -> ReservedKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.entries.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where an included configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDescriptor {
    pub config_name: String,
    pub path: PathBuf,
    pub reader: String,
    pub version: VersionRequirement,
}

#[derive(Debug, Clone)]
pub struct IncludeNode {
    pub(crate) descriptor: IncludeDescriptor,
    pub(crate) root: Option<NodeId>,
    pub(crate) resolved_version: Option<Version>,
    pub(crate) resolved_reader: Option<String>,
}

impl IncludeNode {
    pub fn new(descriptor: IncludeDescriptor) -> Self {
        Self {
            descriptor,
            root: None,
            resolved_version: None,
            resolved_reader: None,
        }
    }

    pub fn descriptor(&self) -> &IncludeDescriptor {
        &self.descriptor
    }

    /// Root of the embedded configuration once the include is resolved.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn resolved_version(&self) -> Option<Version> {
        self.resolved_version
    }

    pub fn resolved_reader(&self) -> Option<&str> {
        self.resolved_reader.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Directory,
}

impl FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(ResourceKind::File),
            "dir" | "directory" => Ok(ResourceKind::Directory),
            other => Err(DomainError::TypeCoercion {
                value: other.to_string(),
                target: "resource kind".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub location: String,
    pub kind: ResourceKind,
}

/// Local file or directory referenced by the configuration.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub(crate) descriptor: ResourceDescriptor,
    pub(crate) handle: Option<PathBuf>,
}

impl ResourceNode {
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            handle: None,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn handle(&self) -> Option<&PathBuf> {
        self.handle.as_ref()
    }
}

/// Variant payload of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Path(PathNode),
    Value(ValueNode),
    ListValue(ListValueNode),
    ListElement(ListElementNode),
    KeyValue(KeyValueNode),
    Include(IncludeNode),
    Resource(ResourceNode),
}

impl NodeKind {
    pub fn path() -> Self {
        NodeKind::Path(PathNode::default())
    }

    pub fn value(value: impl Into<String>) -> Self {
        NodeKind::Value(ValueNode::new(value))
    }

    pub fn list_values() -> Self {
        NodeKind::ListValue(ListValueNode::default())
    }

    pub fn list_elements() -> Self {
        NodeKind::ListElement(ListElementNode::default())
    }

    pub fn key_values(kind: ReservedKind) -> Self {
        NodeKind::KeyValue(KeyValueNode::new(kind))
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Path(_) => "path",
            NodeKind::Value(_) => "value",
            NodeKind::ListValue(_) => "list-value",
            NodeKind::ListElement(_) => "list-element",
            NodeKind::KeyValue(kv) => match kv.kind {
                ReservedKind::Parameters => "parameters",
                ReservedKind::Attributes => "attributes",
                ReservedKind::Properties => "properties",
            },
            NodeKind::Include(_) => "include",
            NodeKind::Resource(_) => "resource",
        }
    }

    /// Free-text names are only allowed on scalar values.
    pub fn allows_free_name(&self) -> bool {
        matches!(self, NodeKind::Value(_))
    }

    /// Rewrites every child handle, used when nodes move between arenas.
    pub(crate) fn remap_ids(&mut self, map: impl Fn(NodeId) -> Option<NodeId>) {
        let remap = |id: &mut NodeId| {
            if let Some(new) = map(*id) {
                *id = new;
            }
        };
        match self {
            NodeKind::Path(n) => {
                n.children.values_mut().for_each(remap);
                n.parameters.iter_mut().for_each(remap);
                n.attributes.iter_mut().for_each(remap);
                n.properties.iter_mut().for_each(remap);
            }
            NodeKind::KeyValue(n) => n.entries.values_mut().for_each(remap),
            NodeKind::ListValue(n) => n.values.iter_mut().for_each(remap),
            NodeKind::ListElement(n) => n.elements.iter_mut().for_each(remap),
            NodeKind::Include(n) => n.root.iter_mut().for_each(remap),
            NodeKind::Value(_) | NodeKind::Resource(_) => {}
        }
    }
}

/// Child enumeration capability, implemented per variant.
pub trait Children {
    /// Every node owned directly below this one, reserved slots included.
    fn owned(&self) -> Vec<NodeId>;

    /// Children visited by wildcard fan-out (reserved slots excluded).
    fn regular(&self) -> Vec<NodeId> {
        self.owned()
    }
}

impl Children for PathNode {
    fn owned(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.children.values().copied().collect();
        ids.extend(
            [self.parameters, self.attributes, self.properties]
                .into_iter()
                .flatten(),
        );
        ids
    }

    fn regular(&self) -> Vec<NodeId> {
        self.children.values().copied().collect()
    }
}

impl Children for KeyValueNode {
    fn owned(&self) -> Vec<NodeId> {
        self.entries.values().copied().collect()
    }
}

impl Children for ListValueNode {
    fn owned(&self) -> Vec<NodeId> {
        self.values.clone()
    }
}

impl Children for ListElementNode {
    fn owned(&self) -> Vec<NodeId> {
        self.elements.clone()
    }
}

impl Children for IncludeNode {
    fn owned(&self) -> Vec<NodeId> {
        self.root.into_iter().collect()
    }

    // Fan-out goes through the embedded root, never the include itself.
    fn regular(&self) -> Vec<NodeId> {
        Vec::new()
    }
}

impl Children for NodeKind {
    fn owned(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Path(n) => n.owned(),
            NodeKind::KeyValue(n) => n.owned(),
            NodeKind::ListValue(n) => n.owned(),
            NodeKind::ListElement(n) => n.owned(),
            NodeKind::Include(n) => n.owned(),
            NodeKind::Value(_) | NodeKind::Resource(_) => Vec::new(),
        }
    }

    fn regular(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Path(n) => n.regular(),
            NodeKind::KeyValue(n) => n.regular(),
            NodeKind::ListValue(n) => n.regular(),
            NodeKind::ListElement(n) => n.regular(),
            NodeKind::Include(n) => n.regular(),
            NodeKind::Value(_) | NodeKind::Resource(_) => Vec::new(),
        }
    }
}

/// A node of the configuration tree.
#[derive(Debug, Clone)]
pub struct ConfigNode {
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) configuration: String,
    pub(crate) source: NodeSource,
    pub(crate) state: NodeState,
    pub(crate) kind: NodeKind,
}

impl ConfigNode {
    pub fn new(kind: NodeKind, configuration: impl Into<String>) -> Self {
        Self {
            name: None,
            parent: None,
            configuration: configuration.into(),
            source: NodeSource::default(),
            state: NodeState::new(),
            kind,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Id of the configuration that owns this node.
    pub fn configuration(&self) -> &str {
        &self.configuration
    }

    pub fn source(&self) -> NodeSource {
        self.source
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_path(&self) -> Option<&PathNode> {
        match &self.kind {
            NodeKind::Path(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueNode> {
        match &self.kind {
            NodeKind::Value(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_list_values(&self) -> Option<&ListValueNode> {
        match &self.kind {
            NodeKind::ListValue(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_list_elements(&self) -> Option<&ListElementNode> {
        match &self.kind {
            NodeKind::ListElement(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_key_values(&self) -> Option<&KeyValueNode> {
        match &self.kind {
            NodeKind::KeyValue(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_include(&self) -> Option<&IncludeNode> {
        match &self.kind {
            NodeKind::Include(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceNode> {
        match &self.kind {
            NodeKind::Resource(n) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_check() {
        assert!(ValueType::Int.check("42").is_ok());
        assert!(ValueType::Int.check("4.2").is_err());
        assert!(ValueType::Short.check("70000").is_err());
        assert!(ValueType::Bool.check("TRUE").is_ok());
        assert!(ValueType::Char.check("ab").is_err());
        assert!(ValueType::Double.check("1e3").is_ok());
        assert!(ValueType::Class.check("com.example.Foo").is_ok());
        assert!(ValueType::String.check("").is_ok());
    }

    #[test]
    fn test_value_node_accessors() {
        let v = ValueNode::typed("17", ValueType::Int);
        assert_eq!(v.as_i64().unwrap(), 17);
        assert!(v.as_bool().is_err());
        assert_eq!(ValueNode::new("false").as_bool().unwrap(), false);
    }

    #[test]
    fn test_value_type_from_str() {
        assert_eq!("Integer".parse::<ValueType>().unwrap(), ValueType::Int);
        assert!("uuid".parse::<ValueType>().is_err());
    }
}
