//! Format readers: turn a document into builder calls.
//!
//! The TOML layout:
//! - `[header]` carries identity (`id`, `version`, ...)
//! - exactly one other top-level table is the root node
//! - tables become path nodes, scalars value nodes, arrays lists
//! - tables with `__value`, `__list`, `__include` or `__resource` describe a
//!   single node of that kind

use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::{debug, instrument};

use crate::application::services::ConfigBuilder;
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    ConfigHeader, IncludeDescriptor, IncludeNode, NodeId, NodeKind, NodeSource,
    ResourceDescriptor, ResourceKind, ResourceNode, ValueNode, ValueType, Version,
    VersionRequirement,
};

const VALUE_KEY: &str = "__value";
const TYPE_KEY: &str = "__type";
const ENCRYPTED_KEY: &str = "__encrypted";
const SOURCE_KEY: &str = "__source";
const REQUIRED_KEY: &str = "__required";
const LIST_KEY: &str = "__list";
const INCLUDE_KEY: &str = "__include";
const RESOURCE_KEY: &str = "__resource";
const HEADER_TABLE: &str = "header";

/// Reads one document format into a [`ConfigBuilder`].
pub trait FormatReader: Send + Sync {
    /// Name includes use to select this reader.
    fn name(&self) -> &str;

    fn read(&self, content: &str, origin: &Path, builder: &mut ConfigBuilder)
        -> ApplicationResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TomlReader;

impl FormatReader for TomlReader {
    fn name(&self) -> &str {
        "toml"
    }

    #[instrument(level = "debug", skip(self, content, builder))]
    fn read(
        &self,
        content: &str,
        origin: &Path,
        builder: &mut ConfigBuilder,
    ) -> ApplicationResult<()> {
        let mut doc: Table = toml::from_str(content).map_err(|e| format_err(origin, e))?;

        let header = match doc.remove(HEADER_TABLE) {
            Some(Value::Table(t)) => parse_header(&t, origin)?,
            Some(_) => return Err(format_err(origin, "[header] must be a table")),
            None => return Err(format_err(origin, "missing [header] table")),
        };
        builder.begin(header)?;

        if doc.len() != 1 {
            return Err(format_err(
                origin,
                format!("expected exactly one root table, found {}", doc.len()),
            ));
        }
        let Some((root_name, root_value)) = doc.into_iter().next() else {
            return Err(format_err(origin, "missing root table"));
        };
        let Value::Table(root_table) = root_value else {
            return Err(format_err(origin, format!("root '{}' must be a table", root_name)));
        };

        let mut reader = TableReader { builder, origin };
        let root = reader.builder.construct(NodeKind::path(), Some(&root_name), None)?;
        reader.read_table(root, root_table)?;
        debug!("read: root '{}' from {}", root_name, origin.display());
        Ok(())
    }
}

fn format_err(origin: &Path, message: impl ToString) -> ApplicationError {
    ApplicationError::Format {
        format: "toml".to_string(),
        path: origin.to_path_buf(),
        message: message.to_string(),
    }
}

fn parse_header(table: &Table, origin: &Path) -> ApplicationResult<ConfigHeader> {
    let text = |key: &str| -> ApplicationResult<Option<String>> {
        match table.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Ok(Some(scalar_text(other).ok_or_else(|| {
                format_err(origin, format!("header.{} must be a scalar", key))
            })?)),
        }
    };

    let id = text("id")?.ok_or_else(|| format_err(origin, "header.id is required"))?;
    let version: Version = text("version")?
        .ok_or_else(|| format_err(origin, "header.version is required"))?
        .parse()?;

    let mut header = ConfigHeader::new(id, version);
    if let Some(name) = text("name")? {
        header.name = name;
    }
    header.application = text("application")?;
    header.group = text("group")?;
    header.description = text("description")?;
    header.vault = text("vault")?;
    header.key_hash = text("key_hash")?;
    Ok(header)
}

/// String form of a TOML scalar; `None` for arrays and tables.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

fn inferred_type(value: &Value) -> ValueType {
    match value {
        Value::Integer(_) => ValueType::Long,
        Value::Float(_) => ValueType::Double,
        Value::Boolean(_) => ValueType::Bool,
        _ => ValueType::String,
    }
}

struct TableReader<'a> {
    builder: &'a mut ConfigBuilder,
    origin: &'a Path,
}

impl<'a> TableReader<'a> {
    fn read_table(&mut self, node: NodeId, table: Table) -> ApplicationResult<()> {
        for (key, value) in table {
            if key == SOURCE_KEY {
                let source = self.source(&value)?;
                self.builder.set_node_source(node, source)?;
                continue;
            }
            if let Some(kind) = self.builder.syntax().reserved_for_token(&key) {
                if key != self.builder.syntax().reserved_name(kind) {
                    return Err(self.err(format!("'{}' is not a valid table key", key)));
                }
                let Value::Table(entries) = value else {
                    return Err(self.err(format!("'{}' must be a table", key)));
                };
                let slot = self.builder.reserved_slot(node, kind)?;
                for (entry_key, entry_value) in entries {
                    self.read_value(slot, &entry_key, entry_value)?;
                }
                continue;
            }
            self.read_entry(node, &key, value)?;
        }
        Ok(())
    }

    fn read_entry(&mut self, parent: NodeId, key: &str, value: Value) -> ApplicationResult<()> {
        match value {
            Value::Table(t) if t.contains_key(INCLUDE_KEY) => self.read_include(parent, key, t),
            Value::Table(t) if t.contains_key(RESOURCE_KEY) => self.read_resource(parent, key, t),
            Value::Table(t) if t.contains_key(LIST_KEY) => self.read_list(parent, key, t),
            Value::Table(t) if t.contains_key(VALUE_KEY) => {
                self.read_value(parent, key, Value::Table(t))
            }
            Value::Table(t) => {
                let id = self
                    .builder
                    .construct(NodeKind::path(), Some(key), Some(parent))?;
                self.read_table(id, t)
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_table) => {
                let list = self
                    .builder
                    .construct(NodeKind::list_elements(), Some(key), Some(parent))?;
                for item in items {
                    if let Value::Table(t) = item {
                        let element = self.builder.construct(NodeKind::path(), None, Some(list))?;
                        self.read_table(element, t)?;
                    }
                }
                Ok(())
            }
            Value::Array(items) => {
                let list = self
                    .builder
                    .construct(NodeKind::list_values(), Some(key), Some(parent))?;
                self.push_scalars(list, items, None)
            }
            scalar => self.read_value(parent, key, scalar),
        }
    }

    /// Plain scalar or a `__value` table, attached to a path or key/value node.
    fn read_value(&mut self, parent: NodeId, key: &str, value: Value) -> ApplicationResult<()> {
        match value {
            Value::Table(mut t) => {
                let raw = t
                    .remove(VALUE_KEY)
                    .ok_or_else(|| self.err(format!("'{}' has no {}", key, VALUE_KEY)))?;
                let text = scalar_text(&raw)
                    .ok_or_else(|| self.err(format!("{} of '{}' must be a scalar", VALUE_KEY, key)))?;
                let value_type = match t.remove(TYPE_KEY) {
                    Some(Value::String(s)) => s.parse::<ValueType>()?,
                    Some(_) => return Err(self.err(format!("{} must be a string", TYPE_KEY))),
                    None => inferred_type(&raw),
                };
                let id = self.builder.construct(
                    NodeKind::Value(ValueNode::typed(text, value_type)),
                    Some(key),
                    Some(parent),
                )?;
                for (attr, attr_value) in t {
                    match attr.as_str() {
                        ENCRYPTED_KEY => {
                            let flag = self.flag(&attr, &attr_value)?;
                            self.builder.set_encrypted(id, flag)?;
                        }
                        REQUIRED_KEY => {
                            let flag = self.flag(&attr, &attr_value)?;
                            self.builder.set_required(id, flag)?;
                        }
                        SOURCE_KEY => {
                            let source = self.source(&attr_value)?;
                            self.builder.set_node_source(id, source)?;
                        }
                        other => {
                            return Err(self.err(format!("unknown value attribute '{}'", other)))
                        }
                    }
                }
                Ok(())
            }
            Value::Array(_) => Err(self.err(format!("'{}' must be a scalar", key))),
            scalar => {
                let value_type = inferred_type(&scalar);
                let text = scalar_text(&scalar).unwrap_or_default();
                self.builder.construct(
                    NodeKind::Value(ValueNode::typed(text, value_type)),
                    Some(key),
                    Some(parent),
                )?;
                Ok(())
            }
        }
    }

    fn read_list(&mut self, parent: NodeId, key: &str, mut table: Table) -> ApplicationResult<()> {
        let Some(Value::Array(items)) = table.remove(LIST_KEY) else {
            return Err(self.err(format!("{} of '{}' must be an array", LIST_KEY, key)));
        };
        let value_type = match table.remove(TYPE_KEY) {
            Some(Value::String(s)) => Some(s.parse::<ValueType>()?),
            Some(_) => return Err(self.err(format!("{} must be a string", TYPE_KEY))),
            None => None,
        };
        let list = self
            .builder
            .construct(NodeKind::list_values(), Some(key), Some(parent))?;
        if let Some(source) = table.remove(SOURCE_KEY) {
            let source = self.source(&source)?;
            self.builder.set_node_source(list, source)?;
        }
        if let Some((attr, _)) = table.into_iter().next() {
            return Err(self.err(format!("unknown list attribute '{}'", attr)));
        }
        self.push_scalars(list, items, value_type)
    }

    fn push_scalars(
        &mut self,
        list: NodeId,
        items: Vec<Value>,
        value_type: Option<ValueType>,
    ) -> ApplicationResult<()> {
        for item in items {
            let text = scalar_text(&item)
                .ok_or_else(|| self.err("list values must be scalars".to_string()))?;
            let value_type = value_type.unwrap_or_else(|| inferred_type(&item));
            self.builder.construct(
                NodeKind::Value(ValueNode::typed(text, value_type)),
                None,
                Some(list),
            )?;
        }
        Ok(())
    }

    fn read_include(&mut self, parent: NodeId, key: &str, mut table: Table) -> ApplicationResult<()> {
        let Some(Value::Table(spec)) = table.remove(INCLUDE_KEY) else {
            return Err(self.err(format!("{} of '{}' must be a table", INCLUDE_KEY, key)));
        };
        let field = |name: &str| spec.get(name).and_then(Value::as_str).map(str::to_string);

        let config_name = field("name").ok_or_else(|| self.err(format!("include '{}' needs a name", key)))?;
        let path = field("path").ok_or_else(|| self.err(format!("include '{}' needs a path", key)))?;
        let version = match field("version") {
            Some(v) => v.parse::<VersionRequirement>()?,
            None => VersionRequirement::any(),
        };
        let descriptor = IncludeDescriptor {
            config_name,
            path: PathBuf::from(path),
            reader: field("reader").unwrap_or_else(|| "toml".to_string()),
            version,
        };
        let id = self.builder.construct(
            NodeKind::Include(IncludeNode::new(descriptor)),
            Some(key),
            Some(parent),
        )?;
        if let Some(source) = table.remove(SOURCE_KEY) {
            let source = self.source(&source)?;
            self.builder.set_node_source(id, source)?;
        }
        Ok(())
    }

    fn read_resource(&mut self, parent: NodeId, key: &str, mut table: Table) -> ApplicationResult<()> {
        let Some(Value::Table(spec)) = table.remove(RESOURCE_KEY) else {
            return Err(self.err(format!("{} of '{}' must be a table", RESOURCE_KEY, key)));
        };
        let location = spec
            .get("location")
            .and_then(Value::as_str)
            .ok_or_else(|| self.err(format!("resource '{}' needs a location", key)))?
            .to_string();
        let kind = match spec.get("kind").and_then(Value::as_str) {
            Some(k) => k.parse::<ResourceKind>()?,
            None => ResourceKind::File,
        };
        self.builder.construct(
            NodeKind::Resource(ResourceNode::new(ResourceDescriptor { location, kind })),
            Some(key),
            Some(parent),
        )?;
        Ok(())
    }

    fn source(&self, value: &Value) -> ApplicationResult<NodeSource> {
        match value {
            Value::String(s) => Ok(s.parse::<NodeSource>()?),
            _ => Err(self.err(format!("{} must be a string", SOURCE_KEY))),
        }
    }

    fn flag(&self, name: &str, value: &Value) -> ApplicationResult<bool> {
        value
            .as_bool()
            .ok_or_else(|| self.err(format!("{} must be a boolean", name)))
    }

    fn err(&self, message: String) -> ApplicationError {
        format_err(self.origin, message)
    }
}
