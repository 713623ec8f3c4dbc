//! Raw resource definitions as declared in code or read from JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract data type of a field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int,
    Long,
    String,
    Date,
    Time,
    #[serde(rename = "datetime")]
    DateTime,
    /// Foreign key to the named resource.
    Reference(String),
    /// Collection of the named resource; never a column.
    Many(String),
}

impl DataType {
    pub fn is_reference(&self) -> bool {
        matches!(self, DataType::Reference(_))
    }

    pub fn is_many(&self) -> bool {
        matches!(self, DataType::Many(_))
    }

    /// Target resource of a reference or collection.
    pub fn target(&self) -> Option<&str> {
        match self {
            DataType::Reference(t) | DataType::Many(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => f.write_str("int"),
            DataType::Long => f.write_str("long"),
            DataType::String => f.write_str("string"),
            DataType::Date => f.write_str("date"),
            DataType::Time => f.write_str("time"),
            DataType::DateTime => f.write_str("datetime"),
            DataType::Reference(t) => write!(f, "reference<{}>", t),
            DataType::Many(t) => write!(f, "many<{}>", t),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyConfig {
    Single(String),
    Composite(Vec<String>),
}

impl KeyConfig {
    pub fn names(&self) -> Vec<&str> {
        match self {
            KeyConfig::Single(s) => vec![s.as_str()],
            KeyConfig::Composite(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for KeyConfig {
    fn from(s: &str) -> Self {
        KeyConfig::Single(s.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for KeyConfig {
    fn from(names: [&str; N]) -> Self {
        KeyConfig::Composite(names.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: DataType,
    /// Column name; the field name when omitted.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub transient: bool,
    /// Written when an insert does not supply the field.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, type_: DataType) -> Self {
        FieldConfig {
            name: name.into(),
            type_,
            column: None,
            transient: false,
            default: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    /// Table name; the resource name when omitted.
    #[serde(default)]
    pub table: Option<String>,
    pub key: KeyConfig,
    pub fields: Vec<FieldConfig>,
}

impl ResourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ResourceConfig {
            name: name.into(),
            table: None,
            key: KeyConfig::Composite(Vec::new()),
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn key(mut self, key: impl Into<KeyConfig>) -> Self {
        self.key = key.into();
        self
    }

    pub fn field(mut self, name: impl Into<String>, type_: DataType) -> Self {
        self.fields.push(FieldConfig::new(name, type_));
        self
    }

    pub fn field_with(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }
}

/// All resource definitions of one registry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, resource: ResourceConfig) -> Self {
        self.resources.push(resource);
        self
    }
}
