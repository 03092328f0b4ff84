//! Identity document model.
//!
//! The provisioning container carries an XML property list. It is parsed
//! into [`DocumentValue`], a tagged variant type, and wrapped in
//! [`ContainerDocument`] which exposes the handful of keys the checks read.

mod plist;

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{DocumentError, ValueError};

pub use plist::{parse_plist, MAX_NESTING_DEPTH};

/// Key holding the signing organization identifier(s).
pub const TEAM_IDENTIFIER_KEY: &str = "TeamIdentifier";
/// Key holding the capability (entitlement) map.
pub const ENTITLEMENTS_KEY: &str = "Entitlements";
/// Key holding the application-identifier prefixes.
pub const APP_ID_PREFIX_KEY: &str = "ApplicationIdentifierPrefix";
/// Bundle metadata key carrying the bundle identifier.
pub const BUNDLE_IDENTIFIER_KEY: &str = "CFBundleIdentifier";

/// A dynamically typed property-list value.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentValue {
    /// `<string>`
    String(String),
    /// `<integer>`
    Integer(i64),
    /// `<real>`
    Real(f64),
    /// `<true/>` / `<false/>`
    Bool(bool),
    /// `<data>`, base64-decoded.
    Data(Vec<u8>),
    /// `<date>`, kept as its ISO-8601 text.
    Date(String),
    /// `<array>`
    Array(Vec<DocumentValue>),
    /// `<dict>`
    Dict(BTreeMap<String, DocumentValue>),
}

impl DocumentValue {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Bool(_) => "bool",
            Self::Data(_) => "data",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    /// Borrow as a string.
    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    /// Read as a boolean.
    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    /// Read as an integer.
    pub fn as_integer(&self) -> Result<i64, ValueError> {
        match self {
            Self::Integer(i) => Ok(*i),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Read as a number; integers widen to `f64`.
    pub fn as_real(&self) -> Result<f64, ValueError> {
        match self {
            Self::Real(r) => Ok(*r),
            Self::Integer(i) => Ok(*i as f64),
            other => Err(other.mismatch("real")),
        }
    }

    /// Borrow the decoded bytes of a `<data>` value.
    pub fn as_data(&self) -> Result<&[u8], ValueError> {
        match self {
            Self::Data(d) => Ok(d),
            other => Err(other.mismatch("data")),
        }
    }

    /// Borrow the text of a `<date>` value.
    pub fn as_date(&self) -> Result<&str, ValueError> {
        match self {
            Self::Date(d) => Ok(d),
            other => Err(other.mismatch("date")),
        }
    }

    /// Borrow as an array.
    pub fn as_array(&self) -> Result<&[DocumentValue], ValueError> {
        match self {
            Self::Array(items) => Ok(items),
            other => Err(other.mismatch("array")),
        }
    }

    /// Borrow as a dictionary.
    pub fn as_dict(&self) -> Result<&BTreeMap<String, DocumentValue>, ValueError> {
        match self {
            Self::Dict(map) => Ok(map),
            other => Err(other.mismatch("dict")),
        }
    }

    /// Look up a key when this value is a dictionary.
    pub fn get(&self, key: &str) -> Option<&DocumentValue> {
        match self {
            Self::Dict(map) => map.get(key),
            _ => None,
        }
    }

    /// Read a string or an array of strings as a list.
    ///
    /// Used for fields that the signing toolchain emits either way.
    pub fn as_string_list(&self) -> Result<Vec<&str>, ValueError> {
        match self {
            Self::String(s) => Ok(vec![s.as_str()]),
            Self::Array(items) => items.iter().map(DocumentValue::as_str).collect(),
            other => Err(other.mismatch("string or array")),
        }
    }

    /// Render as JSON. `<data>` becomes base64 text, `<date>` its text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::String(s) | Self::Date(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Real(r) => serde_json::Number::from_f64(*r)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
            Self::Data(d) => Value::String(STANDARD.encode(d)),
            Self::Array(items) => Value::Array(items.iter().map(DocumentValue::to_json).collect()),
            Self::Dict(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// The parsed identity document.
///
/// Read-only after construction. The root is always a dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDocument {
    root: BTreeMap<String, DocumentValue>,
}

impl ContainerDocument {
    /// Wrap a parsed value; the root must be a dictionary.
    pub fn from_value(value: DocumentValue) -> Result<Self, DocumentError> {
        match value {
            DocumentValue::Dict(root) => Ok(Self { root }),
            other => Err(DocumentError::RootNotDict {
                found: other.kind(),
            }),
        }
    }

    /// Parse property-list text into a document.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        Self::from_value(parse_plist(text)?)
    }

    /// Top-level entries.
    pub fn entries(&self) -> &BTreeMap<String, DocumentValue> {
        &self.root
    }

    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&DocumentValue> {
        self.root.get(key)
    }

    /// Signing organization identifiers, if the field is present.
    pub fn team_identifiers(&self) -> Result<Option<Vec<&str>>, ValueError> {
        self.get(TEAM_IDENTIFIER_KEY)
            .map(DocumentValue::as_string_list)
            .transpose()
    }

    /// Application identifier prefixes, if present.
    pub fn application_identifier_prefix(&self) -> Result<Option<Vec<&str>>, ValueError> {
        self.get(APP_ID_PREFIX_KEY)
            .map(DocumentValue::as_string_list)
            .transpose()
    }

    /// Capability map, if present.
    pub fn entitlements(&self) -> Result<Option<&BTreeMap<String, DocumentValue>>, ValueError> {
        self.get(ENTITLEMENTS_KEY)
            .map(DocumentValue::as_dict)
            .transpose()
    }

    /// Profile name.
    pub fn name(&self) -> Option<&str> {
        self.get("Name").and_then(|v| v.as_str().ok())
    }

    /// App ID name as registered by the signing organization.
    pub fn app_id_name(&self) -> Option<&str> {
        self.get("AppIDName").and_then(|v| v.as_str().ok())
    }

    /// Creation date text.
    pub fn creation_date(&self) -> Option<&str> {
        self.get("CreationDate").and_then(|v| v.as_date().ok())
    }

    /// Expiration date text.
    pub fn expiration_date(&self) -> Option<&str> {
        self.get("ExpirationDate").and_then(|v| v.as_date().ok())
    }

    /// Render the whole document as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.root
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
