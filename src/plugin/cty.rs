//! Just enough of the cty type system to build provider configuration and to
//! read back imported state.
//!
//! Values travel as msgpack. Unknown values use extension type 0.

use std::collections::BTreeMap;

use rmpv::Value as MsgValue;
use serde_json::Value as JsonValue;

use super::PluginError;

/// Extension type code cty uses for unknown values.
const UNKNOWN_EXT: i8 = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum CtyType {
    String,
    Number,
    Bool,
    Dynamic,
    List(Box<CtyType>),
    Set(Box<CtyType>),
    Map(Box<CtyType>),
    Object(BTreeMap<String, CtyType>),
    Tuple(Vec<CtyType>),
}

impl CtyType {
    /// Parses the JSON type encoding found in schema attributes, e.g.
    /// `"string"` or `["list","string"]`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, PluginError> {
        let value: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| PluginError::Encoding(format!("invalid type JSON: {}", e)))?;
        Self::from_json_value(&value)
    }

    fn from_json_value(value: &JsonValue) -> Result<Self, PluginError> {
        let invalid = || PluginError::Encoding(format!("unsupported type {}", value));

        match value {
            JsonValue::String(name) => match name.as_str() {
                "string" => Ok(CtyType::String),
                "number" => Ok(CtyType::Number),
                "bool" => Ok(CtyType::Bool),
                "dynamic" => Ok(CtyType::Dynamic),
                _ => Err(invalid()),
            },
            JsonValue::Array(parts) => {
                let kind = parts.first().and_then(JsonValue::as_str).ok_or_else(invalid)?;
                let inner = parts.get(1).ok_or_else(invalid)?;
                match kind {
                    "list" => Ok(CtyType::List(Box::new(Self::from_json_value(inner)?))),
                    "set" => Ok(CtyType::Set(Box::new(Self::from_json_value(inner)?))),
                    "map" => Ok(CtyType::Map(Box::new(Self::from_json_value(inner)?))),
                    "object" => {
                        let attrs = inner.as_object().ok_or_else(invalid)?;
                        let mut out = BTreeMap::new();
                        for (name, ty) in attrs {
                            out.insert(name.clone(), Self::from_json_value(ty)?);
                        }
                        Ok(CtyType::Object(out))
                    }
                    "tuple" => {
                        let elems = inner.as_array().ok_or_else(invalid)?;
                        elems
                            .iter()
                            .map(Self::from_json_value)
                            .collect::<Result<Vec<_>, _>>()
                            .map(CtyType::Tuple)
                    }
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            CtyType::String | CtyType::Number | CtyType::Bool | CtyType::Dynamic
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CtyValue {
    Unknown,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Object(BTreeMap<String, CtyValue>),
}

impl CtyValue {
    pub fn string(value: impl Into<String>) -> Self {
        CtyValue::String(value.into())
    }

    pub fn object<K, I>(attrs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, CtyValue)>,
    {
        CtyValue::Object(attrs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Converts a command-line string to a value of a primitive type.
    pub fn from_str_for(ty: &CtyType, raw: &str) -> Result<Self, String> {
        match ty {
            CtyType::String | CtyType::Dynamic => Ok(CtyValue::String(raw.to_string())),
            CtyType::Number => raw
                .parse::<serde_json::Number>()
                .map(CtyValue::Number)
                .map_err(|_| format!("{:?} is not a number", raw)),
            CtyType::Bool => match raw {
                "true" => Ok(CtyValue::Bool(true)),
                "false" => Ok(CtyValue::Bool(false)),
                _ => Err(format!("{:?} is not a bool", raw)),
            },
            _ => Err("only primitive attributes can be set from the command line".to_string()),
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, PluginError> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &self.to_msg_value())
            .map_err(|e| PluginError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    fn to_msg_value(&self) -> MsgValue {
        match self {
            CtyValue::Unknown => MsgValue::Ext(UNKNOWN_EXT, vec![0]),
            CtyValue::Bool(b) => MsgValue::Boolean(*b),
            CtyValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MsgValue::from(i)
                } else if let Some(u) = n.as_u64() {
                    MsgValue::from(u)
                } else {
                    MsgValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            CtyValue::String(s) => MsgValue::from(s.as_str()),
            CtyValue::Object(attrs) => MsgValue::Map(
                attrs
                    .iter()
                    .map(|(k, v)| (MsgValue::from(k.as_str()), v.to_msg_value()))
                    .collect(),
            ),
        }
    }
}

/// Decodes a msgpack-encoded value into JSON for display.
pub fn msgpack_to_json(bytes: &[u8]) -> Result<JsonValue, PluginError> {
    let mut reader = bytes;
    let value = rmpv::decode::read_value(&mut reader)
        .map_err(|e| PluginError::Encoding(e.to_string()))?;
    Ok(msg_to_json(value))
}

fn msg_to_json(value: MsgValue) -> JsonValue {
    match value {
        MsgValue::Nil => JsonValue::Null,
        MsgValue::Boolean(b) => JsonValue::Bool(b),
        MsgValue::Integer(i) => {
            if let Some(v) = i.as_i64() {
                JsonValue::from(v)
            } else if let Some(v) = i.as_u64() {
                JsonValue::from(v)
            } else {
                JsonValue::Null
            }
        }
        MsgValue::F32(f) => float_to_json(f64::from(f)),
        MsgValue::F64(f) => float_to_json(f),
        MsgValue::String(s) => match s.into_str() {
            Some(s) => JsonValue::String(s),
            None => JsonValue::String("<invalid utf-8>".to_string()),
        },
        MsgValue::Binary(bytes) => JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()),
        MsgValue::Array(items) => JsonValue::Array(items.into_iter().map(msg_to_json).collect()),
        MsgValue::Map(entries) => JsonValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        MsgValue::String(s) => s.into_str().unwrap_or_default(),
                        other => other.to_string(),
                    };
                    (key, msg_to_json(v))
                })
                .collect(),
        ),
        MsgValue::Ext(UNKNOWN_EXT, _) => JsonValue::String("<unknown>".to_string()),
        MsgValue::Ext(code, _) => JsonValue::String(format!("<ext {}>", code)),
    }
}

fn float_to_json(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}
