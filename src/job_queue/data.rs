//! Typed key/value payload used to persist and rebuild jobs.
//!
//! A [`JobData`] is immutable once built. Accessors fail with
//! [`JobDataError`] when a key is missing or holds a value of a different type;
//! only the `*_or` accessors fall back to a default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobDataError {
    #[error("missing key '{0}'")]
    MissingKey(String),

    #[error("key '{key}' holds a {found} value, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("malformed job data: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A single value stored in [`JobData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobValue {
    String(String),
    Int(i32),
    Long(i64),
    Boolean(bool),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    StringArray(Vec<String>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    BooleanArray(Vec<bool>),
    BytesArray(#[serde(with = "base64_bytes_array")] Vec<Vec<u8>>),
}

impl JobValue {
    fn type_name(&self) -> &'static str {
        match self {
            JobValue::String(_) => "string",
            JobValue::Int(_) => "int",
            JobValue::Long(_) => "long",
            JobValue::Boolean(_) => "boolean",
            JobValue::Bytes(_) => "bytes",
            JobValue::StringArray(_) => "string_array",
            JobValue::IntArray(_) => "int_array",
            JobValue::LongArray(_) => "long_array",
            JobValue::BooleanArray(_) => "boolean_array",
            JobValue::BytesArray(_) => "bytes_array",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobData {
    values: BTreeMap<String, JobValue>,
}

macro_rules! typed_accessors {
    ($($variant:ident => $getter:ident, $getter_or:ident, $optional:ident, $ty:ty, $name:literal;)*) => {
        $(
            pub fn $getter(&self, key: &str) -> Result<&$ty, JobDataError> {
                match self.values.get(key) {
                    Some(JobValue::$variant(value)) => Ok(value),
                    Some(other) => Err(JobDataError::TypeMismatch {
                        key: key.to_string(),
                        expected: $name,
                        found: other.type_name(),
                    }),
                    None => Err(JobDataError::MissingKey(key.to_string())),
                }
            }

            pub fn $getter_or<'a>(&'a self, key: &str, default: &'a $ty) -> &'a $ty {
                match self.values.get(key) {
                    Some(JobValue::$variant(value)) => value,
                    _ => default,
                }
            }

            /// Like the plain getter, but a missing key yields `None`.
            pub fn $optional(&self, key: &str) -> Result<Option<&$ty>, JobDataError> {
                if self.values.contains_key(key) {
                    self.$getter(key).map(Some)
                } else {
                    Ok(None)
                }
            }
        )*
    };
}

impl JobData {
    pub fn builder() -> JobDataBuilder {
        JobDataBuilder::default()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    typed_accessors! {
        String => string, string_or, optional_string, String, "string";
        Int => int, int_or, optional_int, i32, "int";
        Long => long, long_or, optional_long, i64, "long";
        Boolean => boolean, boolean_or, optional_boolean, bool, "boolean";
        Bytes => bytes, bytes_or, optional_bytes, Vec<u8>, "bytes";
        StringArray => string_array, string_array_or, optional_string_array, Vec<String>, "string_array";
        IntArray => int_array, int_array_or, optional_int_array, Vec<i32>, "int_array";
        LongArray => long_array, long_array_or, optional_long_array, Vec<i64>, "long_array";
        BooleanArray => boolean_array, boolean_array_or, optional_boolean_array, Vec<bool>, "boolean_array";
        BytesArray => bytes_array, bytes_array_or, optional_bytes_array, Vec<Vec<u8>>, "bytes_array";
    }

    pub fn to_json(&self) -> Result<String, JobDataError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, JobDataError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Default)]
pub struct JobDataBuilder {
    values: BTreeMap<String, JobValue>,
}

impl JobDataBuilder {
    pub fn put(mut self, key: impl Into<String>, value: JobValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(key, JobValue::String(value.into()))
    }

    pub fn int(self, key: impl Into<String>, value: i32) -> Self {
        self.put(key, JobValue::Int(value))
    }

    pub fn long(self, key: impl Into<String>, value: i64) -> Self {
        self.put(key, JobValue::Long(value))
    }

    pub fn boolean(self, key: impl Into<String>, value: bool) -> Self {
        self.put(key, JobValue::Boolean(value))
    }

    pub fn bytes(self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.put(key, JobValue::Bytes(value.into()))
    }

    pub fn string_array(self, key: impl Into<String>, value: Vec<String>) -> Self {
        self.put(key, JobValue::StringArray(value))
    }

    pub fn int_array(self, key: impl Into<String>, value: Vec<i32>) -> Self {
        self.put(key, JobValue::IntArray(value))
    }

    pub fn long_array(self, key: impl Into<String>, value: Vec<i64>) -> Self {
        self.put(key, JobValue::LongArray(value))
    }

    pub fn boolean_array(self, key: impl Into<String>, value: Vec<bool>) -> Self {
        self.put(key, JobValue::BooleanArray(value))
    }

    pub fn bytes_array(self, key: impl Into<String>, value: Vec<Vec<u8>>) -> Self {
        self.put(key, JobValue::BytesArray(value))
    }

    /// Stores the value only when present; absent optionals are left out entirely.
    pub fn optional_string(self, key: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.string(key, value),
            None => self,
        }
    }

    pub fn optional_long(self, key: impl Into<String>, value: Option<i64>) -> Self {
        match value {
            Some(value) => self.long(key, value),
            None => self,
        }
    }

    pub fn build(self) -> JobData {
        JobData {
            values: self.values,
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_array {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(|item| STANDARD.encode(item)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .collect()
    }
}
