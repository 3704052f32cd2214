use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid schema id '{0}': expected '<name>/v<version>'")]
pub struct ParseSchemaIdError(pub String);

/// Identifier of an artifact schema, written as `name/vN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SchemaId {
    pub name: String,
    pub version: u32,
}

impl SchemaId {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// First version of the schema named after an artifact.
    pub fn v1(name: impl Into<String>) -> Self {
        Self::new(name, 1)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.name, self.version)
    }
}

impl FromStr for SchemaId {
    type Err = ParseSchemaIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseSchemaIdError(s.to_string());
        let (name, version) = s.split_once('/').ok_or_else(invalid)?;
        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(name, version))
    }
}

impl From<SchemaId> for String {
    fn from(id: SchemaId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SchemaId {
    type Error = ParseSchemaIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
