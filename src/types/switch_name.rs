// ABOUTME: Validated switch name newtype.
// ABOUTME: Switch names key the factory cache and appear in every log line.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchNameError {
    #[error("switch name cannot be empty")]
    Empty,

    #[error("switch name cannot contain whitespace: '{0}'")]
    Whitespace(String),

    #[error("invalid character in switch name: '{0}'")]
    InvalidChar(char),
}

/// Unique name of one switch, used as the factory cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchName(String);

impl SwitchName {
    pub fn new(value: &str) -> Result<Self, SwitchNameError> {
        if value.is_empty() {
            return Err(SwitchNameError::Empty);
        }

        for c in value.chars() {
            if c.is_whitespace() {
                return Err(SwitchNameError::Whitespace(value.to_string()));
            }
            if c.is_control() {
                return Err(SwitchNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for SwitchName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwitchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SwitchName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SwitchName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        SwitchName::new(&value).map_err(serde::de::Error::custom)
    }
}
