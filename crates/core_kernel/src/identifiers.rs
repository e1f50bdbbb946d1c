//! Strongly-typed identifiers
//!
//! Projects and resources are named by the cloud (the names arrive as tags
//! of every measurement), so they are validated string newtypes. Tasks are
//! identified by time-ordered UUIDs generated in-process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when constructing a named identifier
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} `{value}` contains reserved character `{character}`")]
    ReservedCharacter {
        kind: &'static str,
        value: String,
        character: char,
    },
}

macro_rules! define_name {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier
            ///
            /// Whitespace, commas and `=` are rejected since they delimit
            /// the line protocol the identifier travels in.
            pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(IdentifierError::Empty { kind: $kind });
                }
                if let Some(character) = value
                    .chars()
                    .find(|c| c.is_whitespace() || *c == ',' || *c == '=')
                {
                    return Err(IdentifierError::ReservedCharacter {
                        kind: $kind,
                        value,
                        character,
                    });
                }
                Ok(Self(value))
            }

            /// Returns the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name!(ProjectId, "project id");
define_name!(ResourceId, "resource id");

/// Identifier of one unit of work flowing through the pipeline
///
/// Used to correlate all log lines of a single measurement since many are
/// processed in parallel and their logs interleave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered identifier (v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the identifier prefix for display
    pub fn prefix() -> &'static str {
        "TSK"
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", Self::prefix(), self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid_str = s.strip_prefix("TSK-").unwrap_or(s);
        Ok(Self(Uuid::parse_str(uuid_str)?))
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_display() {
        let id = ProjectId::new("demo").unwrap();
        assert_eq!(id.to_string(), "demo");
    }

    #[test]
    fn test_project_id_rejects_delimiters() {
        assert!(matches!(
            ProjectId::new("a,b"),
            Err(IdentifierError::ReservedCharacter { character: ',', .. })
        ));
        assert!(matches!(ProjectId::new(""), Err(IdentifierError::Empty { .. })));
    }

    #[test]
    fn test_task_id_parsing() {
        let original = TaskId::new();
        let parsed: TaskId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }
}
