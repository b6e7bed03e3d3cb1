use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents some _node/destination_ in the system.
pub type Endpoint = String;
/// The per member logical clock, only the member itself may advance it.
pub type Incarnation = u32;

/// The identity of a member, stable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberName(String);

impl MemberName {
    pub fn new(name: impl Into<String>) -> Self {
        MemberName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemberName {
    fn from(t: &str) -> Self {
        MemberName(t.to_string())
    }
}

impl From<String> for MemberName {
    fn from(t: String) -> Self {
        MemberName(t)
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
