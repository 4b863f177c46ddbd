//! Link kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// Purpose of a single-use link.
///
/// A user holds at most one active link of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    /// Account activation after registration.
    #[serde(rename = "confirm")]
    Confirm,
    /// Password reset.
    #[serde(rename = "pwd_change")]
    PasswordChange,
    /// Account deletion confirmation.
    #[serde(rename = "delete")]
    Delete,
}

impl LinkType {
    pub const ALL: [Self; 3] = [Self::Confirm, Self::PasswordChange, Self::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::PasswordChange => "pwd_change",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("link type", s))
    }
}
