//! OAuth providers an account can be bound to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthResource {
    Github,
    Facebook,
    Google,
}

impl OAuthResource {
    pub const ALL: [Self; 3] = [Self::Github, Self::Facebook, Self::Google];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Facebook => "facebook",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for OAuthResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthResource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("oauth resource", s))
    }
}
