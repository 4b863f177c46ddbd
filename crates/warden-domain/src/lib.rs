//! Value types shared by the Warden identity crates.
//!
//! This crate contains only pure types with no framework dependencies.
//! Storage backends map these to and from their column representations.

pub mod email;
pub mod link;
pub mod oauth;
pub mod pagination;
pub mod user;

/// Error returned when a stored or wire string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}
