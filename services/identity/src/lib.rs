//! Identity and account persistence: users, profiles, OAuth bindings,
//! links, session tokens and the registration domain blacklist.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;

pub use config::StoreConfig;
pub use domain::store::IdentityStore;
pub use domain::types::{
    Accounts, DomainBlacklistEntry, Link, Profile, ProfileData, Token, User,
};
pub use error::{Entity, StoreError};
pub use infra::db::SeaStore;
pub use infra::memory::MemoryStore;
