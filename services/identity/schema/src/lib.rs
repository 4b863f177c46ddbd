//! sea-orm entities for the identity store tables.

pub mod accounts;
pub mod domain_blacklist;
pub mod links;
pub mod profiles;
pub mod tokens;
pub mod users;
