//! Ambient plumbing shared by Warden services: execution context,
//! environment configuration and tracing setup.

pub mod config;
pub mod context;
pub mod tracing;

pub use context::{Ctx, Interrupted};
