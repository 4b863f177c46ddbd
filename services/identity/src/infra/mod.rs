pub mod db;
pub mod memory;
pub mod secret;
pub(crate) mod tx;
