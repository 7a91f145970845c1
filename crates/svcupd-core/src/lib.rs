//! Service lifecycle management with forwarding to a local remote update agent.

pub mod config;
pub mod controller;
pub mod error;
pub mod login;
pub mod manager;
pub mod protocol;
pub mod remote;
pub mod version;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use manager::SvcUpdMgr;
