#![cfg_attr(not(test), no_std)]

//! Type, error, and collaborator-interface definitions for the DSRTOS
//! kernel. This crate has no kernel logic of its own; `dsrtos_kernel`
//! builds on top of it the way `r3_kernel` builds on `r3_core`.

pub mod error;
pub mod hooks;
pub mod ids;
pub mod port;
pub mod time;
pub mod trace;

pub use error::{Error, Result};
pub use ids::{PluginId, ResourceId, TaskId};
