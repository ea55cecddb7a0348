//! Qubes VM management interface.

pub mod command;
pub mod executor;
