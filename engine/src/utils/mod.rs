//! Utility functions

pub mod file;
pub mod sql;
pub mod time;
