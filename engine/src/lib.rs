//! JSON filter, sort, cursor and aggregate compiler
//!
//! `query` compiles requests against entity metadata into backend-neutral
//! plans, `data` renders and executes them, `core` and `app` form the `sift`
//! binary.

pub mod app;
pub mod core;
pub mod data;
pub mod query;
pub mod utils;
