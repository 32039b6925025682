//! CLI command implementations.

pub mod predict;
pub mod run;
pub mod seed;
