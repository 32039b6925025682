//! Common structs for transaction data, run namespaces and stage artifacts
//! shared across crates.

mod artifact;
mod error;
mod run;
pub mod schema;
mod table;
mod transaction;

pub use artifact::*;
pub use error::*;
pub use run::*;
pub use schema::{ColumnKind, ColumnSpec, TARGET_COLUMN, TRANSACTION_SCHEMA};
pub use table::*;
pub use transaction::*;
