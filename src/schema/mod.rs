//! Schema Catalog
//!
//! Introspects tables, columns and foreign keys into a snapshot the oracle can read.

pub mod catalog;

pub use catalog::*;
