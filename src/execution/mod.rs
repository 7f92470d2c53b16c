pub mod engine;
pub mod guard;
pub mod result;

pub use engine::{ExecutionEngine, QueryParameters};
pub use result::{Scalar, StructuredResult};
