//! `engine` crate — the workflow graph domain model, graph validation, and
//! the run executor.

pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod pricing;

pub use dag::validate_graph;
pub use error::{EngineError, ErrorKind};
pub use executor::Executor;
pub use models::{Graph, GraphEdge, GraphNode};
