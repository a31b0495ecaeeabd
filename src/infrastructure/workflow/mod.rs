//! Workflow engine, built-in step handlers and definition loading

mod engine;
pub mod handlers;
mod loader;

pub use engine::{WorkflowEngine, WorkflowEngineConfig};
pub use handlers::{default_registry, HandlerDependencies};
pub use loader::{load_workflow, parse_workflow, DefinitionFormat};
