//! Infrastructure layer - Engine, handlers and collaborator implementations

pub mod ai;
pub mod execution_log;
pub mod http;
pub mod logging;
pub mod notification;
pub mod record;
pub mod workflow;
