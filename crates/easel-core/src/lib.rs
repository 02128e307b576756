mod callback;
mod db;
mod engine;
mod entities;
mod queue;
mod scheduler;

pub mod api;
pub mod config;
pub mod domain;
pub mod error;

pub use callback::{CallbackNotice, CallbackSink, HttpCallbackSink};
pub use db::sqlite::SqliteStore;
pub use engine::{GenerationEngine, GenerationOutput};
pub use entities::{TaskRecord, TaskStore};
pub use error::SchedulerError;
pub use scheduler::Scheduler;
