//! Task persistence layer.
//!
//! [`TaskStore`] defines the interface for persisting task records. The
//! default implementation is [`crate::db::sqlite::SqliteStore`]. To swap to
//! another database, implement [`TaskStore`] for your new type and change the
//! concrete type handed to [`crate::Scheduler::start`].
//!
//! All trait methods use `impl Future` in their signatures (stable since Rust
//! 1.75) so no extra `async-trait` crate is required here.

pub mod dao;
pub mod task;

pub use dao::TaskRecord;
pub use task::TaskStore;
