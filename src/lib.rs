//! Undo/redo change tracking for reflected, serializable aggregates.
//!
//! A [`core::tracker::Tracked`] editor owns one aggregate. Every mutation made
//! through an [`core::edit::Edit`] view is applied immediately and recorded as
//! encoded events; events group into actions that can be undone and redone.
//! Committing a new action while undone actions remain keeps them in the log
//! as an elided range instead of discarding them. Per-field selections are
//! recorded alongside the data, and old history can be trimmed by action count
//! or by byte budget.
//!
//! # Examples
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tracked::core::tracker::Tracked;
//!
//! tracked::reflect! {
//!     #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//!     pub struct Doc {
//!         pub title: String,
//!         pub items: Vec<i32>,
//!     }
//! }
//!
//! let mut doc = Tracked::<Doc>::new(Doc::default());
//! {
//!     let mut edit = doc.create_action();
//!     edit.field("title").unwrap().set("draft").unwrap();
//!     edit.field("items").unwrap().append([3, 1, 2]).unwrap();
//! }
//! doc.create_action().field("items").unwrap().sort().unwrap();
//! assert_eq!(doc.read().items, vec![1, 2, 3]);
//!
//! doc.undo_action().unwrap();
//! assert_eq!(doc.read().items, vec![3, 1, 2]);
//! doc.redo_action().unwrap();
//! assert_eq!(doc.read().items, vec![1, 2, 3]);
//! ```
//!
//! Runtime usage with a SQLite journal:
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use tracked::{
//!     config::TrackerConfig,
//!     core::tracker::Tracked,
//!     persist::sqlite::SqliteJournal,
//!     runtime::handle::{spawn_tracked, RuntimeConfig},
//! };
//!
//! tracked::reflect! {
//!     #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//!     pub struct Doc {
//!         pub items: Vec<i32>,
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteJournal::open("history.db").expect("open sqlite");
//! let tracked = Tracked::<Doc, String>::with_config(Doc::default(), TrackerConfig::journaled());
//! let handle = spawn_tracked(tracked, Some(Box::new(sink)), RuntimeConfig::default());
//! handle
//!     .edit(Some("add".to_string()), |edit| edit.field("items")?.push(7))
//!     .await
//!     .expect("edit");
//! handle.undo().await.expect("undo");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Editor configuration.
pub mod config;
/// Event log, history, selections and edit views.
pub mod core;
/// Event model and journal record types.
pub mod op;
/// Journal persistence abstraction and SQLite implementation.
pub mod persist;
/// Reflection collaborator: descriptors and dynamic field access.
pub mod reflect;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared ids and field paths.
pub mod types;
