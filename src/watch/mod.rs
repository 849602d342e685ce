//! The watch engine: per-dependency poll loops (views) and the registry
//! that deduplicates them and multiplexes their notifications (watcher).
//!
//! ```text
//! template ──┐
//! template ──┼─ add() ─► Watcher ──► View (poll loop, one per distinct
//! template ──┘              │              shareable dependency)
//!                           │                 │ blocking fetch / backoff
//!                           │                 ▼
//!                           │        shared event channel
//!                           │                 │
//!                           └──── dispatcher ─┴─► WatchEvent stream
//!                                                 (to the renderer)
//! ```

mod view;
mod watcher;

pub use watcher::TemplateId;
pub use watcher::WatchEvent;
pub use watcher::Watcher;

#[cfg(test)]
mod view_test;
