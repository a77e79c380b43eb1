//! Collaborators fed by the enigma memory bridge.
//!
//! Nothing in this crate touches guest state. Both collaborators receive
//! plain values copied or borrowed out of guest memory by the caller.
//!
//! # Collaborators
//!
//! - [`journal`]: Records each processed input and the guest's result
//! - [`render`]: Receives vertex data for upload

pub mod journal;
pub mod render;

pub use journal::{JournalEntry, ResultJournal};
pub use render::{Vertex, VertexBuffer, VertexSink};
