//! Stream chunk protocol: the typed messages that flow through a run stream.
//!
//! A [`Chunk`] is one message: a monotonically increasing index, a timestamp,
//! a kind-specific payload ([`ChunkData`]), and a free-form metadata map.
//! [`StreamMetadata`] describes the stream itself and is fixed for its
//! lifetime. This crate holds only the protocol types; the channel machinery
//! lives in the core crate.

mod chunk;
mod metadata;

pub use chunk::{Chunk, ChunkData, ChunkError, ChunkKind, MediaDescriptor};
pub use metadata::StreamMetadata;
