//! Chunked file transfer state machine (§4.8): per-chunk and whole-file
//! hash verification, collision-free destination paths.

mod engine;
mod error;
mod hash;
mod transfer;

pub use engine::{ChunkInput, ChunkOutcome, FileTransferEngine};
pub use error::FileTransferError;
