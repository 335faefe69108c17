use std::io;

#[derive(Debug, thiserror::Error)]
pub enum FileTransferError {
    #[error("chunk {0} missing at finalize")]
    MissingChunk(u32),
    #[error("no expected whole-file hash is known for this transfer")]
    MissingWholeHash,
    #[error("whole-file hash mismatch after merging all chunks")]
    WholeHashMismatch,
    #[error("filesystem error: {0}")]
    Io(#[source] io::Error),
}
