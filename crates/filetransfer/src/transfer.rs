//! A single in-flight transfer's chunk buffer and terminal-state merge (§4.8).

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::FileTransferError;
use crate::hash::hash_hex;

pub struct FileTransfer {
    pub transfer_id: u64,
    total_chunks: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
    file_hash: Option<String>,
    pub destination_path: PathBuf,
}

impl FileTransfer {
    pub fn new(transfer_id: u64, total_chunks: u32, file_hash: Option<String>, destination_path: PathBuf) -> Self {
        FileTransfer { transfer_id, total_chunks, chunks: BTreeMap::new(), file_hash, destination_path }
    }

    /// Records a chunk whose per-chunk hash has already been verified by
    /// the caller. Storing the same index twice overwrites rather than
    /// duplicating, so a retransmitted chunk is idempotent.
    pub fn store_chunk(&mut self, chunk_index: u32, bytes: Vec<u8>) {
        self.chunks.insert(chunk_index, bytes);
    }

    /// Adopts the whole-file hash the first time a chunk carries it; later
    /// chunks that omit the field don't clobber an already-known value.
    pub fn learn_whole_hash(&mut self, file_hash: Option<String>) {
        if self.file_hash.is_none() {
            self.file_hash = file_hash;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.len() as u32 == self.total_chunks
    }

    /// Merges chunks in index order and verifies the result against the
    /// expected whole-file hash. Does not touch the filesystem until the
    /// hash matches, so a mismatch never leaves partial output behind.
    pub async fn finalize(&self) -> Result<PathBuf, FileTransferError> {
        let expected = self.file_hash.clone().ok_or(FileTransferError::MissingWholeHash)?;

        let mut merged = Vec::new();
        for idx in 0..self.total_chunks {
            let chunk = self.chunks.get(&idx).ok_or(FileTransferError::MissingChunk(idx))?;
            merged.extend_from_slice(chunk);
        }

        if hash_hex(&merged) != expected {
            return Err(FileTransferError::WholeHashMismatch);
        }

        if let Some(parent) = self.destination_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(FileTransferError::Io)?;
        }
        tokio::fs::write(&self.destination_path, &merged).await.map_err(FileTransferError::Io)?;
        Ok(self.destination_path.clone())
    }
}
