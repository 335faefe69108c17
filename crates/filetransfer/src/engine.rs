//! Engine owning every in-flight [`FileTransfer`] (§4.8).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::FileTransferError;
use crate::hash::hash_hex;
use crate::transfer::FileTransfer;

/// One chunk as handed down from the router, already stripped of its
/// envelope (priority/seq/source are the router's concern, not the engine's).
pub struct ChunkInput {
    pub transfer_id: u64,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub chunk_hash: String,
    pub file_hash: Option<String>,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    /// Chunk hash matched and was stored; transfer still incomplete.
    Acked,
    /// Chunk hash did not match; nothing was stored.
    Nacked,
    /// The last chunk arrived, the merge succeeded, and the whole-file
    /// hash matched. The transfer entry has been removed.
    Completed { destination_path: PathBuf },
    /// The last chunk arrived but the merge/verify failed. The transfer
    /// entry has been removed and no file was written.
    Aborted { reason: String },
}

pub struct FileTransferEngine {
    transfers: DashMap<u64, Arc<Mutex<FileTransfer>>>,
    transfer_root: PathBuf,
}

impl FileTransferEngine {
    pub fn new(transfer_root: PathBuf) -> Arc<Self> {
        Arc::new(FileTransferEngine { transfers: DashMap::new(), transfer_root })
    }

    pub async fn handle_chunk(&self, input: ChunkInput) -> Result<ChunkOutcome, FileTransferError> {
        if hash_hex(&input.bytes) != input.chunk_hash {
            warn!(transfer_id = input.transfer_id, chunk_index = input.chunk_index, "chunk hash mismatch; nacking");
            return Ok(ChunkOutcome::Nacked);
        }

        let handle = self.transfer_handle(&input).await?;
        let ready = {
            let mut transfer = handle.lock().await;
            transfer.learn_whole_hash(input.file_hash.clone());
            transfer.store_chunk(input.chunk_index, input.bytes);
            transfer.is_complete()
        };

        if !ready {
            return Ok(ChunkOutcome::Acked);
        }

        let result = {
            let transfer = handle.lock().await;
            transfer.finalize().await
        };
        self.transfers.remove(&input.transfer_id);

        match result {
            Ok(destination_path) => Ok(ChunkOutcome::Completed { destination_path }),
            Err(err) => Ok(ChunkOutcome::Aborted { reason: err.to_string() }),
        }
    }

    async fn transfer_handle(&self, input: &ChunkInput) -> Result<Arc<Mutex<FileTransfer>>, FileTransferError> {
        if let Some(existing) = self.transfers.get(&input.transfer_id) {
            return Ok(existing.clone());
        }

        let destination_path = self.resolve_unique_path(input.file_name.as_deref(), input.transfer_id).await?;
        let created = Arc::new(Mutex::new(FileTransfer::new(
            input.transfer_id,
            input.total_chunks,
            input.file_hash.clone(),
            destination_path,
        )));
        let entry = self.transfers.entry(input.transfer_id).or_insert_with(|| created);
        Ok(entry.clone())
    }

    async fn resolve_unique_path(&self, file_name: Option<&str>, transfer_id: u64) -> Result<PathBuf, FileTransferError> {
        let base_name = file_name.map(str::to_string).unwrap_or_else(|| format!("transfer-{transfer_id}"));
        let (stem, ext) = split_stem_ext(&base_name);

        let mut candidate = self.transfer_root.join(&base_name);
        let mut suffix = 0u32;
        while path_exists(&candidate).await.map_err(FileTransferError::Io)? {
            suffix += 1;
            let name = match &ext {
                Some(ext) => format!("{stem}_{suffix}.{ext}"),
                None => format!("{stem}_{suffix}"),
            };
            candidate = self.transfer_root.join(name);
        }
        Ok(candidate)
    }
}

async fn path_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

fn split_stem_ext(name: &str) -> (String, Option<String>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (name.to_string(), None),
    }
}
