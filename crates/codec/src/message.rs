//! Application-level payload carried inside a [`crate::Frame`].
//!
//! Mirrors the teacher's `rt_protocol::WsMessage` discriminated union: a
//! single `#[serde(tag = "info_type")]` enum instead of one struct per kind,
//! so every variant round-trips through `serde_json` without a hand-rolled
//! binary layout.

use serde::{Deserialize, Serialize};

/// Priority class a message is dispatched under. Determines which of the
/// three ingress/egress channels and dispatch pools a message travels through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];
}

/// One application message, self-describing via `info_type`.
///
/// Transfer-specific fields (`chunk_index`, `total_chunks`, `chunk_hash`,
/// `file_hash`, `file_name`, `file_size`) are only populated on the file
/// transfer variants; they are `Option` so the common message kinds stay
/// lean in the JSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "info_type", rename_all = "snake_case")]
pub enum Message {
    Heartbeat {
        priority: Priority,
        seq_num: u64,
        ack_num: u64,
        source_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    NormalClientToServer {
        priority: Priority,
        seq_num: u64,
        source_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Vec<u8>>,
    },
    ClientToClientNormal {
        priority: Priority,
        seq_num: u64,
        source_id: u32,
        target_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Vec<u8>>,
    },
    ClientToClientFile {
        priority: Priority,
        seq_num: u64,
        source_id: u32,
        target_id: u32,
        transfer_id: u64,
        chunk_index: u32,
        total_chunks: u32,
        chunk_hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_hash: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_size: Option<u64>,
        bytes: Vec<u8>,
    },
    FileChunkClientToServer {
        priority: Priority,
        seq_num: u64,
        source_id: u32,
        transfer_id: u64,
        chunk_index: u32,
        total_chunks: u32,
        chunk_hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_hash: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_size: Option<u64>,
        bytes: Vec<u8>,
    },
    FileCompleteStCommand {
        source_id: u32,
        target_id: u32,
        transfer_id: u64,
        message: String,
    },
    Ack {
        priority: Priority,
        seq_num: u64,
        ack_num: u64,
        source_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl Message {
    pub fn priority(&self) -> Priority {
        match self {
            Message::Heartbeat { priority, .. }
            | Message::NormalClientToServer { priority, .. }
            | Message::ClientToClientNormal { priority, .. }
            | Message::ClientToClientFile { priority, .. }
            | Message::FileChunkClientToServer { priority, .. }
            | Message::Ack { priority, .. } => *priority,
            // File-complete markers are never retried or classified; they
            // always ride the high-priority path so completion notices are
            // not starved behind bulk chunk traffic.
            Message::FileCompleteStCommand { .. } => Priority::High,
        }
    }

    pub fn source_id(&self) -> u32 {
        match self {
            Message::Heartbeat { source_id, .. }
            | Message::NormalClientToServer { source_id, .. }
            | Message::ClientToClientNormal { source_id, .. }
            | Message::ClientToClientFile { source_id, .. }
            | Message::FileChunkClientToServer { source_id, .. }
            | Message::FileCompleteStCommand { source_id, .. }
            | Message::Ack { source_id, .. } => *source_id,
        }
    }

    /// The peer a message should be relayed to, for the variants that carry
    /// one (§4.6's `ClientToClientNormal`/`ClientToClientFile`/`FileCompleteStCommand`).
    pub fn target_id(&self) -> Option<u32> {
        match self {
            Message::ClientToClientNormal { target_id, .. }
            | Message::ClientToClientFile { target_id, .. }
            | Message::FileCompleteStCommand { target_id, .. } => Some(*target_id),
            _ => None,
        }
    }

    /// Kind name used for the "priority matches the pool" defensive check
    /// in the dispatch pool (§4.5) and for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Heartbeat { .. } => "heartbeat",
            Message::NormalClientToServer { .. } => "normal_client_to_server",
            Message::ClientToClientNormal { .. } => "client_to_client_normal",
            Message::ClientToClientFile { .. } => "client_to_client_file",
            Message::FileChunkClientToServer { .. } => "file_chunk_client_to_server",
            Message::FileCompleteStCommand { .. } => "file_complete_st_command",
            Message::Ack { .. } => "ack",
        }
    }

    /// Terminal kinds (§4.7 step 3) are never retried by the egress pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::FileCompleteStCommand { .. } | Message::Ack { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_round_trips_through_json() {
        let msg = Message::Heartbeat {
            priority: Priority::High,
            seq_num: 7,
            ack_num: 0,
            source_id: 42,
            message: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn priority_and_source_id_accessors_cover_every_variant() {
        let msg = Message::ClientToClientNormal {
            priority: Priority::Low,
            seq_num: 1,
            source_id: 5,
            target_id: 9,
            message: Some("hi".into()),
            bytes: None,
        };
        assert_eq!(msg.priority(), Priority::Low);
        assert_eq!(msg.source_id(), 5);
        assert_eq!(msg.kind_name(), "client_to_client_normal");
        assert!(!msg.is_terminal());
        assert_eq!(msg.target_id(), Some(9));
    }

    #[test]
    fn target_id_is_none_for_non_relay_variants() {
        let msg = Message::Heartbeat {
            priority: Priority::Medium,
            seq_num: 1,
            ack_num: 0,
            source_id: 3,
            message: None,
        };
        assert_eq!(msg.target_id(), None);
    }

    #[test]
    fn file_complete_marker_is_terminal_and_high_priority() {
        let msg = Message::FileCompleteStCommand {
            source_id: 1,
            target_id: 2,
            transfer_id: 99,
            message: "FILE_COMPLETE".into(),
        };
        assert!(msg.is_terminal());
        assert_eq!(msg.priority(), Priority::High);
    }
}
