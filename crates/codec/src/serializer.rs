//! Pluggable payload serializer (§4.1: "the codec takes a `DataSerializer`").

use crate::message::Message;

pub trait DataSerializer: Send + Sync {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, serde_json::Error>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Message, serde_json::Error>;
}

/// Default serializer: the `Message` enum tagged with `info_type`,
/// following the teacher's `rt_protocol::WsMessage` shape (§4.1.1).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl DataSerializer for JsonSerializer {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(message)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Priority;

    #[test]
    fn json_serializer_round_trips() {
        let ser = JsonSerializer;
        let msg = Message::Ack {
            priority: Priority::Medium,
            seq_num: 3,
            ack_num: 3,
            source_id: 1,
            message: None,
        };
        let bytes = ser.serialize(&msg).unwrap();
        let back = ser.deserialize(&bytes).unwrap();
        assert_eq!(msg, back);
    }
}
