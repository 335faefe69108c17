//! Wire-level frame: `Header(4) || PayloadLen(4) || Payload(N) || Checksum(2)` (§4.1).

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::checksum::ChecksumCalculator;
use crate::message::Message;
use crate::serializer::DataSerializer;
use crypto::PayloadCipher;

const HEADER_LEN: usize = 4;
const LENGTH_LEN: usize = 4;
const CHECKSUM_LEN: usize = 2;
const RESERVED: [u8; 3] = [0, 0, 0];

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unsupported protocol version {0:#x}")]
    VersionUnsupported(u8),
    #[error("payload length {0} exceeds configured maximum {1}")]
    LengthExceedsLimit(u32, u32),
    #[error("frame checksum mismatch")]
    ChecksumMismatch,
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("remote closed the connection")]
    TransportClosed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("payload crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
}

/// Construction-time configuration for a [`FrameCodec`] (§4.1, §6).
pub struct FrameCodecConfig {
    pub version: u8,
    pub accepted_versions: Vec<u8>,
    pub max_packet_size: u32,
}

impl Default for FrameCodecConfig {
    fn default() -> Self {
        Self {
            version: 0x02,
            accepted_versions: vec![0x01, 0x02],
            max_packet_size: 128 * 1024 * 1024,
        }
    }
}

/// Ties together the pluggable serializer, checksum calculator and optional
/// cipher named in §4.1/§4.1.2.
pub struct FrameCodec {
    config: FrameCodecConfig,
    serializer: Box<dyn DataSerializer>,
    checksum: Box<dyn ChecksumCalculator>,
    cipher: Option<Box<dyn PayloadCipher>>,
}

impl FrameCodec {
    pub fn new(
        config: FrameCodecConfig,
        serializer: Box<dyn DataSerializer>,
        checksum: Box<dyn ChecksumCalculator>,
        cipher: Option<Box<dyn PayloadCipher>>,
    ) -> Self {
        Self { config, serializer, checksum, cipher }
    }

    /// Serialize `message`, optionally seal it, and frame it for the wire.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, FrameError> {
        let plain = self.serializer.serialize(message)?;
        let payload = match &self.cipher {
            Some(cipher) => cipher.seal(&plain)?,
            None => plain,
        };
        if payload.len() > self.config.max_packet_size as usize {
            return Err(FrameError::LengthExceedsLimit(
                payload.len() as u32,
                self.config.max_packet_size,
            ));
        }

        let mut header = [0u8; HEADER_LEN];
        header[0] = self.config.version;
        header[1..4].copy_from_slice(&RESERVED);

        let mut len_bytes = [0u8; LENGTH_LEN];
        LittleEndian::write_u32(&mut len_bytes, payload.len() as u32);

        let mut checksum_input = Vec::with_capacity(HEADER_LEN + LENGTH_LEN + payload.len());
        checksum_input.extend_from_slice(&header);
        checksum_input.extend_from_slice(&len_bytes);
        checksum_input.extend_from_slice(&payload);
        let checksum = self.checksum.checksum(&checksum_input);

        let mut out = checksum_input;
        out.extend_from_slice(&checksum.to_le_bytes());
        Ok(out)
    }

    /// Write an encoded frame to `writer`, looping until every byte is
    /// flushed (§4.7 step 2: writers must not leave a partial frame).
    pub async fn write_frame<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        message: &Message,
    ) -> Result<(), FrameError> {
        let bytes = self.encode(message)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Decode exactly one frame from `reader`.
    ///
    /// Reads use an explicit "read exactly N bytes" loop: a zero-length read
    /// at a frame boundary is a clean remote close ([`FrameError::TransportClosed`]);
    /// a zero-length read mid-frame is [`FrameError::ShortRead`].
    pub async fn decode<R: AsyncRead + Unpin>(&self, reader: &mut R) -> Result<Message, FrameError> {
        self.decode_with_len(reader).await.map(|(message, _frame_len)| message).map_err(|(err, _consumed)| err)
    }

    /// Like [`Self::decode`] but also returns the total number of bytes the
    /// frame occupied on the wire, so a caller (the ingress reader loop) can
    /// update a session's byte counters without re-deriving the length. On
    /// failure the error is paired with however many bytes were actually
    /// consumed from `reader` before the failure, so a caller can still
    /// account for them (§4.2 recv-byte counter; a codec error terminates
    /// the session, it never un-reads the bytes already taken off the wire).
    pub async fn decode_with_len<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<(Message, u64), (FrameError, u64)> {
        let mut consumed: u64 = 0;
        let mut head = [0u8; HEADER_LEN + LENGTH_LEN];
        read_exact_loop(reader, &mut head, &mut consumed).await.map_err(|err| (err, consumed))?;

        let version = head[0];
        if !self.config.accepted_versions.contains(&version) {
            return Err((FrameError::VersionUnsupported(version), consumed));
        }

        let payload_len = LittleEndian::read_u32(&head[HEADER_LEN..]);
        if payload_len > self.config.max_packet_size {
            return Err((FrameError::LengthExceedsLimit(payload_len, self.config.max_packet_size), consumed));
        }

        let mut payload = vec![0u8; payload_len as usize];
        read_exact_mid_frame(reader, &mut payload, &mut consumed).await.map_err(|err| (err, consumed))?;

        let mut checksum_bytes = [0u8; CHECKSUM_LEN];
        read_exact_mid_frame(reader, &mut checksum_bytes, &mut consumed).await.map_err(|err| (err, consumed))?;
        let wire_checksum = LittleEndian::read_u16(&checksum_bytes);

        let mut checksum_input = Vec::with_capacity(head.len() + payload.len());
        checksum_input.extend_from_slice(&head);
        checksum_input.extend_from_slice(&payload);
        if self.checksum.checksum(&checksum_input) != wire_checksum {
            return Err((FrameError::ChecksumMismatch, consumed));
        }

        let frame_len = consumed;
        let plain = match &self.cipher {
            Some(cipher) => cipher.open(&payload).map_err(|err| (FrameError::from(err), consumed))?,
            None => payload,
        };
        let message = self.serializer.deserialize(&plain).map_err(|err| (FrameError::from(err), consumed))?;
        Ok((message, frame_len))
    }
}

/// Reads exactly `buf.len()` bytes, treating an immediate EOF (zero bytes
/// read before any progress) as a clean remote close rather than an error.
/// Bytes read before a failure are added to `consumed` regardless of outcome.
async fn read_exact_loop<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    consumed: &mut u64,
) -> Result<(), FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(FrameError::TransportClosed);
            }
            return Err(FrameError::ShortRead { expected: buf.len(), got: filled });
        }
        filled += n;
        *consumed += n as u64;
    }
    Ok(())
}

/// Like [`read_exact_loop`] but already inside a frame: any EOF here is a
/// short read, never a clean close (the header was already consumed).
async fn read_exact_mid_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    consumed: &mut u64,
) -> Result<(), FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(FrameError::ShortRead { expected: buf.len(), got: filled });
        }
        filled += n;
        *consumed += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Fletcher16;
    use crate::message::Priority;
    use crate::serializer::JsonSerializer;
    use std::io::Cursor;

    fn codec() -> FrameCodec {
        FrameCodec::new(
            FrameCodecConfig::default(),
            Box::new(JsonSerializer),
            Box::new(Fletcher16),
            None,
        )
    }

    fn sample_message() -> Message {
        Message::Heartbeat {
            priority: Priority::High,
            seq_num: 7,
            ack_num: 0,
            source_id: 1,
            message: None,
        }
    }

    #[tokio::test]
    async fn decode_of_encode_round_trips() {
        let codec = codec();
        let msg = sample_message();
        let bytes = codec.encode(&msg).unwrap();
        let mut cursor = Cursor::new(bytes);
        let decoded = codec.decode(&mut cursor).await.unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn wrong_checksum_is_rejected_without_over_consuming() {
        let codec = codec();
        let mut bytes = codec.encode(&sample_message()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let total_len = bytes.len();
        let mut cursor = Cursor::new(bytes);
        let err = codec.decode(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch));
        assert_eq!(cursor.position() as usize, total_len);
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected() {
        let codec = codec();
        let mut bytes = codec.encode(&sample_message()).unwrap();
        bytes[0] = 0x99;
        let mut cursor = Cursor::new(bytes);
        let err = codec.decode(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::VersionUnsupported(0x99)));
    }

    #[tokio::test]
    async fn oversized_length_is_rejected_before_reading_payload() {
        let mut small_codec_config = FrameCodecConfig::default();
        small_codec_config.max_packet_size = 4;
        let codec = FrameCodec::new(
            small_codec_config,
            Box::new(JsonSerializer),
            Box::new(Fletcher16),
            None,
        );
        let err = codec.encode(&sample_message()).unwrap_err();
        assert!(matches!(err, FrameError::LengthExceedsLimit(_, 4)));
    }

    #[tokio::test]
    async fn zero_length_read_at_frame_boundary_is_clean_close() {
        let codec = codec();
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = codec.decode(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::TransportClosed));
    }

    #[tokio::test]
    async fn truncated_frame_mid_header_is_a_short_read() {
        let codec = codec();
        let bytes = codec.encode(&sample_message()).unwrap();
        let mut cursor = Cursor::new(bytes[..2].to_vec());
        let err = codec.decode(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::ShortRead { .. }));
    }

    #[tokio::test]
    async fn decode_with_len_reports_the_full_frame_size() {
        let codec = codec();
        let bytes = codec.encode(&sample_message()).unwrap();
        let expected_len = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        let (_message, frame_len) = codec.decode_with_len(&mut cursor).await.unwrap();
        assert_eq!(frame_len, expected_len);
    }

    #[tokio::test]
    async fn two_back_to_back_frames_decode_independently() {
        let codec = codec();
        let a = sample_message();
        let b = Message::Ack {
            priority: Priority::Low,
            seq_num: 1,
            ack_num: 1,
            source_id: 2,
            message: Some("ACK".into()),
        };
        let mut coalesced = codec.encode(&a).unwrap();
        coalesced.extend_from_slice(&codec.encode(&b).unwrap());
        let mut cursor = Cursor::new(coalesced);
        let decoded_a = codec.decode(&mut cursor).await.unwrap();
        let decoded_b = codec.decode(&mut cursor).await.unwrap();
        assert_eq!(decoded_a, a);
        assert_eq!(decoded_b, b);
    }
}
