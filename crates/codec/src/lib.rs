pub mod checksum;
pub mod frame;
pub mod message;
pub mod serializer;

pub use checksum::{ChecksumCalculator, Fletcher16};
pub use frame::{FrameCodec, FrameCodecConfig, FrameError};
pub use message::{Message, Priority};
pub use serializer::{DataSerializer, JsonSerializer};
