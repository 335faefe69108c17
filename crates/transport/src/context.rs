use std::sync::Arc;

use codec::{FrameCodec, Message};
use dispatch::PriorityPools;
use registry::ConnectionRegistry;

/// A decoded message tagged with the id of the session it arrived on —
/// the unit of work the ingress dispatch pools consume (§4.4).
pub type IngressItem = (u32, Message);

/// Everything a listener needs to turn an accepted connection into a
/// registered session feeding the ingress pipeline.
pub struct TransportContext {
    pub registry: Arc<ConnectionRegistry>,
    pub ingress: Arc<PriorityPools<IngressItem>>,
    pub codec: Arc<FrameCodec>,
}
