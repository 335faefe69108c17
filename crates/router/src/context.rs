use std::sync::Arc;

use egress::EgressPipeline;
use filetransfer::FileTransferEngine;
use registry::ConnectionRegistry;

/// A decoded message tagged with the id of the session it arrived on.
/// Structurally identical to `transport::IngressItem`; kept local so this
/// crate doesn't need a dependency on `transport` for one tuple type.
pub type IngressItem = (u32, codec::Message);

pub struct RouterContext {
    pub registry: Arc<ConnectionRegistry>,
    pub egress: Arc<EgressPipeline>,
    pub file_transfer: Arc<FileTransferEngine>,
}

impl RouterContext {
    pub fn new(registry: Arc<ConnectionRegistry>, egress: Arc<EgressPipeline>, file_transfer: Arc<FileTransferEngine>) -> Arc<Self> {
        Arc::new(RouterContext { registry, egress, file_transfer })
    }
}
