//! Wires every crate together behind a start/stop API (§5): one
//! `ConnectionRegistry`, one `FrameCodec`, the ingress dispatch pools feeding
//! the router, the egress pipeline, file transfer engine, heartbeat and
//! traffic monitors, and whichever transport listeners the config names.

use std::sync::Arc;

use codec::{ChecksumCalculator, DataSerializer, Fletcher16, FrameCodec, FrameCodecConfig, JsonSerializer};
use crypto::{AesGcmCipher, PayloadCipher};
use dispatch::PriorityPools;
use egress::EgressPipeline;
use filetransfer::FileTransferEngine;
use registry::ConnectionRegistry;
use router::RouterContext;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use transport::{HttpsListenerConfig, TlsListenerConfig, TransportContext};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// The running server. Holds every spawned task handle so `stop` can cancel
/// the shared token and join all of them before returning.
pub struct Server {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    traffic: Arc<traffic::TrafficMonitor>,
    cancellation: CancellationToken,
    handles: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Builds every component described by `config` but starts nothing —
    /// call [`Self::start`] to bind listeners and spawn workers.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, ServerError> {
        let registry = Arc::new(ConnectionRegistry::new());
        let (traffic, _latest) = traffic::TrafficMonitor::new(registry.clone());

        Ok(Arc::new(Server {
            config,
            registry,
            traffic,
            cancellation: CancellationToken::new(),
            handles: AsyncMutex::new(Vec::new()),
        }))
    }

    /// A receiver that observes every traffic sample as it's produced.
    pub fn traffic_monitor(&self) -> &Arc<traffic::TrafficMonitor> {
        &self.traffic
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), ServerError> {
        let codec = self.build_codec();
        let ingress: Arc<PriorityPools<transport::IngressItem>> =
            Arc::new(PriorityPools::new(num_cpus::get(), self.config.dispatch_depth_threshold));
        let egress = EgressPipeline::new(
            self.registry.clone(),
            codec.clone(),
            num_cpus::get(),
            self.config.dispatch_depth_threshold,
            self.config.pending_queue_cap,
        );
        let file_transfer = FileTransferEngine::new(self.config.transfer_root.clone());
        let router_ctx = RouterContext::new(self.registry.clone(), egress.clone(), file_transfer);
        let handler = router::build_handler(router_ctx);

        let mut handles = Vec::new();
        handles.extend(ingress.spawn(self.cancellation.child_token(), handler));
        handles.extend(egress.spawn(self.cancellation.child_token()));
        handles.push(heartbeat::spawn(
            self.registry.clone(),
            heartbeat::HeartbeatConfig { interval: self.config.heartbeat_interval, liveness_timeout: self.config.liveness_timeout },
            self.cancellation.child_token(),
        ));
        handles.push(self.traffic.spawn(self.config.monitor_interval, self.cancellation.child_token()));
        if self.config.enable_traffic_monitor {
            self.traffic.enable();
        }

        let transport_ctx = Arc::new(TransportContext { registry: self.registry.clone(), ingress, codec: codec.clone() });

        if let Some(addr) = self.config.bind.tcp {
            handles.push(transport::spawn_tcp_listener(addr, transport_ctx.clone(), self.cancellation.child_token()).await?);
        }
        if let Some(addr) = self.config.bind.udp {
            handles.push(transport::spawn_udp_listener(addr, transport_ctx.clone(), self.cancellation.child_token()).await?);
        }
        if let Some(addr) = self.config.bind.http {
            handles.push(transport::spawn_http_listener(addr, transport_ctx.clone(), self.cancellation.child_token()).await?);
        }
        if let Some(addr) = self.config.bind.tls {
            let tls = self.config.tls.as_ref().ok_or(ServerError::MissingTlsConfig)?;
            let tls_config = TlsListenerConfig {
                cert_path: tls.cert_path.clone(),
                key_path: tls.key_path.clone(),
                trusted_client_cert_path: tls.trusted_client_cert_path.clone(),
            };
            handles.push(transport::spawn_tls_listener(addr, tls_config, transport_ctx.clone(), self.cancellation.child_token()).await?);
        }
        if let Some(addr) = self.config.bind.https {
            let tls = self.config.tls.as_ref().ok_or(ServerError::MissingTlsConfig)?;
            let https_config = HttpsListenerConfig { cert_path: tls.cert_path.clone(), key_path: tls.key_path.clone() };
            handles.push(transport::spawn_https_listener(addr, https_config, transport_ctx, self.cancellation.child_token()).await?);
        }

        info!(
            tcp = self.config.bind.tcp.is_some(),
            tls = self.config.bind.tls.is_some(),
            udp = self.config.bind.udp.is_some(),
            http = self.config.bind.http.is_some(),
            https = self.config.bind.https.is_some(),
            "server started"
        );

        self.handles.lock().await.extend(handles);
        Ok(())
    }

    /// Cancels every spawned task and waits for them to finish.
    pub async fn stop(&self) {
        self.cancellation.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("server stopped");
    }

    fn build_codec(&self) -> Arc<FrameCodec> {
        let cipher: Option<Box<dyn PayloadCipher>> =
            self.config.encryption_key.as_ref().map(|key| Box::new(AesGcmCipher::new(key)) as Box<dyn PayloadCipher>);
        Arc::new(FrameCodec::new(
            FrameCodecConfig {
                version: *self.config.accepted_protocol_versions.last().unwrap_or(&0x02),
                accepted_versions: self.config.accepted_protocol_versions.clone(),
                max_packet_size: self.config.max_packet_size,
            },
            Box::new(JsonSerializer) as Box<dyn DataSerializer>,
            Box::new(Fletcher16) as Box<dyn ChecksumCalculator>,
            cipher,
        ))
    }
}
