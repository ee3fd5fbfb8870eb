//! Server assembly and accept loop.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::client::create_http_client;
use super::handler::ProxyService;
use crate::config::Config;
use crate::mock::MockStore;
use crate::report::ReportStreamer;
use crate::transaction::{BroadcastSink, TransactionStore};
use crate::validation::{ContractValidator, ValidationService};

/// Broadcast buffer for slow observers; older events are dropped per
/// subscriber once it lags this far behind.
const BROADCAST_CAPACITY: usize = 256;

pub struct ProxyServer {
    config: Config,
    service: Arc<ProxyService>,
    streamer: Option<ReportStreamer>,
}

impl ProxyServer {
    /// Assemble the pipeline from configuration. A failed report-streamer
    /// start is logged and disables streaming; it does not stop the proxy.
    pub fn new(
        config: Config,
        validator: Arc<dyn ContractValidator>,
    ) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let mocks = match &config.mock_definitions {
            Some(path) => MockStore::from_file(path)?,
            None => MockStore::empty(),
        };
        info!("loaded {} mock definitions", mocks.len());

        let streamer = match &config.report_file {
            Some(path) => match ReportStreamer::start(path) {
                Ok(streamer) => Some(streamer),
                Err(err) => {
                    error!("cannot stream violations: {err:#}");
                    None
                }
            },
            None => None,
        };

        let broadcast = BroadcastSink::new(BROADCAST_CAPACITY);
        let validation = Arc::new(ValidationService::new(
            validator,
            Arc::new(TransactionStore::new()),
            broadcast,
            streamer.as_ref().map(|s| s.sink()),
        ));

        let client = create_http_client(&config.connection_pool);
        let service = Arc::new(ProxyService::new(
            config.redirect.clone(),
            client,
            Arc::new(mocks),
            validation,
        ));

        Ok(Self {
            config,
            service,
            streamer,
        })
    }

    /// Shared pipeline state, also used to drive requests in-process.
    pub fn service(&self) -> Arc<ProxyService> {
        Arc::clone(&self.service)
    }

    pub fn streamer(&self) -> Option<&ReportStreamer> {
        self.streamer.as_ref()
    }

    /// Accept connections until the process is stopped.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen.port));
        let listener = TcpListener::bind(addr).await?;

        info!("listening on http://{addr}");
        info!("redirecting traffic to {}", self.config.redirect.base_url());

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let service = Arc::clone(&self.service);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let handler = service_fn(move |req| {
                    let service = Arc::clone(&service);
                    async move { service.handle(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, handler).await {
                    error!("error serving connection from {remote_addr}: {err}");
                }
            });
        }
    }
}
