// SPDX-License-Identifier: Apache-2.0

use crate::component::{ComponentId, Host};
use crate::init::wait;
use bytes::Bytes;
use http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::{BoxError, Service};
use tracing::{error, info};

pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A TCP socket that is both bound and listening, so it is ready to accept()
/// connections once created. Components bind in `start` so that an address
/// conflict fails startup instead of surfacing later.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn listen(endpoint: SocketAddr) -> Result<Self, BoxError> {
        match TcpListener::bind(endpoint).await {
            Ok(l) => Ok(Self { inner: l }),
            Err(e) => Err(format!("unable to bind to {}: {}", endpoint, e).into()),
        }
    }

    pub fn bound_address(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.inner.local_addr()?)
    }

    /// Serves HTTP/1 and HTTP/2 with the given tower service until `cancellation`
    /// fires, then drains open connections.
    pub async fn serve<S, B>(
        self,
        svc: S,
        header_timeout: Duration,
        cancellation: CancellationToken,
    ) -> Result<(), BoxError>
    where
        S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError>,
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        // To bridge Tower->Hyper we must wrap the tower service
        let svc = TowerToHyperService::new(svc);

        let timer = hyper_util::rt::TokioTimer::new();
        let graceful = hyper_util::server::graceful::GracefulShutdown::new();

        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .header_read_timeout(Some(header_timeout))
            .timer(timer.clone());
        builder.http2().timer(timer);

        let listener = self.inner;
        loop {
            let stream = tokio::select! {
                r = listener.accept() => {
                    match r {
                        Ok((stream, _)) => stream,
                        Err(e) => return Err(e.into()),
                    }
                },
                _ = cancellation.cancelled() => break
            };

            let io = TokioIo::new(stream);

            let conn = builder.serve_connection(io, svc.clone());
            let fut = graceful.watch(conn.into_owned());

            tokio::spawn(async move {
                let _ = fut.await.map_err(|e| {
                    if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
                        let err_str = format!("{:?}", hyper_err);

                        // Client shutdown races and idle connections hitting the
                        // header timeout are expected
                        let err_not_connected = err_str.contains("NotConnected");
                        let err_hdr_timeout = err_str.contains("HeaderTimeout");

                        if !err_not_connected && !err_hdr_timeout {
                            error!("error serving connection: {:?}", hyper_err);
                        }
                    } else {
                        error!("error serving connection: {:?}", e);
                    }
                });
            });
        }

        // gracefully shutdown existing connections
        graceful.shutdown().await;

        Ok(())
    }
}

/// An HTTP server owned by a component: bound in `start`, served on a background
/// task, drained in `stop`. A serve failure after startup is reported to the host
/// as fatal.
pub struct ServerTask {
    bound: OnceLock<SocketAddr>,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<Result<(), BoxError>>>,
}

impl Default for ServerTask {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerTask {
    pub fn new() -> Self {
        Self {
            bound: OnceLock::new(),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// The address the server bound to, once started.
    pub fn bound_address(&self) -> Option<SocketAddr> {
        self.bound.get().copied()
    }

    pub async fn start<S, B>(
        &self,
        id: &ComponentId,
        endpoint: SocketAddr,
        svc: S,
        host: Arc<dyn Host>,
    ) -> Result<SocketAddr, BoxError>
    where
        S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError>,
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let listener = Listener::listen(endpoint).await?;
        let addr = listener.bound_address()?;
        let _ = self.bound.set(addr);
        info!(component_id = %id, address = %addr, "Listening for HTTP requests.");

        let cancel = self.cancel.clone();
        let id = id.clone();
        self.tasks.lock().await.spawn(async move {
            let res = listener.serve(svc, DEFAULT_HEADER_TIMEOUT, cancel).await;
            if let Err(e) = &res {
                error!(component_id = %id, error = %e, "HTTP server stopped unexpectedly.");
                host.report_fatal_error(format!("{:?} stopped serving: {}", id.to_string(), e).into());
            }
            res
        });

        Ok(addr)
    }

    pub async fn stop(&self) -> Result<(), BoxError> {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        wait::wait_for_tasks_with_timeout(&mut tasks, SHUTDOWN_TIMEOUT).await
    }
}
