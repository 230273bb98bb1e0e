// SPDX-License-Identifier: Apache-2.0

use crate::component::{
    Component, ComponentId, CreateSettings, Factory, Host, Receiver, ReceiverFactory,
};
use crate::listener::ServerTask;
use crate::topology::consumer::Consumer;
use crate::topology::payload::{Message, Signal};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use http::header::CONTENT_ENCODING;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use read_restrict::ReadExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Service, ServiceBuilder};
use tower_http::limit::{RequestBodyLimit, RequestBodyLimitLayer};
use tower_http::trace::{HttpMakeClassifier, Trace, TraceLayer};
use tracing::{debug, error, warn};

pub const TYPE: &str = "http";

// 20MiB matches the usual collector limit
const MAX_BODY_SIZE: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpReceiverConfig {
    pub endpoint: SocketAddr,
    pub traces_path: String,
    pub metrics_path: String,
    pub logs_path: String,
    pub max_body_size: usize,
}

impl Default for HttpReceiverConfig {
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::from(([127, 0, 0, 1], 4318)),
            traces_path: "/v1/traces".to_string(),
            metrics_path: "/v1/metrics".to_string(),
            logs_path: "/v1/logs".to_string(),
            max_body_size: MAX_BODY_SIZE,
        }
    }
}

impl HttpReceiverConfig {
    fn from_value(config: &Value) -> Result<Self, BoxError> {
        let cfg: Self = serde_json::from_value(config.clone())?;
        for path in [&cfg.traces_path, &cfg.metrics_path, &cfg.logs_path] {
            if !path.starts_with('/') {
                return Err(format!("path {:?} must start with '/'", path).into());
            }
        }
        if cfg.traces_path == cfg.metrics_path
            || cfg.traces_path == cfg.logs_path
            || cfg.metrics_path == cfg.logs_path
        {
            return Err("traces, metrics and logs paths must differ".into());
        }
        if cfg.max_body_size == 0 {
            return Err("max_body_size must be greater than zero".into());
        }
        Ok(cfg)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpReceiverFactory;

impl Factory for HttpReceiverFactory {
    fn type_name(&self) -> &str {
        TYPE
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(HttpReceiverConfig::default()).unwrap_or_default()
    }

    fn validate_config(&self, config: &Value) -> Result<(), BoxError> {
        HttpReceiverConfig::from_value(config).map(|_| ())
    }
}

impl ReceiverFactory for HttpReceiverFactory {
    fn create_receiver(
        &self,
        settings: CreateSettings,
        config: &Value,
        next: Arc<dyn Consumer>,
    ) -> Result<Option<Arc<dyn Receiver>>, BoxError> {
        let config = HttpReceiverConfig::from_value(config)?;
        Ok(Some(Arc::new(HttpReceiver::new(settings.id, config, next))))
    }
}

/// Accepts encoded telemetry over HTTP POST and pushes each body into the
/// pipeline as a single payload item.
pub struct HttpReceiver {
    id: ComponentId,
    config: HttpReceiverConfig,
    next: Arc<dyn Consumer>,
    server: ServerTask,
}

impl HttpReceiver {
    pub fn new(id: ComponentId, config: HttpReceiverConfig, next: Arc<dyn Consumer>) -> Self {
        Self {
            id,
            config,
            next,
            server: ServerTask::new(),
        }
    }

    /// The address the listener bound to, once started.
    pub fn bound_address(&self) -> Option<SocketAddr> {
        self.server.bound_address()
    }
}

#[async_trait]
impl Component for HttpReceiver {
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), BoxError> {
        let svc = build_service(self.next.clone(), &self.config);
        self.server
            .start(&self.id, self.config.endpoint, svc, host)
            .await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.server.stop().await
    }
}

impl Receiver for HttpReceiver {}

type HttpService = Trace<RequestBodyLimit<IngestService>, HttpMakeClassifier>;

fn build_service(next: Arc<dyn Consumer>, config: &HttpReceiverConfig) -> HttpService {
    ServiceBuilder::new()
        // Log requests at debug level
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_body_size))
        .service(IngestService {
            next,
            routes: Arc::new([
                (config.traces_path.clone(), Signal::Traces),
                (config.metrics_path.clone(), Signal::Metrics),
                (config.logs_path.clone(), Signal::Logs),
            ]),
            max_body_size: config.max_body_size,
        })
}

#[derive(Clone)]
struct IngestService {
    next: Arc<dyn Consumer>,
    routes: Arc<[(String, Signal); 3]>,
    max_body_size: usize,
}

impl IngestService {
    fn route(&self, path: &str) -> Option<Signal> {
        self.routes
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, signal)| *signal)
    }
}

impl<H> Service<Request<H>> for IngestService
where
    H: Body + Send + Sync + 'static,
    <H as Body>::Data: Send + Sync,
    <H as Body>::Error: Display + Debug + Send + Sync,
{
    type Response = Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<H>) -> Self::Future {
        if req.method() != Method::POST {
            return Box::pin(futures::future::ok(response_4xx(StatusCode::NOT_FOUND)));
        }
        match self.route(req.uri().path()) {
            Some(signal) => Box::pin(handle(
                req,
                signal,
                self.next.clone(),
                self.max_body_size,
            )),
            None => Box::pin(futures::future::ok(response_4xx(StatusCode::NOT_FOUND))),
        }
    }
}

async fn handle<H: Body>(
    req: Request<H>,
    signal: Signal,
    next: Arc<dyn Consumer>,
    max_body_size: usize,
) -> Result<Response<Full<Bytes>>, hyper::Error>
where
    <H as Body>::Error: Display + Debug,
{
    let body = match decode_body(req, max_body_size).await {
        Ok(b) => b,
        Err(code) => return Ok(response_4xx(code)),
    };
    if body.is_empty() {
        debug!(signal = %signal, "Empty request body.");
        return Ok(response_4xx(StatusCode::BAD_REQUEST));
    }

    match next.consume(Message::new(signal, vec![body])).await {
        Ok(()) => Ok(Response::new(Full::new(Bytes::new()))),
        Err(e) => {
            warn!(signal = %signal, error = %e, "Pipeline refused data.");
            Ok(response_4xx(StatusCode::SERVICE_UNAVAILABLE))
        }
    }
}

async fn decode_body<H: Body>(req: Request<H>, max_body_size: usize) -> Result<Bytes, StatusCode>
where
    <H as Body>::Error: Display + Debug,
{
    let is_gzip = req
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    let body_bytes = match req.collect().await {
        Ok(bytes) => bytes.to_bytes(),
        Err(e) => {
            // The limit error is boxed by the time it gets here, so match on the message
            if e.to_string().contains("length limit exceeded") {
                return Err(StatusCode::PAYLOAD_TOO_LARGE);
            }
            error!("Failed to read request body: {:?}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    if !is_gzip {
        return Ok(body_bytes);
    }

    match decompress_gzip(&body_bytes, max_body_size) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            if ErrorKind::InvalidData == e.kind() {
                return Err(StatusCode::PAYLOAD_TOO_LARGE);
            }
            error!("Failed to decompress gzip data: {}", e);
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

// The tower-http decompression layer has no limit on the inflated size
fn decompress_gzip(compressed: &[u8], limit: usize) -> std::io::Result<Bytes> {
    let decoder = GzDecoder::new(compressed);
    let mut decoder = decoder.restrict(limit as u64);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(Bytes::from(decompressed))
}

fn response_4xx(code: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::default()));
    *resp.status_mut() = code;
    resp
}
