// SPDX-License-Identifier: Apache-2.0

use crate::component::{
    Component, ComponentId, CreateSettings, Extension, ExtensionFactory, Factory, Host,
    PipelineWatcher,
};
use crate::listener::ServerTask;
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tower::{BoxError, Service};
use tracing::info;

pub const TYPE: &str = "health_check";

const AVAILABLE: &str = r#"{"status":"Server available"}"#;
const UNAVAILABLE: &str = r#"{"status":"Server not available"}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthCheckConfig {
    pub endpoint: SocketAddr,
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::from(([127, 0, 0, 1], 13133)),
            path: "/".to_string(),
        }
    }
}

impl HealthCheckConfig {
    fn from_value(config: &Value) -> Result<Self, BoxError> {
        let cfg: Self = serde_json::from_value(config.clone())?;
        if !cfg.path.starts_with('/') {
            return Err(format!("path {:?} must start with '/'", cfg.path).into());
        }
        Ok(cfg)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HealthCheckFactory;

impl Factory for HealthCheckFactory {
    fn type_name(&self) -> &str {
        TYPE
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(HealthCheckConfig::default()).unwrap_or_default()
    }

    fn validate_config(&self, config: &Value) -> Result<(), BoxError> {
        HealthCheckConfig::from_value(config).map(|_| ())
    }
}

impl ExtensionFactory for HealthCheckFactory {
    fn create_extension(
        &self,
        settings: CreateSettings,
        config: &Value,
    ) -> Result<Option<Arc<dyn Extension>>, BoxError> {
        let config = HealthCheckConfig::from_value(config)?;
        Ok(Some(Arc::new(HealthCheck::new(settings.id, config))))
    }
}

/// Answers 200 on its path while the pipelines are running and 503 otherwise.
pub struct HealthCheck {
    id: ComponentId,
    config: HealthCheckConfig,
    ready: Arc<AtomicBool>,
    server: ServerTask,
}

impl HealthCheck {
    pub fn new(id: ComponentId, config: HealthCheckConfig) -> Self {
        Self {
            id,
            config,
            ready: Arc::new(AtomicBool::new(false)),
            server: ServerTask::new(),
        }
    }

    pub fn bound_address(&self) -> Option<SocketAddr> {
        self.server.bound_address()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Component for HealthCheck {
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), BoxError> {
        let svc = HealthService {
            ready: self.ready.clone(),
            path: Arc::from(self.config.path.as_str()),
        };
        self.server
            .start(&self.id, self.config.endpoint, svc, host)
            .await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.ready.store(false, Ordering::SeqCst);
        self.server.stop().await
    }
}

impl Extension for HealthCheck {
    fn pipeline_watcher(&self) -> Option<&dyn PipelineWatcher> {
        Some(self)
    }
}

#[async_trait]
impl PipelineWatcher for HealthCheck {
    async fn ready(&self) -> Result<(), BoxError> {
        info!(component_id = %self.id, "Health check reporting available.");
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn not_ready(&self) -> Result<(), BoxError> {
        info!(component_id = %self.id, "Health check reporting unavailable.");
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
struct HealthService {
    ready: Arc<AtomicBool>,
    path: Arc<str>,
}

impl<H> Service<Request<H>> for HealthService
where
    H: Body + Send + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<H>) -> Self::Future {
        let response = if req.method() != Method::GET || req.uri().path() != &*self.path {
            let mut resp = Response::new(Full::new(Bytes::from_static(b"Not Found")));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            resp
        } else if self.ready.load(Ordering::SeqCst) {
            json_response(StatusCode::OK, AVAILABLE)
        } else {
            json_response(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE)
        };
        Box::pin(futures::future::ok(response))
    }
}

fn json_response(code: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = code;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}
