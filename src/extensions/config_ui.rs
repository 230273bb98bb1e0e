// SPDX-License-Identifier: Apache-2.0

use crate::component::{
    Component, ComponentId, CreateSettings, Extension, ExtensionFactory, Factory, Host, Kind,
};
use crate::listener::ServerTask;
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Service};
use tracing::error;

pub const TYPE: &str = "config_ui";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigUiConfig {
    pub endpoint: SocketAddr,
}

impl Default for ConfigUiConfig {
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::from(([127, 0, 0, 1], 55679)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigUiFactory;

impl Factory for ConfigUiFactory {
    fn type_name(&self) -> &str {
        TYPE
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(ConfigUiConfig::default()).unwrap_or_default()
    }

    fn validate_config(&self, config: &Value) -> Result<(), BoxError> {
        serde_json::from_value::<ConfigUiConfig>(config.clone())?;
        Ok(())
    }
}

impl ExtensionFactory for ConfigUiFactory {
    fn create_extension(
        &self,
        settings: CreateSettings,
        config: &Value,
    ) -> Result<Option<Arc<dyn Extension>>, BoxError> {
        let config: ConfigUiConfig = serde_json::from_value(config.clone())?;
        Ok(Some(Arc::new(ConfigUi {
            id: settings.id,
            config,
            server: ServerTask::new(),
        })))
    }
}

/// Serves the active configuration on `GET /config` and the registered component
/// types on `GET /factories`, both as JSON.
pub struct ConfigUi {
    id: ComponentId,
    config: ConfigUiConfig,
    server: ServerTask,
}

impl ConfigUi {
    pub fn bound_address(&self) -> Option<SocketAddr> {
        self.server.bound_address()
    }
}

#[async_trait]
impl Component for ConfigUi {
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), BoxError> {
        let svc = ConfigUiService { host: host.clone() };
        self.server
            .start(&self.id, self.config.endpoint, svc, host)
            .await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.server.stop().await
    }
}

impl Extension for ConfigUi {}

#[derive(Clone)]
struct ConfigUiService {
    host: Arc<dyn Host>,
}

impl ConfigUiService {
    fn factories(&self) -> BTreeMap<Kind, Vec<String>> {
        Kind::ALL
            .iter()
            .map(|kind| (*kind, self.host.get_factories(*kind).into_keys().collect()))
            .collect()
    }
}

impl<H> Service<Request<H>> for ConfigUiService
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
        let body = match (req.method(), req.uri().path()) {
            (&Method::GET, "/config") => serde_json::to_vec(&*self.host.get_config()),
            (&Method::GET, "/factories") => serde_json::to_vec(&self.factories()),
            // Return 404 Not Found for other routes
            _ => {
                let mut resp = Response::new(Full::new(Bytes::from_static(b"Not Found")));
                *resp.status_mut() = StatusCode::NOT_FOUND;
                return Box::pin(futures::future::ok(resp));
            }
        };

        let resp = match body {
            Ok(body) => {
                let mut resp = Response::new(Full::new(Bytes::from(body)));
                resp.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                resp
            }
            Err(e) => {
                error!(error = %e, "Failed to encode response.");
                let mut resp = Response::new(Full::new(Bytes::default()));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                resp
            }
        };
        Box::pin(futures::future::ok(resp))
    }
}
