// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::confmap::provider::{Provider, Retrieved};
use crate::confmap::{ChangeNotifier, parse_yaml};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tower::BoxError;

pub const SCHEME: &str = "http";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a YAML document with a plain HTTP GET.
pub struct HttpProvider {
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HttpProvider {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build::<_, Empty<Bytes>>(HttpConnector::new());
        Self { client }
    }

    async fn fetch(&self, uri: &str) -> Result<String, BoxError> {
        let uri: Uri = uri.parse()?;
        let resp = tokio::time::timeout(REQUEST_TIMEOUT, self.client.get(uri))
            .await
            .map_err(|_| "timed out waiting for response")??;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("unexpected response status {}", status).into());
        }

        let body = resp.into_body().collect().await?.to_bytes();
        Ok(String::from_utf8(body.to_vec())?)
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn scheme(&self) -> &str {
        SCHEME
    }

    async fn retrieve(
        &self,
        uri: &str,
        _notifier: Option<ChangeNotifier>,
    ) -> Result<Retrieved, ConfigError> {
        let text = self.fetch(uri).await.map_err(|e| ConfigError::Retrieve {
            uri: uri.to_string(),
            source: e,
        })?;
        Ok(Retrieved::new(parse_yaml(uri, &text)?))
    }
}
