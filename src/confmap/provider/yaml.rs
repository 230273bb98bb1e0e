// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::confmap::provider::{Provider, Retrieved, split_scheme};
use crate::confmap::{ChangeNotifier, merge, parse_yaml};
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const SCHEME: &str = "yaml";

const KEY_DELIMITER: &str = "::";

/// Inline YAML given on the command line. Keys may use `::` to address nested
/// settings, so `yaml:exporters::debug::verbosity: detailed` sets a single value.
pub struct YamlProvider;

#[async_trait]
impl Provider for YamlProvider {
    fn scheme(&self) -> &str {
        SCHEME
    }

    async fn retrieve(
        &self,
        uri: &str,
        _notifier: Option<ChangeNotifier>,
    ) -> Result<Retrieved, ConfigError> {
        let (_, body) = split_scheme(uri);
        let conf = parse_yaml(uri, body)?;
        Ok(Retrieved::new(expand_key_paths(conf)))
    }
}

fn expand_key_paths(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Value::Object(Map::new());
            for (key, v) in map {
                let mut nested = expand_key_paths(v);
                for part in key.split(KEY_DELIMITER).collect::<Vec<_>>().into_iter().rev() {
                    let mut m = Map::new();
                    m.insert(part.to_string(), nested);
                    nested = Value::Object(m);
                }
                merge(&mut out, nested);
            }
            out
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn nested_key_paths() {
        let r = YamlProvider
            .retrieve("yaml:processors::batch::timeout_millis: 500", None)
            .await
            .unwrap();
        assert_eq!(json!({"processors": {"batch": {"timeout_millis": 500}}}), *r.conf());
    }

    #[test]
    fn sibling_paths_merge() {
        let v = expand_key_paths(json!({"a::b": 1, "a::c": {"d::e": 2}}));
        assert_eq!(json!({"a": {"b": 1, "c": {"d": {"e": 2}}}}), v);
    }

    #[tokio::test]
    async fn plain_documents() {
        let r = YamlProvider
            .retrieve("yaml:{service: {extensions: [health_check]}}", None)
            .await
            .unwrap();
        assert_eq!(json!(["health_check"]), r.conf()["service"]["extensions"]);
    }
}
