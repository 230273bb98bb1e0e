// SPDX-License-Identifier: Apache-2.0

//! Configuration map assembly: providers fetch documents by URI scheme, the resolver
//! merges them in order and runs converters over the result.

pub mod converter;
pub mod provider;
pub mod resolver;

pub use converter::{Converter, ExpandConverter};
pub use provider::{Provider, Retrieved, WatchGuard};
pub use resolver::{Resolver, ResolverSettings};

use crate::bounded_channel::{BoundedReceiver, BoundedSender, TrySendError, bounded};
use crate::config::ConfigError;
use figment::Figment;
use figment::providers::{Format, Yaml};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One notification from a config source: `Ok` when a source changed, `Err` when
/// watching it failed.
pub type WatchEvent = Result<(), ConfigError>;

/// Handed to providers so they can signal that a source changed.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: BoundedSender<WatchEvent>,
}

impl ChangeNotifier {
    pub fn changed(&self) {
        match self.tx.try_send(Ok(())) {
            Ok(()) => {}
            // A reload is already queued and will pick up this change too
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                debug!("Config source changed after the watch was closed.")
            }
        }
    }

    pub fn failed(&self, err: ConfigError) {
        if let Err(e) = self.tx.try_send(Err(err)) {
            warn!(error = %e, "Dropping config watch error.");
        }
    }
}

/// Receiving side of the change notifications.
pub struct ConfigWatch {
    rx: BoundedReceiver<WatchEvent>,
}

impl ConfigWatch {
    /// Waits for the next event. Returns None once every notifier has been dropped.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.next().await
    }
}

pub fn watch_channel() -> (ChangeNotifier, ConfigWatch) {
    let (tx, rx) = bounded(1);
    (ChangeNotifier { tx }, ConfigWatch { rx })
}

/// Deep merge of `overlay` into `base`. Maps merge key by key; any other value in the
/// overlay replaces the base value, except null, which leaves an existing value alone.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (k, v) in overlay {
                match base.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base.insert(k, v);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

/// Parses a YAML document into a configuration map. An empty document is an empty map.
pub fn parse_yaml(uri: &str, text: &str) -> Result<Value, ConfigError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    Figment::from(Yaml::string(text))
        .extract::<Value>()
        .map_err(|e| ConfigError::Parse {
            uri: uri.to_string(),
            source: Box::new(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_nested_maps() {
        let mut base = json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
        merge(
            &mut base,
            json!({"a": {"c": [3], "e": true}, "d": null, "f": 2}),
        );
        assert_eq!(
            json!({"a": {"b": 1, "c": [3], "e": true}, "d": "x", "f": 2}),
            base
        );
    }

    #[test]
    fn merge_replaces_scalars_with_maps() {
        let mut base = json!({"a": 1});
        merge(&mut base, json!({"a": {"b": 2}}));
        assert_eq!(json!({"a": {"b": 2}}), base);
    }

    #[test]
    fn parse_yaml_documents() {
        let v = parse_yaml(
            "test",
            "receivers:\n  http:\n    endpoint: 0.0.0.0:4318\n  http/2:\nservice:\n  extensions: [a, b]\n",
        )
        .unwrap();
        assert_eq!("0.0.0.0:4318", v["receivers"]["http"]["endpoint"]);
        assert!(v["receivers"]["http/2"].is_null());
        assert_eq!(json!(["a", "b"]), v["service"]["extensions"]);

        assert_eq!(json!({}), parse_yaml("empty", "  \n").unwrap());

        let err = parse_yaml("bad", "receivers: [unclosed").unwrap_err();
        assert!(err.to_string().contains("\"bad\""));
    }

    #[tokio::test]
    async fn notifier_coalesces_changes() {
        let (notifier, mut watch) = watch_channel();
        notifier.changed();
        notifier.changed();
        notifier.changed();

        assert!(matches!(watch.next().await, Some(Ok(()))));

        notifier.failed(ConfigError::Watch("gone".to_string()));
        match watch.next().await {
            Some(Err(e)) => assert_eq!("cannot watch the configuration: gone", e.to_string()),
            _ => panic!("expected a watch error"),
        }

        drop(notifier);
        assert!(watch.next().await.is_none());
    }
}
