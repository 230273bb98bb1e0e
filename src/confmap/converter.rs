// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::warn;

/// Rewrites the merged configuration map in place.
pub trait Converter: Send + Sync {
    fn convert(&self, conf: &mut Value) -> Result<(), ConfigError>;
}

// `$$` escapes a literal dollar, `${NAME}` and `$NAME` reference variables.
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable pattern is valid")
});

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Expands environment variable references in every string value. Unset variables
/// expand to the empty string and are reported with a warning.
#[derive(Clone)]
pub struct ExpandConverter {
    lookup: Lookup,
}

impl Default for ExpandConverter {
    fn default() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }
}

impl ExpandConverter {
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn expand(&self, s: &str) -> String {
        VAR_PATTERN
            .replace_all(s, |caps: &Captures| {
                let name = match caps.get(1).or_else(|| caps.get(2)) {
                    Some(m) => m.as_str(),
                    None => return "$".to_string(),
                };
                match (self.lookup)(name) {
                    Some(v) => v,
                    None => {
                        warn!(variable = name, "Configuration references an unset environment variable, using an empty value.");
                        String::new()
                    }
                }
            })
            .into_owned()
    }

    fn walk(&self, v: &mut Value) {
        match v {
            Value::String(s) => {
                if s.contains('$') {
                    *s = self.expand(s);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|i| self.walk(i)),
            Value::Object(map) => map.values_mut().for_each(|i| self.walk(i)),
            _ => {}
        }
    }
}

impl Converter for ExpandConverter {
    fn convert(&self, conf: &mut Value) -> Result<(), ConfigError> {
        self.walk(conf);
        Ok(())
    }
}
