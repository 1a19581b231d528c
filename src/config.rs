//! Configuration lookups.
//!
//! The wrapper reads two values per request through the [`Lookup`] trait,
//! so a source that reloads in the background takes effect on the next
//! request without restarting anything:
//!
//! | Key | Type | Default |
//! |---|---|---|
//! | `proxy.header_mask_value` | string | `"omitted"` |
//! | `proxy.mask_header_keys` | list of strings | empty |
//!
//! [`Settings`] is a static source loadable from TOML:
//!
//! ```toml
//! [proxy]
//! header_mask_value = "***"
//! mask_header_keys = ["Authorization", "Cookie"]
//! ```

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::Error;

/// Replacement value for masked header values.
pub const HEADER_MASK_VALUE: &str = "proxy.header_mask_value";

/// Header names whose values are masked before tracing.
pub const MASK_HEADER_KEYS: &str = "proxy.mask_header_keys";

pub(crate) const DEFAULT_MASK_VALUE: &str = "omitted";

/// String-keyed configuration source.
pub trait Lookup: Send + Sync + 'static {
    fn string(&self, key: &str) -> Option<String>;

    fn string_list(&self, key: &str) -> Vec<String>;
}

/// Static settings, usually loaded once at startup.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub proxy: ProxySettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxySettings {
    pub header_mask_value: String,
    pub mask_header_keys: Vec<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            header_mask_value: DEFAULT_MASK_VALUE.to_owned(),
            mask_header_keys: Vec::new(),
        }
    }
}

impl Settings {
    /// Parses settings from a TOML document. Missing keys take defaults.
    pub fn from_toml(src: &str) -> Result<Self, Error> {
        Ok(toml::from_str(src)?)
    }

    /// Reads and parses a TOML settings file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }
}

impl Lookup for Settings {
    fn string(&self, key: &str) -> Option<String> {
        (key == HEADER_MASK_VALUE).then(|| self.proxy.header_mask_value.clone())
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        if key == MASK_HEADER_KEYS {
            self.proxy.mask_header_keys.clone()
        } else {
            Vec::new()
        }
    }
}

/// Dotted-path lookup into a parsed TOML document (`proxy.mask_header_keys`
/// reads `[proxy] mask_header_keys`).
impl Lookup for toml::Table {
    fn string(&self, key: &str) -> Option<String> {
        toml_get(self, key)?.as_str().map(str::to_owned)
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        match toml_get(self, key) {
            Some(toml::Value::Array(items)) => {
                items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect()
            }
            Some(toml::Value::String(s)) => split_list(s),
            _ => Vec::new(),
        }
    }
}

fn toml_get<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.');
    let mut value = table.get(parts.next()?)?;
    for part in parts {
        value = value.as_table()?.get(part)?;
    }
    Some(value)
}

/// Flat key/value map; list values are comma separated.
impl Lookup for HashMap<String, String> {
    fn string(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(|s| split_list(s)).unwrap_or_default()
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// The masking rules in effect for one request.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MaskRules {
    pub(crate) value: String,
    pub(crate) keys: Vec<String>,
}

impl MaskRules {
    pub(crate) fn from_lookup(config: &dyn Lookup) -> Self {
        Self {
            value: config
                .string(HEADER_MASK_VALUE)
                .unwrap_or_else(|| DEFAULT_MASK_VALUE.to_owned()),
            keys: config.string_list(MASK_HEADER_KEYS),
        }
    }

    pub(crate) fn masks(&self, header: &str) -> bool {
        self.keys.iter().any(|k| k.eq_ignore_ascii_case(header))
    }
}
