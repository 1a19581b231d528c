//! Header projection for tracing.

use std::collections::BTreeMap;

use http::HeaderMap;

use crate::config::MaskRules;

/// Flattens `headers` into one `name -> value` map for the trace span.
///
/// Multi-valued headers are joined with `,`. Values of masked headers are
/// replaced by the mask value. Names come out lowercase, sorted.
pub(crate) fn project(headers: &HeaderMap, rules: &MaskRules) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in headers.keys() {
        let value = if rules.masks(name.as_str()) {
            rules.value.clone()
        } else {
            headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .collect::<Vec<_>>()
                .join(",")
        };
        out.insert(name.as_str().to_owned(), value);
    }
    out
}
