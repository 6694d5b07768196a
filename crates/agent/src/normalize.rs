//! Repair of model-written Korrel8r queries.
//!
//! Models often drop the class segment (`alert:{...}`), file alerts under the
//! k8s domain, or write selectors as `key="value"`. Each fix below is a plain
//! string rewrite; input that matches none of them comes back unchanged.

use regex_lite::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// First brace-delimited selector body.
static SELECTOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(.*?)\}").unwrap());

/// An unquoted `key="` inside a selector.
static UNQUOTED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b([A-Za-z0-9_.]+)\s*=\s*""#).unwrap());

/// Normalize a correlation query of the form `domain[:class]:{selector}`.
pub fn normalize_query(query: &str) -> String {
    let mut s = query.trim().to_string();
    if s.is_empty() {
        return s;
    }

    // Repeat so multiply-escaped quotes collapse in one call.
    while s.contains("\\\"") {
        s = s.replace("\\\"", "\"");
    }

    if s.starts_with("alert:{") {
        s = s.replacen("alert:{", "alert:alert:{", 1);
    }

    let mut domain = s.split_once(':').map(|(d, _)| d.to_string()).unwrap_or_default();

    if s.to_ascii_lowercase().starts_with("k8s:alert:") {
        let rest = s.splitn(3, ':').nth(2).unwrap_or_default();
        s = format!("alert:alert:{rest}");
        domain = "alert".into();
    }

    let rewritten = SELECTOR.captures(&s).and_then(|caps| {
        let body = caps.get(1)?;
        let replacement = if domain == "alert" { r#""$1":""# } else { r#""$1":=""# };
        let inner = UNQUOTED_KEY.replace_all(body.as_str(), replacement);
        (inner != body.as_str()).then(|| format!("{}{}{}", &s[..body.start()], inner, &s[body.end()..]))
    });
    if let Some(rewritten) = rewritten {
        s = rewritten;
    }

    if s != query {
        debug!(from = %query, to = %s, "Normalized correlation query");
    }
    s
}
