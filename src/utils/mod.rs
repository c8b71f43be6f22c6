//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

/// Resolve a request target against the API base URL
///
/// Absolute `http://` and `https://` targets are returned unchanged.
pub fn resolve_url(base: &str, target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }

    let base = base.trim_end_matches('/');
    if target.starts_with('/') {
        format!("{base}{target}")
    } else {
        format!("{base}/{target}")
    }
}

/// Extract the leading `name=value` pair from a `Set-Cookie` header value
///
/// Attributes such as `Path` or `HttpOnly` are dropped. Returns `None` for an
/// empty pair.
pub fn cookie_pair(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    if pair.is_empty() || !pair.contains('=') {
        None
    } else {
        Some(pair.to_string())
    }
}

/// Replace (or append) one cookie pair inside a `Cookie` header value
///
/// Other cookies carried by `original` are kept in their original order.
pub fn merge_cookie(original: Option<&str>, fresh: &str) -> String {
    let Some(original) = original.filter(|o| !o.trim().is_empty()) else {
        return fresh.to_string();
    };
    let name = fresh.split('=').next().unwrap_or_default().trim();

    let mut replaced = false;
    let mut pairs: Vec<String> = original
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            if pair.split('=').next().map(str::trim) == Some(name) {
                replaced = true;
                fresh.to_string()
            } else {
                pair.to_string()
            }
        })
        .collect();

    if !replaced {
        pairs.push(fresh.to_string());
    }
    pairs.join("; ")
}
