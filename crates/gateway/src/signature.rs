//! # Request Signature
//!
//! Key kanonik untuk satu request logis ke upstream.
//!
//! Signature dipakai oleh `ResponseCache` dan `InflightRegistry`: dua call
//! dengan signature yang sama dianggap request yang sama.
//!
//! ## Format
//!
//! ```text
//! <METHOD> <endpoint> <body-json>
//! ```
//!
//! Body diserialisasi secara kanonik (object key diurutkan rekursif), sehingga
//! urutan field dari caller tidak mengubah signature.

use std::fmt;

use serde_json::Value;

/// HTTP method yang dipakai gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Nama method uppercase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// Canonical request key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature(String);

impl RequestSignature {
    /// Derive signature dari `(method, endpoint, body)`.
    pub fn derive(method: Method, endpoint: &str, body: Option<&Value>) -> Self {
        let mut canonical = String::new();
        if let Some(v) = body {
            write_canonical(v, &mut canonical);
        }
        Self(format!("{} {} {}", method, endpoint, canonical))
    }

    /// Signature dari cache key eksplisit (override).
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Resolve: override menang, selain itu derive.
    pub fn resolve(
        cache_key: Option<&str>,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Self {
        match cache_key {
            Some(key) => Self::from_key(key),
            None => Self::derive(method, endpoint, body),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize JSON value dengan key object terurut.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
