//! Builds the concrete request for one key operation.
//!
//! A [`KeyRequest`] carries the method, the logical path (relative to the
//! member's API root, e.g. `keys/foo?recursive=true`) and an optional
//! form-encoded body. It is built fresh for every call and never mutated.

use std::fmt;
use std::time::Duration;

use reqwest::Method;
use url::form_urlencoded;

use crate::error::Result;
use crate::options::{Options, DELETE_OPTIONS, GET_OPTIONS, POST_OPTIONS, PUT_OPTIONS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    method: Method,
    path: String,
    body: Option<String>,
}

impl KeyRequest {
    pub fn get(key: &str, options: &Options) -> Result<Self> {
        let query = options.to_query(&GET_OPTIONS)?;
        Ok(Self::new(Method::GET, key_path(key) + &query, None))
    }

    pub fn put(key: &str, value: &str, ttl: Option<Duration>, options: &Options) -> Result<Self> {
        let query = options.to_query(&PUT_OPTIONS)?;
        Ok(Self::new(
            Method::PUT,
            key_path(key) + &query,
            form_body(value, ttl),
        ))
    }

    pub fn post(key: &str, value: &str, ttl: Option<Duration>) -> Result<Self> {
        let query = Options::new().to_query(&POST_OPTIONS)?;
        Ok(Self::new(
            Method::POST,
            key_path(key) + &query,
            form_body(value, ttl),
        ))
    }

    pub fn delete(key: &str, options: &Options) -> Result<Self> {
        let query = options.to_query(&DELETE_OPTIONS)?;
        Ok(Self::new(Method::DELETE, key_path(key) + &query, None))
    }

    /// Request against an arbitrary path, bypassing the key allow-lists.
    ///
    /// An absolute `http(s)://` path is sent verbatim.
    pub fn raw(method: Method, path: impl Into<String>, body: Option<String>) -> Self {
        Self::new(method, path.into(), body)
    }

    fn new(method: Method, path: String, body: Option<String>) -> Self {
        Self { method, path, body }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl fmt::Display for KeyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// `keys/<key>` with the key cleaned the way a slash-separated path join
/// would: empty and `.` segments dropped, `..` pops a segment. Each segment
/// is percent-encoded, so `?`, `#` and `%` stay part of the key.
pub fn key_path(key: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut path = String::from("keys");
    for segment in segments {
        path.push('/');
        path.push_str(&encode_segment(segment));
    }
    path
}

/// Percent-encodes one path segment. The form encoder writes a space as `+`
/// and a literal `+` as `%2B`, so every `+` it emits is a space.
fn encode_segment(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes())
        .flat_map(|chunk| chunk.split_inclusive('+'))
        .map(|piece| match piece.strip_suffix('+') {
            Some(rest) => format!("{rest}%20"),
            None => piece.to_string(),
        })
        .collect()
}

/// Form body with `value` (when non-empty) and `ttl` in seconds (when > 0).
fn form_body(value: &str, ttl: Option<Duration>) -> Option<String> {
    let mut form = form_urlencoded::Serializer::new(String::new());
    let mut has_fields = false;

    if !value.is_empty() {
        form.append_pair("value", value);
        has_fields = true;
    }

    if let Some(ttl) = ttl.map(|ttl| ttl.as_secs()).filter(|secs| *secs > 0) {
        form.append_pair("ttl", &ttl.to_string());
        has_fields = true;
    }

    has_fields.then(|| form.finish())
}
