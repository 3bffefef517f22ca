//! Decoding of the store's JSON envelopes.
//!
//! A 200 body decodes into [`KeyResponse`]. Any other terminal status decodes
//! into the store's error envelope. Bodies that fit neither shape become
//! [`Error::MalformedResponse`], never a store error.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_node: Option<Node>,
}

impl KeyResponse {
    pub fn key(&self) -> Option<&str> {
        self.node.as_ref().map(|node| node.key.as_str())
    }

    pub fn value(&self) -> Option<&str> {
        self.node.as_ref().and_then(|node| node.value.as_deref())
    }

    /// Modified index of the affected node.
    pub fn index(&self) -> Option<u64> {
        self.node.as_ref().and_then(|node| node.modified_index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
}

pub fn decode_success(body: &[u8]) -> Result<KeyResponse> {
    serde_json::from_slice(body).map_err(|source| Error::MalformedResponse {
        status: StatusCode::OK,
        source,
    })
}

/// Classifies a terminal non-200 response.
pub fn decode_failure(status: StatusCode, body: &[u8]) -> Error {
    match serde_json::from_slice::<ApiError>(body) {
        Ok(error) => Error::Api { status, error },
        Err(source) => Error::MalformedResponse { status, source },
    }
}
