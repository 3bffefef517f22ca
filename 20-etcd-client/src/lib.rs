//! Failover client for an etcd-style key-value cluster speaking the v2 REST
//! API.
//!
//! Each module covers one responsibility:
//!
//! - [`cluster`] holds the configured members and the current leader hint.
//! - [`options`] validates typed query options against per-operation
//!   allow-lists.
//! - [`request`] turns a key operation into a method, path and form body.
//! - [`transport`] is the HTTP seam, with a reqwest implementation.
//! - [`dispatch`] runs the retry/redirect loop against the cluster.
//! - [`response`] decodes the store's success and error envelopes.
//! - [`client`] is the public key-space API built on the pieces above.
//! - [`cli`] describes the `etcd-keys` command line.

pub mod cli;
pub mod client;
pub mod cluster;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod options;
pub mod request;
pub mod response;
pub mod transport;

pub use client::Client;
pub use cluster::Cluster;
pub use config::ClientConfig;
pub use error::{ApiError, Error, Result};
pub use options::{OptionValue, Options};
pub use response::{KeyResponse, Node};
