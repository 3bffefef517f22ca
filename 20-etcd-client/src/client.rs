//! Public key-space API.
//!
//! [`Client`] turns key operations into [`KeyRequest`]s and hands them to the
//! dispatcher. Option validation happens here, before any network activity.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cluster::Cluster;
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::request::KeyRequest;
use crate::response::KeyResponse;
use crate::transport::{HttpTransport, Transport};

/// Client for a cluster of store members.
///
/// Cheap to share behind an `Arc`: concurrent calls only contend on the
/// leader hint.
pub struct Client<T = HttpTransport> {
    dispatcher: Dispatcher<T>,
}

impl Client<HttpTransport> {
    /// Client over `machines` with default settings.
    pub fn new<I, S>(machines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_config(ClientConfig::new(machines))
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new().map_err(Error::Transport)?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let cluster = Arc::new(Cluster::new(&config.machines)?);
        Ok(Self {
            dispatcher: Dispatcher::new(cluster, transport, &config),
        })
    }

    pub fn cluster(&self) -> &Cluster {
        self.dispatcher.cluster()
    }

    pub fn transport(&self) -> &T {
        self.dispatcher.transport()
    }

    /// Reads `key`, optionally sorted and recursive.
    pub async fn get(&self, key: &str, sort: bool, recursive: bool) -> Result<KeyResponse> {
        let mut options = Options::new();
        if sort {
            options.insert("sorted", true);
        }
        if recursive {
            options.insert("recursive", true);
        }
        self.get_with(key, &options).await
    }

    pub async fn get_with(&self, key: &str, options: &Options) -> Result<KeyResponse> {
        debug!(key, leader = %self.cluster().leader(), "get");
        let request = KeyRequest::get(key, options)?;
        self.dispatcher.dispatch(&request).await
    }

    /// Sets `key` unconditionally.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<KeyResponse> {
        self.put_with(key, value, ttl, &Options::new()).await
    }

    /// Sets `key` only if it does not exist yet.
    pub async fn create(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<KeyResponse> {
        let options = Options::new().with("prevExist", false);
        self.put_with(key, value, ttl, &options).await
    }

    /// Sets `key` only if it already exists.
    pub async fn update(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<KeyResponse> {
        let options = Options::new().with("prevExist", true);
        self.put_with(key, value, ttl, &options).await
    }

    /// Sets `key` if its current value and/or index match.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        prev_value: Option<&str>,
        prev_index: Option<u64>,
    ) -> Result<KeyResponse> {
        if prev_value.is_none() && prev_index.is_none() {
            return Err(Error::InvalidRequest(
                "compare and swap needs a previous value or index".to_string(),
            ));
        }

        let mut options = Options::new();
        if let Some(prev_value) = prev_value {
            options.insert("prevValue", prev_value);
        }
        if let Some(prev_index) = prev_index {
            options.insert("prevIndex", prev_index);
        }
        self.put_with(key, value, ttl, &options).await
    }

    pub async fn put_with(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        options: &Options,
    ) -> Result<KeyResponse> {
        debug!(key, value, ttl = ?ttl, leader = %self.cluster().leader(), "put");
        let request = KeyRequest::put(key, value, ttl, options)?;
        self.dispatcher.dispatch(&request).await
    }

    /// Appends an in-order key under `dir` (POST).
    pub async fn create_in_order(
        &self,
        dir: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<KeyResponse> {
        debug!(dir, value, ttl = ?ttl, leader = %self.cluster().leader(), "post");
        let request = KeyRequest::post(dir, value, ttl)?;
        self.dispatcher.dispatch(&request).await
    }

    pub async fn delete(&self, key: &str, recursive: bool) -> Result<KeyResponse> {
        let mut options = Options::new();
        if recursive {
            options.insert("recursive", true);
        }
        self.delete_with(key, &options).await
    }

    pub async fn delete_with(&self, key: &str, options: &Options) -> Result<KeyResponse> {
        debug!(key, leader = %self.cluster().leader(), "delete");
        let request = KeyRequest::delete(key, options)?;
        self.dispatcher.dispatch(&request).await
    }

    /// Long-polls for the next change at or under `prefix`.
    ///
    /// With `wait_index`, returns the first change at or after that index.
    pub async fn watch(
        &self,
        prefix: &str,
        wait_index: Option<u64>,
        recursive: bool,
    ) -> Result<KeyResponse> {
        let mut options = Options::new().with("wait", true);
        if let Some(wait_index) = wait_index {
            options.insert("waitIndex", wait_index);
        }
        if recursive {
            options.insert("recursive", true);
        }
        self.get_with(prefix, &options).await
    }

    /// Sends a prebuilt request through the failover loop.
    pub async fn send(&self, request: &KeyRequest) -> Result<KeyResponse> {
        self.dispatcher.dispatch(request).await
    }
}
