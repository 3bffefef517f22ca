//! Client configuration.

use std::time::Duration;

pub const DEFAULT_MACHINE: &str = "http://127.0.0.1:4001";

/// Pause between attempts after a network failure.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

pub const DEFAULT_MAX_REDIRECTS: usize = 16;

pub const DEFAULT_API_VERSION: &str = "v2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Member endpoints in preference order.
    pub machines: Vec<String>,
    pub backoff: Duration,
    /// Redirect hops allowed per call. Redirects never touch the retry budget.
    pub max_redirects: usize,
    /// Upper bound for a whole call, across every attempt and backoff.
    pub deadline: Option<Duration>,
    pub api_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            machines: vec![DEFAULT_MACHINE.to_string()],
            backoff: DEFAULT_BACKOFF,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            deadline: None,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new<I, S>(machines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            machines: machines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }
}
