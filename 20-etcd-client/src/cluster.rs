//! Cluster view: the configured members plus the current leader hint.
//!
//! The member list is fixed at construction. Only the leader hint moves,
//! either by deterministic rotation after a failure or by adopting the target
//! of a redirect. Concurrent calls share the hint; last writer wins.

use std::sync::{PoisonError, RwLock};

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Cluster {
    machines: Vec<String>,
    leader: RwLock<String>,
}

impl Cluster {
    /// Builds a view over `machines`, keeping configured order.
    ///
    /// Each entry must be an absolute http(s) URL. Trailing slashes are
    /// stripped and duplicates dropped (first occurrence wins). The first
    /// machine starts out as the leader hint.
    pub fn new<I, S>(machines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for machine in machines {
            let machine = normalize_endpoint(machine.as_ref())?;
            if !unique.contains(&machine) {
                unique.push(machine);
            }
        }

        let first = unique.first().cloned().ok_or(Error::NoMachines)?;
        Ok(Self {
            machines: unique,
            leader: RwLock::new(first),
        })
    }

    pub fn machines(&self) -> &[String] {
        &self.machines
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Current leader hint.
    pub fn leader(&self) -> String {
        self.leader
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Member a given retry count maps to: `machines[retry % len]`.
    pub fn machine_for_retry(&self, retry: usize) -> &str {
        &self.machines[retry % self.machines.len()]
    }

    /// Moves the leader hint to `machines[retry % len]` and returns it.
    pub fn rotate(&self, retry: usize) -> String {
        let next = self.machine_for_retry(retry).to_string();
        let mut leader = self.leader.write().unwrap_or_else(PoisonError::into_inner);
        debug!(from = %leader.as_str(), to = %next, retry, "update leader");
        *leader = next.clone();
        next
    }

    /// Points the leader hint at the origin of a redirect target.
    ///
    /// The target does not have to be a configured member: the cluster is
    /// authoritative about who leads.
    pub fn adopt_leader_hint(&self, location: &Url) -> String {
        let origin = location.origin().ascii_serialization();
        let mut leader = self.leader.write().unwrap_or_else(PoisonError::into_inner);
        debug!(from = %leader.as_str(), to = %origin, "adopt leader hint");
        *leader = origin.clone();
        origin
    }
}

fn normalize_endpoint(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: &str| Error::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(trimmed.to_string())
}
