//! Per-host request throttling.
//!
//! Caps in-flight requests per upstream host and, after a 429, holds every
//! request to that host until the cooldown expires. Concurrent per-post
//! workers share one throttle, so a rate-limit hit by one worker suppresses
//! the others too.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ArchiverError, Result};

#[derive(Debug)]
struct HostState {
    semaphore: Arc<Semaphore>,
    cooldown_until: RwLock<Option<Instant>>,
}

#[derive(Debug)]
pub struct HostThrottle {
    per_host_limit: usize,
    hosts: RwLock<HashMap<String, Arc<HostState>>>,
}

impl HostThrottle {
    /// Create a throttle allowing `per_host_limit` concurrent requests per host.
    #[must_use]
    pub fn new(per_host_limit: usize) -> Self {
        Self {
            per_host_limit: per_host_limit.max(1),
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Wait out any cooldown on `host`, then acquire a request slot.
    ///
    /// # Errors
    ///
    /// Fails only if the host's semaphore has been closed.
    pub async fn acquire(&self, host: &str) -> Result<HostPermit> {
        let state = self.get_or_create(host).await;

        loop {
            let until = *state.cooldown_until.read().await;
            match until {
                Some(deadline) if deadline > Instant::now() => {
                    debug!(host = %host, wait_ms = (deadline - Instant::now()).as_millis() as u64, "Host cooling down");
                    tokio::time::sleep_until(deadline).await;
                }
                _ => break,
            }
        }

        let permit = Arc::clone(&state.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ArchiverError::network(format!("request slots for {host} closed")))?;

        Ok(HostPermit {
            host: host.to_string(),
            _permit: permit,
        })
    }

    /// Hold all requests to `host` for `duration`. An existing later deadline
    /// is kept.
    pub async fn cool_down(&self, host: &str, duration: Duration) {
        let state = self.get_or_create(host).await;
        let deadline = Instant::now() + duration;
        let mut guard = state.cooldown_until.write().await;
        if guard.is_none_or(|current| current < deadline) {
            *guard = Some(deadline);
        }
    }

    /// Whether `host` is currently cooling down.
    pub async fn is_cooling_down(&self, host: &str) -> bool {
        let hosts = self.hosts.read().await;
        match hosts.get(host) {
            Some(state) => state
                .cooldown_until
                .read()
                .await
                .is_some_and(|deadline| deadline > Instant::now()),
            None => false,
        }
    }

    async fn get_or_create(&self, host: &str) -> Arc<HostState> {
        {
            let read_guard = self.hosts.read().await;
            if let Some(state) = read_guard.get(host) {
                return Arc::clone(state);
            }
        }

        let mut write_guard = self.hosts.write().await;
        if let Some(state) = write_guard.get(host) {
            return Arc::clone(state);
        }

        let state = Arc::new(HostState {
            semaphore: Arc::new(Semaphore::new(self.per_host_limit)),
            cooldown_until: RwLock::new(None),
        });
        write_guard.insert(host.to_string(), Arc::clone(&state));
        state
    }
}

impl Default for HostThrottle {
    fn default() -> Self {
        Self::new(1)
    }
}

/// A request slot for one host. Released on drop.
#[derive(Debug)]
pub struct HostPermit {
    host: String,
    _permit: OwnedSemaphorePermit,
}

impl HostPermit {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}
