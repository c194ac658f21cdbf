// ABOUTME: BridgeFactory - creates, caches, and tears down API bridges.
// ABOUTME: One live bridge per switch identity; close_all aggregates failures.

use crate::backend::{self, SessionError};
use crate::bridge::ApiBridge;
use crate::config::SwitchDescriptor;
use crate::error::{BridgeError, Result};
use crate::ports::PortMap;
use crate::types::SwitchName;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Creates and caches one [`ApiBridge`] per switch identity.
///
/// Bridges own live connections, so repeated `get` calls for the same switch
/// return the same instance, and callers must eventually release them through
/// [`BridgeFactory::close`] or [`BridgeFactory::close_all`]. The cache is a
/// plain value the caller owns; there is no ambient global state.
///
/// The whole get-or-create sequence runs under one async mutex, so two
/// concurrent `get` calls for the same identity can never race a second
/// session into existence.
pub struct BridgeFactory {
    cache: Mutex<HashMap<SwitchName, Arc<ApiBridge>>>,
}

impl BridgeFactory {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the bridge for the given switch, creating and caching it if
    /// necessary. A connect failure leaves the cache untouched, so the next
    /// `get` for that identity retries from scratch.
    pub async fn get(&self, switch: &SwitchDescriptor) -> Result<Arc<ApiBridge>> {
        let mut cache = self.cache.lock().await;
        if let Some(bridge) = cache.get(&switch.name) {
            tracing::debug!("{}: reusing cached bridge", switch.name);
            return Ok(bridge.clone());
        }

        let session = backend::open_session(&switch.name, &switch.api);
        session.connect().await.map_err(|e| BridgeError::Session {
            switch: switch.name.to_string(),
            source: e,
        })?;

        let ports = PortMap::new(switch.api.interface_to_port());
        let bridge = Arc::new(ApiBridge::new(switch.name.clone(), session, ports));
        cache.insert(switch.name.clone(), bridge.clone());
        Ok(bridge)
    }

    /// Like [`BridgeFactory::get`], but for a caller-supplied backend session
    /// (a custom [`crate::BackendSession`] implementation). Connects the
    /// session, wraps and caches it under `name`; returns the already-cached
    /// bridge if that identity is live.
    pub async fn adopt(
        &self,
        name: SwitchName,
        session: Box<dyn backend::BackendSession>,
        ports: PortMap,
    ) -> Result<Arc<ApiBridge>> {
        let mut cache = self.cache.lock().await;
        if let Some(bridge) = cache.get(&name) {
            return Ok(bridge.clone());
        }

        session.connect().await.map_err(|e| BridgeError::Session {
            switch: name.to_string(),
            source: e,
        })?;

        let bridge = Arc::new(ApiBridge::new(name.clone(), session, ports));
        cache.insert(name, bridge.clone());
        Ok(bridge)
    }

    /// Closes and evicts one cached bridge. No-op when the switch is not
    /// cached, so calling it twice is fine.
    pub async fn close(&self, name: &str) -> Result<()> {
        let bridge = self.cache.lock().await.remove(name);
        match bridge {
            None => Ok(()),
            Some(bridge) => {
                tracing::debug!("{}: closing and evicting bridge", name);
                bridge
                    .close_session()
                    .await
                    .map_err(|e| BridgeError::Session {
                        switch: name.to_string(),
                        source: e,
                    })
            }
        }
    }

    /// Closes and evicts every cached bridge. Every close is attempted even
    /// when some fail; failures are then reported together, so no connection
    /// leaks behind an earlier error.
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<(SwitchName, Arc<ApiBridge>)> =
            self.cache.lock().await.drain().collect();
        if drained.is_empty() {
            return Ok(());
        }

        let attempted = drained.len();
        tracing::debug!("closing {} cached bridge(s)", attempted);
        let closes = drained.into_iter().map(|(name, bridge)| async move {
            let result = bridge.close_session().await;
            (name, result)
        });
        let failures: Vec<(String, SessionError)> = futures::future::join_all(closes)
            .await
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name.to_string(), e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::CloseAll {
                attempted,
                failures,
            })
        }
    }

    /// Number of live cached bridges.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

impl Default for BridgeFactory {
    fn default() -> Self {
        Self::new()
    }
}
