//! Per-host session gate registry.
//!
//! Gates are created lazily on the first request for a host and reused for
//! the host's lifetime. Creation is single-flight: two simultaneous first
//! requests for the same host share one initialisation instead of racing to
//! create duplicate state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use super::SessionGate;

type GateFactory = Box<dyn Fn(&str) -> Arc<dyn SessionGate> + Send + Sync>;

pub struct SessionRegistry {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<dyn SessionGate>>>>>,
    factory: GateFactory,
}

impl SessionRegistry {
    /// `factory` builds the gate for a normalized host on first use.
    pub fn new(factory: impl Fn(&str) -> Arc<dyn SessionGate> + Send + Sync + 'static) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Gate for `host` (normalized, port already stripped), created on miss.
    pub async fn get(&self, host: &str) -> Arc<dyn SessionGate> {
        let cell = {
            let mut entries = self.entries.lock().expect("session registry poisoned");
            Arc::clone(entries.entry(host.to_string()).or_default())
        };

        // The map lock is released before initialisation; concurrent first
        // requests for the same host coalesce on the cell.
        cell.get_or_init(|| async { (self.factory)(host) })
            .await
            .clone()
    }
}
