//! Live configuration snapshot
//!
//! Readers take an `Arc` to the current [`SystemConfig`]; a reload swaps the
//! whole snapshot at once so nobody sees a half-applied edit.

use std::sync::{Arc, RwLock};
use sysblock_config::{default_config_text, parse_rules, SystemConfig};
use sysblock_store::{Namespace, Store, StoreError, RAW_CONFIG_KEY};
use tracing::{info, warn};

/// Raw rule text from the store, or the built-in template when none was saved
pub fn read_rule_text(store: &dyn Store) -> Result<String, StoreError> {
    Ok(store
        .get(Namespace::Prefs, RAW_CONFIG_KEY)?
        .unwrap_or_else(|| default_config_text().to_string()))
}

pub struct ConfigCache {
    store: Arc<dyn Store>,
    current: RwLock<Arc<SystemConfig>>,
}

impl ConfigCache {
    /// Build the cache from whatever the store holds now. A failed read
    /// starts from the default snapshot.
    pub fn load(store: Arc<dyn Store>) -> Self {
        let initial = match read_rule_text(store.as_ref()) {
            Ok(text) => parse_rules(&text),
            Err(e) => {
                warn!(error = %e, "Could not read rule text, using defaults");
                SystemConfig::default()
            }
        };
        Self {
            store,
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<SystemConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read and re-parse the rule text. On a read failure the last good
    /// snapshot stays in place and the error is returned.
    pub fn reload(&self) -> Result<Arc<SystemConfig>, StoreError> {
        let text = read_rule_text(self.store.as_ref())?;
        let next = Arc::new(parse_rules(&text));

        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&next),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&next),
        }

        info!(
            rules = next.rules.len(),
            master_switch = next.master_switch,
            prevent_uninstall = next.prevent_uninstall,
            "Configuration reloaded"
        );
        Ok(next)
    }
}
