use std::sync::Arc;

use crate::definitions::session_input::{BlacklistConnector, BlacklistError};
use crate::pki::store::TerminalStore;

/// Blacklist connector backed by the shared terminal store, scoped to the
/// sector of one terminal. Built per session by the protocol engine.
pub struct StoreBlacklistConnector {
    store: Arc<dyn TerminalStore>,
    ref_id: String,
    sector_id: Vec<u8>,
}

impl StoreBlacklistConnector {
    pub fn new(store: Arc<dyn TerminalStore>, ref_id: impl Into<String>, sector_id: Vec<u8>) -> Self {
        StoreBlacklistConnector {
            store,
            ref_id: ref_id.into(),
            sector_id,
        }
    }
}

impl BlacklistConnector for StoreBlacklistConnector {
    fn sector_id(&self) -> &[u8] {
        &self.sector_id
    }

    fn contains(&self, specific_id: &[u8]) -> Result<bool, BlacklistError> {
        let permission = self
            .store
            .load(&self.ref_id)
            .map_err(|e| BlacklistError::Store(e.to_string()))?
            .ok_or_else(|| BlacklistError::NotAvailable(self.ref_id.clone()))?;
        let blacklist = permission
            .blacklist
            .ok_or_else(|| BlacklistError::NotAvailable(self.ref_id.clone()))?;
        Ok(blacklist.entries.contains(specific_id))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pki::store::MemoryTerminalStore;

    #[test]
    fn checks_against_the_stored_sector_list() {
        let store = Arc::new(MemoryTerminalStore::new());
        store.create("ref-1").unwrap();
        store
            .store_blacklist("ref-1", vec![0xAA], vec![vec![1, 2, 3]], 7)
            .unwrap();

        let connector = StoreBlacklistConnector::new(store, "ref-1", vec![0xAA]);
        assert!(connector.contains(&[1, 2, 3]).unwrap());
        assert!(!connector.contains(&[4, 5, 6]).unwrap());
    }

    #[test]
    fn missing_blacklist_is_distinguishable() {
        let store = Arc::new(MemoryTerminalStore::new());
        store.create("ref-1").unwrap();
        let connector = StoreBlacklistConnector::new(store, "ref-1", vec![]);
        assert!(matches!(
            connector.contains(&[1]),
            Err(BlacklistError::NotAvailable(_))
        ));
    }
}
