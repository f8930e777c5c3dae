//! Persistence interface for terminal permission data.
//!
//! All middleware instances of a deployment share one store; the renewal
//! lease operations below are what makes scheduled PKI work safe to run on
//! every instance at once.

use std::collections::HashMap;
use std::sync::Mutex;

use time::{Duration, OffsetDateTime};

use crate::definitions::{
    CvcChain, PendingCertRequest, RenewalLease, RenewalTask, TerminalData, TerminalPermission,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a terminal permission entry for {0} already exists")]
    AlreadyExists(String),
    #[error("no terminal permission entry for {0}")]
    NotFound(String),
    #[error("no pending certificate request for {0}")]
    NoPendingRequest(String),
    #[error("certificate holder {got} does not answer the pending request for {expected}")]
    RequestMismatch { expected: String, got: String },
    #[error("no blacklist stored for {0}")]
    NoBlacklist(String),
    #[error("terminal store lock poisoned")]
    Poisoned,
    #[error("terminal store backend failure: {0}")]
    Backend(String),
}

/// Storage for [`TerminalPermission`] records plus the renewal leases that
/// coordinate lifecycle work across instances.
///
/// Every mutation is atomic with respect to concurrent callers. In
/// particular `import_certificate` checks and consumes the pending request
/// in one step, and `claim_renewal` is a compare-and-set.
pub trait TerminalStore: Send + Sync {
    fn load(&self, ref_id: &str) -> Result<Option<TerminalPermission>, Error>;

    fn create(&self, ref_id: &str) -> Result<(), Error>;

    fn remove(&self, ref_id: &str) -> Result<(), Error>;

    fn list_ref_ids(&self) -> Result<Vec<String>, Error>;

    fn store_pending_request(
        &self,
        ref_id: &str,
        pending: PendingCertRequest,
    ) -> Result<(), Error>;

    fn delete_pending_request(&self, ref_id: &str) -> Result<(), Error>;

    /// Store a certificate that answers the pending request for `ref_id`.
    /// Fails without touching the record when no pending request exists or
    /// the holder references do not match; consumes the pending request
    /// otherwise.
    fn import_certificate(
        &self,
        ref_id: &str,
        cvc: TerminalData,
        chain: CvcChain,
    ) -> Result<(), Error>;

    /// Store a certificate without pending-request bookkeeping. Used by the
    /// provisioning path where the certificate comes from outside.
    fn store_cvc(&self, ref_id: &str, cvc: TerminalData, chain: CvcChain) -> Result<(), Error>;

    fn store_cvc_description(&self, ref_id: &str, description: Vec<u8>) -> Result<(), Error>;

    fn store_master_defect_lists(
        &self,
        ref_id: &str,
        master_list: Vec<u8>,
        defect_list: Vec<u8>,
    ) -> Result<(), Error>;

    /// Replace the stored blacklist for `ref_id` wholesale.
    fn store_blacklist(
        &self,
        ref_id: &str,
        sector_id: Vec<u8>,
        entries: Vec<Vec<u8>>,
        version: u64,
    ) -> Result<(), Error>;

    /// Apply a delta on top of the stored blacklist. Requires a full list to
    /// have been stored before.
    fn apply_blacklist_delta(
        &self,
        ref_id: &str,
        added: Vec<Vec<u8>>,
        removed: Vec<Vec<u8>>,
        version: u64,
    ) -> Result<(), Error>;

    fn blacklist_count(&self, ref_id: &str) -> Result<Option<u64>, Error>;

    /// Try to take the lease for `task` on `ref_id`. Returns `true` when the
    /// caller now holds the lease, `false` when another live lease exists.
    fn claim_renewal(
        &self,
        ref_id: &str,
        task: RenewalTask,
        holder: &str,
        window: Duration,
    ) -> Result<bool, Error>;

    /// Drop the lease if `holder` still owns it. A lease held by somebody
    /// else is left alone.
    fn release_renewal(&self, ref_id: &str, task: RenewalTask, holder: &str) -> Result<(), Error>;
}

#[derive(Default)]
struct Inner {
    permissions: HashMap<String, TerminalPermission>,
    leases: HashMap<(String, RenewalTask), RenewalLease>,
}

/// In-memory [`TerminalStore`], the default for single-instance deployments
/// and for tests. Clustered deployments swap in a database-backed
/// implementation.
#[derive(Default)]
pub struct MemoryTerminalStore {
    inner: Mutex<Inner>,
}

impl MemoryTerminalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        ref_id: &str,
        f: impl FnOnce(&mut TerminalPermission) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut inner = self.inner.lock().map_err(|_| Error::Poisoned)?;
        match inner.permissions.get_mut(ref_id) {
            Some(permission) => f(permission),
            None => Err(Error::NotFound(ref_id.to_string())),
        }
    }
}

impl TerminalStore for MemoryTerminalStore {
    fn load(&self, ref_id: &str) -> Result<Option<TerminalPermission>, Error> {
        let inner = self.inner.lock().map_err(|_| Error::Poisoned)?;
        Ok(inner.permissions.get(ref_id).cloned())
    }

    fn create(&self, ref_id: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(|_| Error::Poisoned)?;
        if inner.permissions.contains_key(ref_id) {
            return Err(Error::AlreadyExists(ref_id.to_string()));
        }
        inner
            .permissions
            .insert(ref_id.to_string(), TerminalPermission::new(ref_id));
        Ok(())
    }

    fn remove(&self, ref_id: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(|_| Error::Poisoned)?;
        if inner.permissions.remove(ref_id).is_none() {
            return Err(Error::NotFound(ref_id.to_string()));
        }
        inner.leases.retain(|(id, _), _| id != ref_id);
        Ok(())
    }

    fn list_ref_ids(&self) -> Result<Vec<String>, Error> {
        let inner = self.inner.lock().map_err(|_| Error::Poisoned)?;
        let mut ids: Vec<String> = inner.permissions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn store_pending_request(
        &self,
        ref_id: &str,
        pending: PendingCertRequest,
    ) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            permission.pending_request = Some(pending);
            Ok(())
        })
    }

    fn delete_pending_request(&self, ref_id: &str) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            if permission.pending_request.take().is_none() {
                return Err(Error::NoPendingRequest(ref_id.to_string()));
            }
            Ok(())
        })
    }

    fn import_certificate(
        &self,
        ref_id: &str,
        cvc: TerminalData,
        chain: CvcChain,
    ) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            let pending = permission
                .pending_request
                .as_ref()
                .ok_or_else(|| Error::NoPendingRequest(ref_id.to_string()))?;
            if pending.holder_reference != cvc.holder_reference {
                return Err(Error::RequestMismatch {
                    expected: pending.holder_reference.clone(),
                    got: cvc.holder_reference.clone(),
                });
            }
            permission.pending_request = None;
            permission.cvc = Some(cvc);
            permission.chain = chain;
            Ok(())
        })
    }

    fn store_cvc(&self, ref_id: &str, cvc: TerminalData, chain: CvcChain) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            permission.cvc = Some(cvc);
            permission.chain = chain;
            Ok(())
        })
    }

    fn store_cvc_description(&self, ref_id: &str, description: Vec<u8>) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            permission.cvc_description = Some(description);
            Ok(())
        })
    }

    fn store_master_defect_lists(
        &self,
        ref_id: &str,
        master_list: Vec<u8>,
        defect_list: Vec<u8>,
    ) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            permission.master_list = Some(master_list);
            permission.defect_list = Some(defect_list);
            Ok(())
        })
    }

    fn store_blacklist(
        &self,
        ref_id: &str,
        sector_id: Vec<u8>,
        entries: Vec<Vec<u8>>,
        version: u64,
    ) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            permission.sector_id = Some(sector_id.clone());
            permission.blacklist = Some(crate::definitions::Blacklist {
                sector_id,
                entries: entries.into_iter().collect(),
                version,
            });
            Ok(())
        })
    }

    fn apply_blacklist_delta(
        &self,
        ref_id: &str,
        added: Vec<Vec<u8>>,
        removed: Vec<Vec<u8>>,
        version: u64,
    ) -> Result<(), Error> {
        self.with_entry(ref_id, |permission| {
            let blacklist = permission
                .blacklist
                .as_mut()
                .ok_or_else(|| Error::NoBlacklist(ref_id.to_string()))?;
            for entry in removed {
                blacklist.entries.remove(&entry);
            }
            blacklist.entries.extend(added);
            blacklist.version = version;
            Ok(())
        })
    }

    fn blacklist_count(&self, ref_id: &str) -> Result<Option<u64>, Error> {
        self.with_entry(ref_id, |permission| {
            Ok(permission
                .blacklist
                .as_ref()
                .map(|b| b.entries.len() as u64))
        })
    }

    fn claim_renewal(
        &self,
        ref_id: &str,
        task: RenewalTask,
        holder: &str,
        window: Duration,
    ) -> Result<bool, Error> {
        let mut inner = self.inner.lock().map_err(|_| Error::Poisoned)?;
        let now = OffsetDateTime::now_utc();
        let key = (ref_id.to_string(), task);
        match inner.leases.get(&key) {
            Some(lease) if !lease.is_expired(now) && lease.holder != holder => Ok(false),
            _ => {
                inner.leases.insert(
                    key,
                    RenewalLease {
                        holder: holder.to_string(),
                        expires: now + window,
                    },
                );
                Ok(true)
            }
        }
    }

    fn release_renewal(&self, ref_id: &str, task: RenewalTask, holder: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().map_err(|_| Error::Poisoned)?;
        let key = (ref_id.to_string(), task);
        if inner
            .leases
            .get(&key)
            .map(|lease| lease.holder == holder)
            .unwrap_or(false)
        {
            inner.leases.remove(&key);
        }
        Ok(())
    }
}
