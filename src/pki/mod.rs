//! Lifecycle management of terminal permission data: certificate requests
//! and renewal, blacklist distribution and master/defect list refresh.
//!
//! All operations report a [`ManagementResult`] instead of failing; the
//! scheduled ones coordinate across middleware instances through renewal
//! leases in the shared [`TerminalStore`] so each task runs at most once per
//! cycle.

pub mod ca_client;
pub mod messages;
pub mod store;

use std::sync::Arc;

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::PkiConfig;
use crate::definitions::{
    CvcChain, PendingCertRequest, ProviderRegistry, RenewalTask, TerminalData, TerminalPermission,
};

use ca_client::{CaClient, CvcIssuance};
use messages::{ManagementCode, ManagementResult, PermissionDataInfo};
use store::TerminalStore;

/// The lifecycle manager. One per process; safe to run side by side with
/// instances on other hosts as long as they share the terminal store.
pub struct PermissionDataHandling {
    store: Arc<dyn TerminalStore>,
    ca: Arc<dyn CaClient>,
    providers: ProviderRegistry,
    config: PkiConfig,
    /// Identifies this instance as lease holder. Random per process unless
    /// overridden with a stable name.
    instance_id: String,
}

impl PermissionDataHandling {
    pub fn new(
        store: Arc<dyn TerminalStore>,
        ca: Arc<dyn CaClient>,
        providers: ProviderRegistry,
        config: PkiConfig,
    ) -> Self {
        PermissionDataHandling {
            store,
            ca,
            providers,
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Create an empty terminal permission entry.
    pub fn create_entry(&self, ref_id: &str) -> ManagementResult {
        match self.store.create(ref_id) {
            Ok(()) => {
                info!("{ref_id}: created terminal permission entry");
                ManagementResult::ok()
            }
            Err(e) => e.into(),
        }
    }

    /// Whether `entity_id` is in the state required for an initial
    /// certificate request: entry present, no certificate, no open request.
    pub fn check_ready_for_first_request(&self, entity_id: &str) -> ManagementResult {
        run(|| {
            let (_, permission) = self.provider_permission(entity_id)?;
            if permission.cvc.is_some() {
                return Err(ManagementResult::new(
                    ManagementCode::AlreadyExists,
                    "a certificate is already stored",
                ));
            }
            if let Some(pending) = &permission.pending_request {
                return Err(ManagementResult::new(
                    ManagementCode::AlreadyExists,
                    format!("a request for {} is already open", pending.holder_reference),
                ));
            }
            Ok(ManagementResult::ok())
        })
    }

    /// Generate a key pair, send the initial certificate request to the CA
    /// and record it as pending. When the CA answers synchronously the
    /// certificate is stored right away.
    pub fn request_first_certificate(
        &self,
        entity_id: &str,
        cvc_description: Option<Vec<u8>>,
        sequence_number: u32,
    ) -> ManagementResult {
        run(|| {
            let ready = self.check_ready_for_first_request(entity_id);
            if !ready.is_ok() {
                return Err(ready);
            }
            let (provider, _) = self.provider_permission(entity_id)?;
            let ref_id = provider.connector.cvc_ref_id.clone();
            if let Some(description) = cvc_description {
                self.store
                    .store_cvc_description(&ref_id, description)
                    .map_err(ManagementResult::from)?;
            }
            let holder = format!(
                "{}{}{:05}",
                provider.connector.country_code, provider.connector.chr_mnemonic, sequence_number
            );
            self.submit_request(&ref_id, &holder)
        })
    }

    /// Store a certificate delivered out of band for an open request.
    pub fn import_certificate(
        &self,
        entity_id: &str,
        cvc: TerminalData,
        chain: CvcChain,
    ) -> ManagementResult {
        run(|| {
            let ref_id = self.ref_id_of(entity_id)?;
            self.store
                .import_certificate(ref_id, cvc, chain)
                .map_err(ManagementResult::from)?;
            info!("{ref_id}: imported certificate for pending request");
            Ok(ManagementResult::ok())
        })
    }

    /// Renew the certificate of one provider's terminal regardless of its
    /// remaining validity. Takes the renewal lease like the scheduled path
    /// does.
    pub fn trigger_cert_renewal(&self, entity_id: &str) -> ManagementResult {
        run(|| {
            let ref_id = self.ref_id_of(entity_id)?;
            let permission = self.load_entry(ref_id)?;
            if permission.cvc.is_none() {
                return Err(ManagementResult::new(
                    ManagementCode::IncompleteConfiguration,
                    "no cvc configured",
                ));
            }
            if !self.claim(ref_id, RenewalTask::Cvc)? {
                return Err(skipped(ref_id, RenewalTask::Cvc));
            }
            // re-read under the lease; another instance may have renewed the
            // certificate or answered the request between load and claim
            let permission = self.load_entry(ref_id)?;
            let cvc = permission.cvc.ok_or_else(|| {
                ManagementResult::new(ManagementCode::IncompleteConfiguration, "no cvc configured")
            })?;
            Ok(self.renew_cvc(ref_id, &cvc, permission.pending_request.is_some()))
        })
    }

    /// Scheduled renewal: request successor certificates for every terminal
    /// whose certificate expires within the configured threshold. Safe to
    /// run on every instance; the lease makes each terminal's renewal happen
    /// at most once.
    pub fn renew_outdated_cvcs(&self) -> Vec<(String, ManagementResult)> {
        let ref_ids = match self.store.list_ref_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("cvc renewal sweep cannot list terminals: {e}");
                return Vec::new();
            }
        };
        let now = OffsetDateTime::now_utc();
        let mut results = Vec::new();
        for ref_id in ref_ids {
            let result = run(|| {
                let permission = self.load_entry(&ref_id)?;
                let Some(cvc) = permission.cvc else {
                    return Ok(ManagementResult::new(
                        ManagementCode::IncompleteConfiguration,
                        "no cvc configured",
                    ));
                };
                if cvc.remaining_validity(now) >= self.config.renewal_threshold() {
                    return Ok(ManagementResult::ok());
                }
                if !self.claim(&ref_id, RenewalTask::Cvc)? {
                    return Err(skipped(&ref_id, RenewalTask::Cvc));
                }
                // another instance may have renewed between the eligibility
                // check and the claim; re-read under the lease
                let permission = self.load_entry(&ref_id)?;
                let Some(cvc) = permission.cvc else {
                    return Ok(ManagementResult::new(
                        ManagementCode::IncompleteConfiguration,
                        "no cvc configured",
                    ));
                };
                if cvc.remaining_validity(now) >= self.config.renewal_threshold() {
                    self.release(&ref_id, RenewalTask::Cvc);
                    return Ok(ManagementResult::ok());
                }
                Ok(self.renew_cvc(&ref_id, &cvc, permission.pending_request.is_some()))
            });
            results.push((ref_id, result));
        }
        results
    }

    /// Store a new CVC description and renew the certificate so the issued
    /// successor embeds it.
    pub fn change_cvc_description(
        &self,
        entity_id: &str,
        description: Vec<u8>,
    ) -> ManagementResult {
        run(|| {
            let ref_id = self.ref_id_of(entity_id)?;
            self.store
                .store_cvc_description(ref_id, description)
                .map_err(ManagementResult::from)?;
            Ok(self.trigger_cert_renewal(entity_id))
        })
    }

    pub fn get_cvc_description(&self, ref_id: &str) -> Option<Vec<u8>> {
        self.store
            .load(ref_id)
            .ok()
            .flatten()
            .and_then(|p| p.cvc_description)
    }

    pub fn delete_pending_cert_request(&self, entity_id: &str) -> ManagementResult {
        run(|| {
            let ref_id = self.ref_id_of(entity_id)?;
            self.store
                .delete_pending_request(ref_id)
                .map_err(ManagementResult::from)?;
            info!("{ref_id}: deleted pending certificate request");
            Ok(ManagementResult::ok())
        })
    }

    /// Refresh the blacklist of every terminal. With `delta` set, terminals
    /// that already hold a list fetch only the changes since their stored
    /// version; everything else gets a full list.
    pub fn renew_blacklists(&self, delta: bool) -> Vec<(String, ManagementResult)> {
        self.for_each_terminal(|ref_id, permission| {
            self.renew_blacklist_for(ref_id, permission, delta)
        })
    }

    /// Full blacklist refresh for the terminal of one provider.
    pub fn renew_blacklist(&self, entity_id: &str) -> ManagementResult {
        run(|| {
            let (provider, permission) = self.provider_permission(entity_id)?;
            Ok(self.renew_blacklist_for(&provider.connector.cvc_ref_id, permission, false))
        })
    }

    /// Refresh master and defect lists for every terminal. The lists are
    /// fetched once and fanned out to each terminal whose lease could be
    /// taken.
    pub fn renew_master_and_defect_lists(&self) -> Vec<(String, ManagementResult)> {
        let mut lists: Option<(Vec<u8>, Vec<u8>)> = None;
        self.for_each_terminal(|ref_id, _| {
            run(|| {
                if !self.claim(ref_id, RenewalTask::MasterDefectList)? {
                    return Err(skipped(ref_id, RenewalTask::MasterDefectList));
                }
                let (master, defect) = match &lists {
                    Some(cached) => cached.clone(),
                    None => {
                        let fetched = self.ca.fetch_master_defect_lists().map_err(|e| {
                            warn!("{ref_id}: master/defect list fetch failed: {e}");
                            ManagementResult::from(e)
                        })?;
                        lists = Some(fetched.clone());
                        fetched
                    }
                };
                self.store
                    .store_master_defect_lists(ref_id, master, defect)
                    .map_err(ManagementResult::from)?;
                info!("{ref_id}: stored current master and defect lists");
                Ok(ManagementResult::ok())
            })
        })
    }

    /// Master and defect list refresh for the terminal of one provider.
    /// Takes the same lease as the scheduled sweep.
    pub fn renew_master_and_defect_list(&self, entity_id: &str) -> ManagementResult {
        run(|| {
            let (provider, _) = self.provider_permission(entity_id)?;
            let ref_id = &provider.connector.cvc_ref_id;
            if !self.claim(ref_id, RenewalTask::MasterDefectList)? {
                return Err(skipped(ref_id, RenewalTask::MasterDefectList));
            }
            let (master, defect) = self
                .ca
                .fetch_master_defect_lists()
                .map_err(ManagementResult::from)?;
            self.store
                .store_master_defect_lists(ref_id, master, defect)
                .map_err(ManagementResult::from)?;
            Ok(ManagementResult::ok())
        })
    }

    /// Stored-state summary for the administration interface.
    pub fn get_permission_data_info(
        &self,
        ref_id: &str,
        with_blacklist_count: bool,
    ) -> Option<PermissionDataInfo> {
        let permission = self.store.load(ref_id).ok().flatten()?;
        let blacklist_entries = if with_blacklist_count {
            self.store.blacklist_count(ref_id).ok().flatten()
        } else {
            None
        };
        Some(PermissionDataInfo {
            ref_id: permission.ref_id.clone(),
            holder_reference: permission
                .cvc
                .as_ref()
                .map(|c| c.holder_reference.clone()),
            not_before: permission.cvc.as_ref().map(|c| c.not_before),
            not_after: permission.cvc.as_ref().map(|c| c.not_after),
            cvc_fingerprint: permission
                .cvc
                .as_ref()
                .map(|c| hex::encode(Sha256::digest(&c.raw))),
            sector_id: permission.sector_id.as_ref().map(hex::encode),
            has_cvc_description: permission.cvc_description.is_some(),
            has_master_list: permission.master_list.is_some(),
            has_defect_list: permission.defect_list.is_some(),
            pending_request_for: permission
                .pending_request
                .as_ref()
                .map(|p| p.holder_reference.clone()),
            blacklist_entries,
        })
    }

    /// Remove a terminal's stored PKI state entirely.
    pub fn remove_permission_data(&self, ref_id: &str) -> ManagementResult {
        match self.store.remove(ref_id) {
            Ok(()) => {
                info!("{ref_id}: removed terminal permission entry");
                ManagementResult::ok()
            }
            Err(e) => e.into(),
        }
    }

    fn renew_blacklist_for(
        &self,
        ref_id: &str,
        permission: TerminalPermission,
        delta: bool,
    ) -> ManagementResult {
        run(|| {
            if !self.claim(ref_id, RenewalTask::BlackList)? {
                return Err(skipped(ref_id, RenewalTask::BlackList));
            }
            let result = match (&permission.blacklist, delta) {
                (Some(blacklist), true) => self
                    .ca
                    .fetch_blacklist_delta(&blacklist.sector_id, blacklist.version)
                    .map_err(ManagementResult::from)
                    .and_then(|update| {
                        self.store
                            .apply_blacklist_delta(
                                ref_id,
                                update.added,
                                update.removed,
                                update.version,
                            )
                            .map_err(ManagementResult::from)
                    }),
                (stored, _) => self
                    .ca
                    .fetch_blacklist_full(stored.as_ref().map(|b| b.sector_id.as_slice()))
                    .map_err(ManagementResult::from)
                    .and_then(|full| {
                        self.store
                            .store_blacklist(ref_id, full.sector_id, full.entries, full.version)
                            .map_err(ManagementResult::from)
                    }),
            };
            match result {
                Ok(()) => {
                    info!("{ref_id}: blacklist refreshed");
                    Ok(ManagementResult::ok())
                }
                Err(e) => {
                    warn!("{ref_id}: blacklist refresh failed: {e}");
                    Err(e)
                }
            }
        })
    }

    /// Build and submit a successor certificate request. The lease is held
    /// by the caller.
    fn renew_cvc(
        &self,
        ref_id: &str,
        cvc: &TerminalData,
        has_pending: bool,
    ) -> ManagementResult {
        run(|| {
            if has_pending {
                return Err(ManagementResult::new(
                    ManagementCode::AlreadyExists,
                    "a certificate request is already open",
                ));
            }
            let sequence = cvc.sequence_number().ok_or_else(|| {
                ManagementResult::new(
                    ManagementCode::IncompleteConfiguration,
                    format!(
                        "holder reference {} carries no sequence number",
                        cvc.holder_reference
                    ),
                )
            })?;
            let stem = cvc
                .holder_reference
                .trim_end_matches(|c: char| c.is_ascii_digit());
            let holder = format!("{stem}{:05}", sequence + 1);
            self.submit_request(ref_id, &holder)
        })
    }

    /// Generate a key pair, record the request as pending and send it. On a
    /// synchronous answer the certificate is imported immediately; on CA
    /// failure the pending request is rolled back.
    fn submit_request(
        &self,
        ref_id: &str,
        holder: &str,
    ) -> Result<ManagementResult, ManagementResult> {
        let pending = build_cert_request(holder);
        let request = pending.request.clone();
        self.store
            .store_pending_request(ref_id, pending)
            .map_err(ManagementResult::from)?;
        info!("{ref_id}: sending certificate request for {holder}");
        match self.ca.send_certificate_request(&request) {
            Ok(Some(CvcIssuance { cvc, chain })) => {
                self.store
                    .import_certificate(ref_id, cvc, chain)
                    .map_err(ManagementResult::from)?;
                info!("{ref_id}: certificate for {holder} issued and stored");
                Ok(ManagementResult::ok())
            }
            Ok(None) => {
                info!("{ref_id}: request accepted, certificate will be delivered later");
                Ok(ManagementResult::ok())
            }
            Err(e) => {
                warn!("{ref_id}: certificate request failed: {e}");
                if let Err(rollback) = self.store.delete_pending_request(ref_id) {
                    warn!("{ref_id}: cannot roll back pending request: {rollback}");
                }
                Err(e.into())
            }
        }
    }

    fn ref_id_of(&self, entity_id: &str) -> Result<&str, ManagementResult> {
        self.providers
            .get(entity_id)
            .map(|p| p.connector.cvc_ref_id.as_str())
            .ok_or_else(|| {
                ManagementResult::new(
                    ManagementCode::NotFound,
                    format!("{entity_id} is unknown in the configuration"),
                )
            })
    }

    fn provider_permission(
        &self,
        entity_id: &str,
    ) -> Result<(&crate::definitions::ServiceProvider, TerminalPermission), ManagementResult> {
        let provider = self.providers.get(entity_id).ok_or_else(|| {
            ManagementResult::new(
                ManagementCode::NotFound,
                format!("{entity_id} is unknown in the configuration"),
            )
        })?;
        let permission = self.load_entry(&provider.connector.cvc_ref_id)?;
        Ok((provider, permission))
    }

    fn load_entry(&self, ref_id: &str) -> Result<TerminalPermission, ManagementResult> {
        self.store
            .load(ref_id)
            .map_err(ManagementResult::from)?
            .ok_or_else(|| {
                ManagementResult::new(
                    ManagementCode::NotFound,
                    format!("no terminal permission entry for {ref_id}"),
                )
            })
    }

    fn claim(&self, ref_id: &str, task: RenewalTask) -> Result<bool, ManagementResult> {
        self.store
            .claim_renewal(
                ref_id,
                task,
                &self.instance_id,
                self.config.renewal_claim_window(),
            )
            .map_err(ManagementResult::from)
    }

    // Completed tasks keep their lease until it expires; the claim window is
    // what bounds the task to one run per cycle. Release only happens when a
    // claim turns out to have nothing to do.
    fn release(&self, ref_id: &str, task: RenewalTask) {
        if let Err(e) = self
            .store
            .release_renewal(ref_id, task, &self.instance_id)
        {
            warn!("{ref_id}: cannot release {task:?} lease: {e}");
        }
    }

    fn for_each_terminal(
        &self,
        mut f: impl FnMut(&str, TerminalPermission) -> ManagementResult,
    ) -> Vec<(String, ManagementResult)> {
        let ref_ids = match self.store.list_ref_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("cannot list terminals: {e}");
                return Vec::new();
            }
        };
        let mut results = Vec::new();
        for ref_id in ref_ids {
            let result = match self.load_entry(&ref_id) {
                Ok(permission) => f(&ref_id, permission),
                Err(e) => e,
            };
            results.push((ref_id, result));
        }
        results
    }
}

fn run(f: impl FnOnce() -> Result<ManagementResult, ManagementResult>) -> ManagementResult {
    f().unwrap_or_else(|e| e)
}

fn skipped(ref_id: &str, task: RenewalTask) -> ManagementResult {
    info!("{ref_id}: {task:?} renewal lease held elsewhere, skipping");
    ManagementResult::new(
        ManagementCode::SkippedNotClaimed,
        format!("{task:?} lease held by another instance"),
    )
}

/// A fresh key pair and the signed request body for `holder`: holder
/// reference, uncompressed public point and an ECDSA signature over both.
fn build_cert_request(holder: &str) -> PendingCertRequest {
    let key = SigningKey::random(&mut OsRng);
    let public = key.verifying_key().to_encoded_point(false);
    let mut request = holder.as_bytes().to_vec();
    request.extend_from_slice(public.as_bytes());
    let signature: Signature = key.sign(&request);
    request.extend_from_slice(signature.to_der().as_bytes());
    PendingCertRequest {
        holder_reference: holder.to_string(),
        request,
        private_key: Zeroizing::new(key.to_bytes().to_vec()),
        created: OffsetDateTime::now_utc(),
    }
}
