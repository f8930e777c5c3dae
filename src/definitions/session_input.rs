use std::collections::BTreeSet;
use std::sync::Arc;

use url::Url;

use super::attributes::EidAttribute;
use super::terminal::{CvcChain, TerminalData};
use crate::master_list::MasterList;

/// Capability handed to a session for checking restricted identifiers
/// against the sector-scoped blacklist. The check semantics live with the
/// persistence layer; sessions only carry the handle.
pub trait BlacklistConnector: Send + Sync {
    fn sector_id(&self) -> &[u8];

    /// Whether `specific_id` is blacklisted within this connector's sector.
    fn contains(&self, specific_id: &[u8]) -> Result<bool, BlacklistError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BlacklistError {
    #[error("no blacklist stored for terminal {0}")]
    NotAvailable(String),
    #[error("blacklist lookup failed: {0}")]
    Store(String),
}

/// Age verification parameters as resolved by the authorization translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeVerification {
    pub min_age: u32,
    pub required: bool,
}

/// Community-id verification parameters as resolved by the authorization
/// translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityIdVerification {
    pub pattern: String,
    pub required: bool,
}

/// The fully resolved parameter set for one authentication attempt, handed
/// to the eCard backend when the session starts.
///
/// Built once per `useID` call and owned by the session for its lifetime.
/// The attribute sets are filled in by the authorization translator; nothing
/// else mutates a constructed input.
#[derive(Clone)]
pub struct SessionInput {
    cvc: TerminalData,
    cvc_chain: CvcChain,
    session_id: String,
    blacklist: Arc<dyn BlacklistConnector>,
    refresh_url: Url,
    server_url: String,
    master_list: MasterList,
    defect_list: Vec<u8>,
    transaction_info: Option<String>,
    required_fields: BTreeSet<EidAttribute>,
    optional_fields: BTreeSet<EidAttribute>,
    age_verification: Option<AgeVerification>,
    community_id_verification: Option<CommunityIdVerification>,
    log_prefix: String,
}

impl SessionInput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cvc: TerminalData,
        cvc_chain: CvcChain,
        session_id: String,
        blacklist: Arc<dyn BlacklistConnector>,
        refresh_url: Url,
        server_url: String,
        master_list: MasterList,
        defect_list: Vec<u8>,
        transaction_info: Option<String>,
        log_prefix: String,
    ) -> Self {
        SessionInput {
            cvc,
            cvc_chain,
            session_id,
            blacklist,
            refresh_url,
            server_url,
            master_list,
            defect_list,
            transaction_info,
            required_fields: BTreeSet::new(),
            optional_fields: BTreeSet::new(),
            age_verification: None,
            community_id_verification: None,
            log_prefix,
        }
    }

    pub(crate) fn add_required_field(&mut self, attribute: EidAttribute) {
        self.required_fields.insert(attribute);
    }

    pub(crate) fn add_optional_field(&mut self, attribute: EidAttribute) {
        self.optional_fields.insert(attribute);
    }

    pub(crate) fn set_age_verification(&mut self, min_age: u32, required: bool) {
        self.age_verification = Some(AgeVerification { min_age, required });
    }

    pub(crate) fn set_community_id_verification(&mut self, pattern: String, required: bool) {
        self.community_id_verification = Some(CommunityIdVerification { pattern, required });
    }

    pub fn cvc(&self) -> &TerminalData {
        &self.cvc
    }

    pub fn cvc_chain(&self) -> &CvcChain {
        &self.cvc_chain
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn blacklist(&self) -> &Arc<dyn BlacklistConnector> {
        &self.blacklist
    }

    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn master_list(&self) -> &MasterList {
        &self.master_list
    }

    pub fn defect_list(&self) -> &[u8] {
        &self.defect_list
    }

    pub fn transaction_info(&self) -> Option<&str> {
        self.transaction_info.as_deref()
    }

    pub fn required_fields(&self) -> &BTreeSet<EidAttribute> {
        &self.required_fields
    }

    pub fn optional_fields(&self) -> &BTreeSet<EidAttribute> {
        &self.optional_fields
    }

    pub fn age_verification(&self) -> Option<&AgeVerification> {
        self.age_verification.as_ref()
    }

    pub fn community_id_verification(&self) -> Option<&CommunityIdVerification> {
        self.community_id_verification.as_ref()
    }

    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }
}
