use serde::{Deserialize, Serialize};

/// Status vocabulary of the lifecycle management operations. These are
/// reported to the administration layer; management operations never fail
/// with an error value, they always produce one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagementCode {
    Ok,
    AlreadyExists,
    NotFound,
    NoPendingRequest,
    RequestMismatch,
    /// The provider or terminal is missing configuration the operation
    /// needs, for example a CVC that was never requested.
    IncompleteConfiguration,
    /// Another instance currently holds the renewal lease.
    SkippedNotClaimed,
    CaUnavailable,
    StorageFailure,
}

/// Outcome of one management operation, optionally with human-readable
/// detail for the administration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementResult {
    pub code: ManagementCode,
    pub detail: Option<String>,
}

impl ManagementResult {
    pub fn ok() -> Self {
        ManagementResult {
            code: ManagementCode::Ok,
            detail: None,
        }
    }

    pub fn new(code: ManagementCode, detail: impl Into<String>) -> Self {
        ManagementResult {
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ManagementCode::Ok
    }
}

impl std::fmt::Display for ManagementResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{:?}: {detail}", self.code),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl From<super::store::Error> for ManagementResult {
    fn from(e: super::store::Error) -> Self {
        use super::store::Error;
        let code = match &e {
            Error::AlreadyExists(_) => ManagementCode::AlreadyExists,
            Error::NotFound(_) => ManagementCode::NotFound,
            Error::NoPendingRequest(_) => ManagementCode::NoPendingRequest,
            Error::RequestMismatch { .. } => ManagementCode::RequestMismatch,
            Error::NoBlacklist(_) => ManagementCode::IncompleteConfiguration,
            Error::Poisoned | Error::Backend(_) => ManagementCode::StorageFailure,
        };
        ManagementResult::new(code, e.to_string())
    }
}

impl From<super::ca_client::Error> for ManagementResult {
    fn from(e: super::ca_client::Error) -> Self {
        ManagementResult::new(ManagementCode::CaUnavailable, e.to_string())
    }
}

/// Summary of a terminal's stored PKI state, as shown in the administration
/// interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDataInfo {
    pub ref_id: String,
    pub holder_reference: Option<String>,
    pub not_before: Option<time::OffsetDateTime>,
    pub not_after: Option<time::OffsetDateTime>,
    /// SHA-256 over the raw CVC, hex encoded.
    pub cvc_fingerprint: Option<String>,
    pub sector_id: Option<String>,
    pub has_cvc_description: bool,
    pub has_master_list: bool,
    pub has_defect_list: bool,
    pub pending_request_for: Option<String>,
    /// Only filled when explicitly asked for; counting can be expensive on
    /// large sectors.
    pub blacklist_entries: Option<u64>,
}
