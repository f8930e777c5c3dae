//! Outbound interface to the authorization CA and its list distribution
//! points (terminal authorization service, restricted identification
//! service, passive authentication service).

use crate::definitions::{CvcChain, TerminalData};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CA not reachable: {0}")]
    Unavailable(String),
    #[error("CA rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected CA response: {0}")]
    Protocol(String),
}

/// A certificate issued in answer to a request, with the chain up to the
/// CVCA.
#[derive(Debug, Clone)]
pub struct CvcIssuance {
    pub cvc: TerminalData,
    pub chain: CvcChain,
}

/// A complete sector blacklist as served by the distribution point.
#[derive(Debug, Clone)]
pub struct FullBlacklist {
    pub sector_id: Vec<u8>,
    pub version: u64,
    pub entries: Vec<Vec<u8>>,
}

/// Changes between a stored blacklist version and the current one.
#[derive(Debug, Clone)]
pub struct BlacklistDelta {
    pub version: u64,
    pub added: Vec<Vec<u8>>,
    pub removed: Vec<Vec<u8>>,
}

/// Client for the CA services the lifecycle manager talks to. One
/// implementation per CA connection profile; tests substitute mocks.
pub trait CaClient: Send + Sync {
    /// Submit a signed certificate request. Some CAs answer synchronously
    /// with the issued certificate, others deliver it out of band later; in
    /// the latter case `Ok(None)` is returned and the pending request stays
    /// open until [`import`](crate::pki::PermissionDataHandling::import_certificate).
    fn send_certificate_request(&self, request: &[u8]) -> Result<Option<CvcIssuance>, Error>;

    /// Fetch the full blacklist for the sector of the terminal, or the
    /// initial list when no sector is known yet.
    fn fetch_blacklist_full(&self, sector_id: Option<&[u8]>) -> Result<FullBlacklist, Error>;

    /// Fetch the changes since `version` for the given sector.
    fn fetch_blacklist_delta(
        &self,
        sector_id: &[u8],
        version: u64,
    ) -> Result<BlacklistDelta, Error>;

    /// Fetch the current master list and defect list.
    fn fetch_master_defect_lists(&self) -> Result<(Vec<u8>, Vec<u8>), Error>;
}
