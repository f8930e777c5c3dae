use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroizing;

use super::chat::Chat;

/// The certificate chain from the terminal CVC up to the CVCA, outermost
/// first, each element a DER-encoded card verifiable certificate.
pub type CvcChain = Vec<Vec<u8>>;

/// The parsed form of the terminal's own card verifiable certificate.
///
/// Parsing the CVC encoding is delegated to the issuing infrastructure; this
/// crate only consumes the fields relevant for session construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalData {
    /// The certificate exactly as issued.
    #[serde(with = "serde_bytes")]
    pub raw: Vec<u8>,
    /// Certificate holder reference (country code + mnemonic + sequence).
    pub holder_reference: String,
    /// The authorization bitmap granted to this terminal.
    pub chat: Chat,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl TerminalData {
    /// Validity remaining at `now`. Negative once the certificate expired.
    pub fn remaining_validity(&self, now: OffsetDateTime) -> Duration {
        self.not_after - now
    }

    /// The numeric suffix of the holder reference, used when deriving the
    /// holder reference of a subsequent certificate request.
    pub fn sequence_number(&self) -> Option<u32> {
        let digits: String = self
            .holder_reference
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    }
}

/// A certificate request that has been sent but not yet answered by an
/// imported certificate.
#[derive(Clone)]
pub struct PendingCertRequest {
    pub holder_reference: String,
    /// The signed request as sent to the CA.
    pub request: Vec<u8>,
    /// The private key belonging to the requested certificate. Wiped from
    /// memory on drop.
    pub private_key: Zeroizing<Vec<u8>>,
    pub created: OffsetDateTime,
}

impl std::fmt::Debug for PendingCertRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCertRequest")
            .field("holder_reference", &self.holder_reference)
            .field("request", &hex::encode(&self.request))
            .field("private_key", &"<redacted>")
            .field("created", &self.created)
            .finish()
    }
}

/// Sector-scoped list of revoked restricted identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    pub sector_id: Vec<u8>,
    pub entries: BTreeSet<Vec<u8>>,
    /// Version reported by the distribution point, used for delta requests.
    pub version: u64,
}

/// Which lifecycle task a renewal lease covers. Leases for different tasks
/// on the same terminal are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenewalTask {
    Cvc,
    BlackList,
    MasterDefectList,
}

/// A claim on a renewal task, held by one middleware instance. Other
/// instances sharing the store skip the task while the lease is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalLease {
    pub holder: String,
    pub expires: OffsetDateTime,
}

impl RenewalLease {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires <= now
    }
}

/// The middleware's stored PKI state for one CVC reference id.
///
/// Mutated only by the lifecycle manager; the session protocol engine reads
/// it. A record with a certificate but without defect-list or master-list
/// data is not usable for sessions.
#[derive(Debug, Clone, Default)]
pub struct TerminalPermission {
    pub ref_id: String,
    pub cvc: Option<TerminalData>,
    pub chain: CvcChain,
    pub cvc_description: Option<Vec<u8>>,
    pub master_list: Option<Vec<u8>>,
    pub defect_list: Option<Vec<u8>>,
    pub sector_id: Option<Vec<u8>>,
    pub blacklist: Option<Blacklist>,
    pub pending_request: Option<PendingCertRequest>,
}

impl TerminalPermission {
    pub fn new(ref_id: impl Into<String>) -> Self {
        TerminalPermission {
            ref_id: ref_id.into(),
            ..Default::default()
        }
    }
}
