use serde::{Deserialize, Serialize};

use crate::definitions::EidAttribute;

/// An inbound `useID` request, as handed over by the transport layer after
/// unmarshalling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EidRequestInput {
    /// Caller-chosen request id; generated when absent.
    pub request_id: Option<String>,
    /// Caller-chosen session id, only honored when
    /// [`session_id_may_differ`](Self::session_id_may_differ) is set.
    pub session_id: Option<String>,
    /// When unset, the session id always equals the request id.
    pub session_id_may_differ: bool,
    pub required_fields: Vec<EidAttribute>,
    pub optional_fields: Vec<EidAttribute>,
    /// Minimum age for on-card age verification. Must be positive when age
    /// verification is requested.
    pub requested_min_age: Option<u32>,
    /// Pattern for on-card community-id verification.
    pub community_id_pattern: Option<String>,
    /// Free-form transaction context forwarded to the card reader display.
    pub transaction_info: Option<String>,
}

impl EidRequestInput {
    pub fn requests(&self, attribute: EidAttribute) -> bool {
        self.required_fields.contains(&attribute) || self.optional_fields.contains(&attribute)
    }
}
