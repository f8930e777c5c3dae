use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome class of a protocol operation, serialized by the transport layer
/// into the eCard-API result major URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMajor {
    Ok,
    Error,
}

impl ResultMajor {
    pub fn uri(&self) -> &'static str {
        match self {
            ResultMajor::Ok => "http://www.bsi.bund.de/ecard/api/1.1/resultmajor#ok",
            ResultMajor::Error => "http://www.bsi.bund.de/ecard/api/1.1/resultmajor#error",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResultMajor::Ok)
    }
}

/// Cause of an unsuccessful protocol operation. The variants form the fixed
/// minor-code vocabulary shared by `useID` and `getResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMinor {
    TooManyOpenSessions,
    MissingTerminalRights,
    MissingArgument,
    InvalidSession,
    InvalidCounter,
    NoResultYet,
    InternalError,
}

impl ResultMinor {
    pub fn uri(&self) -> &'static str {
        match self {
            ResultMinor::TooManyOpenSessions => {
                "http://www.bsi.bund.de/eid/server/2.0/resultminor/useID#tooManyOpenSessions"
            }
            ResultMinor::MissingTerminalRights => {
                "http://www.bsi.bund.de/eid/server/2.0/resultminor/useID#missingTerminalRights"
            }
            ResultMinor::MissingArgument => {
                "http://www.bsi.bund.de/eid/server/2.0/resultminor/useID#missingArgument"
            }
            ResultMinor::InvalidSession => {
                "http://www.bsi.bund.de/eid/server/2.0/resultminor/getResult#invalidSession"
            }
            ResultMinor::InvalidCounter => {
                "http://www.bsi.bund.de/eid/server/2.0/resultminor/getResult#invalidCounter"
            }
            ResultMinor::NoResultYet => {
                "http://www.bsi.bund.de/eid/server/2.0/resultminor/getResult#noResultYet"
            }
            ResultMinor::InternalError => {
                "http://www.bsi.bund.de/eid/server/2.0/resultminor/common#internalError"
            }
        }
    }
}

/// The asynchronously produced outcome of an authentication, attached to the
/// session by the eCard callback and collected exactly once via `getResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EidResult {
    /// Outcome reported by the eCard layer for the authentication itself.
    pub status: ResultMajor,
    /// Backend-reported cause when the authentication failed.
    pub status_detail: Option<String>,
    /// The attributes read off the card, keyed by attribute name.
    pub personal_data: serde_json::Value,
    /// Auxiliary information such as verification outcomes.
    pub info: BTreeMap<String, String>,
}

/// Response of the `useID` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EidRequestResponse {
    pub session_id: String,
    pub request_id: String,
    pub major: ResultMajor,
    pub minor: Option<ResultMinor>,
    /// Diagnostic message for error responses. Never carries internal
    /// exception detail; that stays in the log.
    pub message: Option<String>,
    /// Pre-shared key for the PAOS channel, present on success only.
    pub psk: Option<String>,
    /// The provider's PAOS receiver endpoint, present on success only.
    pub paos_receiver_url: Option<String>,
    pub log_prefix: String,
}

impl EidRequestResponse {
    pub(crate) fn ok(
        session_id: String,
        request_id: String,
        psk: String,
        paos_receiver_url: String,
        log_prefix: String,
    ) -> Self {
        EidRequestResponse {
            session_id,
            request_id,
            major: ResultMajor::Ok,
            minor: None,
            message: None,
            psk: Some(psk),
            paos_receiver_url: Some(paos_receiver_url),
            log_prefix,
        }
    }

    pub(crate) fn error(
        session_id: String,
        request_id: String,
        minor: ResultMinor,
        message: impl Into<String>,
        log_prefix: String,
    ) -> Self {
        EidRequestResponse {
            session_id,
            request_id,
            major: ResultMajor::Error,
            minor: Some(minor),
            message: Some(message.into()),
            psk: None,
            paos_receiver_url: None,
            log_prefix,
        }
    }
}

/// Response of the `getResult` polling operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EidResultResponse {
    pub major: ResultMajor,
    pub minor: Option<ResultMinor>,
    /// Present exactly once per session, on the poll that consumes it.
    pub result: Option<EidResult>,
    pub log_prefix: String,
}

impl EidResultResponse {
    pub(crate) fn success(result: EidResult, log_prefix: String) -> Self {
        EidResultResponse {
            major: ResultMajor::Ok,
            minor: None,
            result: Some(result),
            log_prefix,
        }
    }

    pub(crate) fn error(minor: ResultMinor, log_prefix: String) -> Self {
        EidResultResponse {
            major: ResultMajor::Error,
            minor: Some(minor),
            result: None,
            log_prefix,
        }
    }
}
