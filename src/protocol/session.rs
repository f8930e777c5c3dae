use time::OffsetDateTime;

use super::response::EidResult;
use crate::definitions::SessionInput;

/// One in-flight authentication, keyed by request id in the session store.
///
/// The sequence number implements the anti-replay contract of `getResult`:
/// unset until the first poll, afterwards each accepted poll must carry the
/// previous value plus one.
#[derive(Clone)]
pub struct AuthenticationSession {
    pub request_id: String,
    pub session_id: String,
    pub entity_id: String,
    pub sequence_number: Option<u32>,
    pub result: Option<EidResult>,
    pub input: Option<SessionInput>,
    pub created: OffsetDateTime,
    pub log_prefix: String,
}

impl AuthenticationSession {
    pub fn new(
        session_id: impl Into<String>,
        request_id: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        let request_id = request_id.into();
        let entity_id = entity_id.into();
        let log_prefix = format!("{entity_id}: {request_id}: ");
        AuthenticationSession {
            request_id,
            session_id: session_id.into(),
            entity_id,
            sequence_number: None,
            result: None,
            input: None,
            created: OffsetDateTime::now_utc(),
            log_prefix,
        }
    }
}

impl std::fmt::Debug for AuthenticationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationSession")
            .field("request_id", &self.request_id)
            .field("session_id", &self.session_id)
            .field("entity_id", &self.entity_id)
            .field("sequence_number", &self.sequence_number)
            .field("has_result", &self.result.is_some())
            .field("created", &self.created)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_prefix_ties_entity_and_request() {
        let session = AuthenticationSession::new("s".repeat(16), "r".repeat(16), "provider-a");
        assert_eq!(
            session.log_prefix,
            format!("provider-a: {}: ", "r".repeat(16))
        );
    }
}
