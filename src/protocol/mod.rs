//! The two-phase session protocol: `useID` opens an authentication session,
//! `getResult` polls for the asynchronously produced outcome under an
//! anti-replay counter.

pub mod blacklist;
pub mod request;
pub mod response;
pub mod session;
pub mod store;
pub mod translator;

use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

use crate::backend::{self, EcardBackend};
use crate::config::CoreConfig;
use crate::definitions::{ProviderRegistry, ServiceProvider, SessionInput};
use crate::master_list;
use crate::pki::store::{self as terminal_store, TerminalStore};

use blacklist::StoreBlacklistConnector;
use request::EidRequestInput;
use response::{EidRequestResponse, EidResult, EidResultResponse, ResultMinor};
use session::AuthenticationSession;
use store::SessionStore;

/// Resolved session and request ids must fall in this length range.
pub const MIN_ID_LENGTH: usize = 16;
pub const MAX_ID_LENGTH: usize = 10240;

/// Path segment appended to the server URL for the identity provider
/// callback address.
const ASYNC_PATH: &str = "gov_autent/async";
/// Query parameter carrying the request id in the callback address.
const REFERENCE_PARAM: &str = "refID";

/// Everything that can go wrong between request validation and session
/// registration. Mapped onto the protocol's minor-code vocabulary before it
/// leaves the engine.
#[derive(Debug, thiserror::Error)]
enum UseIdError {
    #[error(transparent)]
    Translate(#[from] translator::Error),
    #[error("{0}")]
    Configuration(String),
    #[error(transparent)]
    MasterList(#[from] master_list::Error),
    #[error(transparent)]
    Backend(#[from] backend::Error),
    #[error(transparent)]
    TerminalStore(#[from] terminal_store::Error),
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),
}

/// The session protocol engine.
///
/// One instance is constructed at process start and shared by reference;
/// the session store inside it is the only mutable state on the request
/// path.
pub struct EidService {
    config: CoreConfig,
    providers: ProviderRegistry,
    sessions: SessionStore,
    terminals: Arc<dyn TerminalStore>,
    backend: Arc<dyn EcardBackend>,
}

impl EidService {
    pub fn new(
        config: CoreConfig,
        providers: ProviderRegistry,
        terminals: Arc<dyn TerminalStore>,
        backend: Arc<dyn EcardBackend>,
    ) -> Self {
        let sessions = SessionStore::new(config.session.max_sessions, config.session.timeout());
        EidService {
            config,
            providers,
            sessions,
            terminals,
            backend,
        }
    }

    /// Perform a `useID` request for the client identified by
    /// `client_entity_id` (taken from the transport's client certificate).
    pub fn use_id(
        &self,
        request: &EidRequestInput,
        client_entity_id: Option<&str>,
    ) -> EidRequestResponse {
        let provider = client_entity_id.and_then(|id| self.providers.get(id));
        match provider {
            Some(provider) => debug!("identified client {}", provider.entity_id),
            None => error!("use_id() called without a configured client"),
        }

        let request_id = resolve_id(request.request_id.as_deref());
        let session_id = if request.session_id_may_differ {
            resolve_id(request.session_id.as_deref())
        } else {
            request_id.clone()
        };

        let Some(provider) = provider else {
            return EidRequestResponse::error(
                session_id,
                request_id.clone(),
                ResultMinor::InternalError,
                "client is unknown in the configuration",
                format!("<unknown>: {request_id}: "),
            );
        };
        let log_prefix = format!("{}: {}: ", provider.entity_id, request_id);

        if let Some(response) =
            check_request_error(request, &session_id, &request_id, &log_prefix)
        {
            return response;
        }

        let mut session = AuthenticationSession::new(
            session_id.clone(),
            request_id.clone(),
            provider.entity_id.clone(),
        );
        let input = match self.start_ecard_session(request, provider, &session) {
            Ok(input) => input,
            Err(e) => {
                let (minor, message) = match &e {
                    UseIdError::Translate(translator::Error::MissingTerminalRights(attr)) => {
                        (ResultMinor::MissingTerminalRights, attr.to_string())
                    }
                    UseIdError::Translate(translator::Error::MissingArgument(name)) => {
                        (ResultMinor::MissingArgument, (*name).to_string())
                    }
                    other => {
                        info!("{log_prefix}an internal error occurred while processing a request: {other}");
                        (ResultMinor::InternalError, "internal error".to_string())
                    }
                };
                return EidRequestResponse::error(session_id, request_id, minor, message, log_prefix);
            }
        };
        session.input = Some(input);

        if let Err(e) = self.sessions.store(session) {
            return match e {
                store::Error::TooManyOpenSessions => EidRequestResponse::error(
                    session_id,
                    request_id,
                    ResultMinor::TooManyOpenSessions,
                    "too many open sessions",
                    log_prefix,
                ),
                other => {
                    error!("{log_prefix}cannot store session: {other}");
                    EidRequestResponse::error(
                        session_id,
                        request_id,
                        ResultMinor::InternalError,
                        "internal error",
                        log_prefix,
                    )
                }
            };
        }

        EidRequestResponse::ok(
            session_id,
            request_id,
            generate_psk(),
            provider.connector.paos_receiver_url.clone(),
            log_prefix,
        )
    }

    /// Poll for the result of the session opened for `request_id`.
    ///
    /// Counter discipline: the first accepted poll may carry any counter;
    /// every subsequent poll must carry the previous counter plus one, or
    /// the session is burned. A session's result can be collected exactly
    /// once.
    pub fn get_result(&self, request_id: &str, request_counter: u32) -> EidResultResponse {
        debug!("started get_result for {request_id}");
        let unknown_prefix = format!("<unknown>: {request_id}: ");
        let session = match self.sessions.lookup(request_id) {
            Ok(session) => session,
            Err(e) => {
                error!("{unknown_prefix}session lookup failed: {e}");
                return EidResultResponse::error(ResultMinor::InternalError, unknown_prefix);
            }
        };
        let Some(mut session) = session else {
            return EidResultResponse::error(ResultMinor::InvalidSession, unknown_prefix);
        };

        if let Some(previous) = session.sequence_number {
            if request_counter != previous.wrapping_add(1) {
                let _ = self.sessions.remove(request_id);
                return EidResultResponse::error(ResultMinor::InvalidCounter, session.log_prefix);
            }
        }
        session.sequence_number = Some(request_counter);

        if session.result.is_none() {
            let log_prefix = session.log_prefix.clone();
            return match self.sessions.store(session) {
                Ok(()) => EidResultResponse::error(ResultMinor::NoResultYet, log_prefix),
                Err(e) => {
                    error!("{log_prefix}cannot store session: {e}");
                    EidResultResponse::error(ResultMinor::InternalError, log_prefix)
                }
            };
        }

        // the removal is what consumes the result; the store's write lock
        // serializes it, so concurrent polls cannot collect twice
        match self.sessions.remove(request_id) {
            Ok(Some(consumed)) => match consumed.result {
                Some(result) => EidResultResponse::success(result, consumed.log_prefix),
                None => EidResultResponse::error(ResultMinor::InvalidSession, consumed.log_prefix),
            },
            Ok(None) => EidResultResponse::error(ResultMinor::InvalidSession, session.log_prefix),
            Err(e) => {
                error!("{}cannot remove session: {e}", session.log_prefix);
                EidResultResponse::error(ResultMinor::InternalError, session.log_prefix)
            }
        }
    }

    /// Attach the outcome produced by the eCard layer to its session. Called
    /// by the transport's callback handler when the card interaction ends.
    pub fn complete_session(&self, request_id: &str, result: EidResult) -> Result<(), store::Error> {
        self.sessions.attach_result(request_id, result)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.open_sessions()
    }

    /// Resolve terminal data, ingest lists, translate the attribute request
    /// and hand the session to the backend. Single outbound attempt.
    fn start_ecard_session(
        &self,
        request: &EidRequestInput,
        provider: &ServiceProvider,
        session: &AuthenticationSession,
    ) -> Result<SessionInput, UseIdError> {
        let ref_id = &provider.connector.cvc_ref_id;
        let permission = self
            .terminals
            .load(ref_id)?
            .ok_or_else(|| UseIdError::Configuration(format!("no cvc entry for {ref_id}")))?;
        let cvc = permission
            .cvc
            .ok_or_else(|| UseIdError::Configuration("no cvc configured".to_string()))?;
        let defect_list = permission
            .defect_list
            .ok_or_else(|| UseIdError::Configuration("no defect list stored".to_string()))?;
        let master_blob = permission
            .master_list
            .ok_or_else(|| UseIdError::Configuration("no master list stored".to_string()))?;

        let master_list = master_list::ingest(&master_blob, &session.log_prefix)?;
        let chat = cvc.chat;
        let connector = StoreBlacklistConnector::new(
            Arc::clone(&self.terminals),
            ref_id.clone(),
            permission.sector_id.unwrap_or_default(),
        );
        let mut input = SessionInput::new(
            cvc,
            permission.chain,
            session.session_id.clone(),
            Arc::new(connector),
            self.refresh_url(&session.request_id)?,
            self.config.server_url.clone(),
            master_list,
            defect_list,
            request.transaction_info.clone(),
            session.log_prefix.clone(),
        );
        translator::translate(request, &chat, &mut input)?;
        self.backend.start_session(&input)?;
        Ok(input)
    }

    /// The identity provider callback address: server URL plus a fixed path
    /// segment and the URL-encoded request id as reference parameter.
    fn refresh_url(&self, request_id: &str) -> Result<Url, url::ParseError> {
        let base = self.config.server_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{ASYNC_PATH}"))?;
        url.query_pairs_mut()
            .append_pair(REFERENCE_PARAM, request_id);
        Ok(url)
    }
}

fn resolve_id(id: Option<&str>) -> String {
    match id {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

fn generate_psk() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn check_request_error(
    request: &EidRequestInput,
    session_id: &str,
    request_id: &str,
    log_prefix: &str,
) -> Option<EidRequestResponse> {
    let id_length_invalid =
        |id: &str| id.len() < MIN_ID_LENGTH || id.len() > MAX_ID_LENGTH;
    if id_length_invalid(session_id) {
        return Some(EidRequestResponse::error(
            session_id.to_string(),
            request_id.to_string(),
            ResultMinor::MissingArgument,
            format!("the session id has an invalid length of {} bytes", session_id.len()),
            log_prefix.to_string(),
        ));
    }
    if id_length_invalid(request_id) {
        return Some(EidRequestResponse::error(
            session_id.to_string(),
            request_id.to_string(),
            ResultMinor::MissingArgument,
            format!("the request id has an invalid length of {} bytes", request_id.len()),
            log_prefix.to_string(),
        ));
    }
    if request.requests(crate::definitions::EidAttribute::AgeVerification)
        && !matches!(request.requested_min_age, Some(age) if age > 0)
    {
        return Some(EidRequestResponse::error(
            session_id.to_string(),
            request_id.to_string(),
            ResultMinor::MissingArgument,
            "must specify the required age to perform age verification",
            log_prefix.to_string(),
        ));
    }
    if request.requests(crate::definitions::EidAttribute::CommunityIdVerification)
        && request.community_id_pattern.is_none()
    {
        return Some(EidRequestResponse::error(
            session_id.to_string(),
            request_id.to_string(),
            ResultMinor::MissingArgument,
            "must specify the community id to check against",
            log_prefix.to_string(),
        ));
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definitions::{
        Chat, ChatRight, EidAttribute, EpaConnectorConfiguration, TerminalData,
    };
    use crate::pki::store::MemoryTerminalStore;
    use time::macros::datetime;

    struct AcceptingBackend;

    impl EcardBackend for AcceptingBackend {
        fn start_session(&self, _input: &SessionInput) -> Result<(), backend::Error> {
            Ok(())
        }
    }

    fn provider(entity_id: &str, ref_id: &str) -> ServiceProvider {
        ServiceProvider {
            entity_id: entity_id.to_string(),
            connector: EpaConnectorConfiguration {
                cvc_ref_id: ref_id.to_string(),
                paos_receiver_url: "https://sp.example.org/paos".to_string(),
                country_code: "DE".to_string(),
                chr_mnemonic: "TESTeID".to_string(),
            },
        }
    }

    fn service(chat: Chat) -> EidService {
        let terminals = Arc::new(MemoryTerminalStore::new());
        terminals.create("ref-1").unwrap();
        terminals
            .store_cvc(
                "ref-1",
                TerminalData {
                    raw: vec![0x7f, 0x21],
                    holder_reference: "DETESTeID00001".to_string(),
                    chat,
                    not_before: datetime!(2024-01-01 0:00 UTC),
                    not_after: datetime!(2099-01-01 0:00 UTC),
                },
                vec![vec![0x7f, 0x21, 0x01]],
            )
            .unwrap();
        terminals
            .store_master_defect_lists("ref-1", vec![0x30, 0x01, 0x00], vec![0x30, 0x02, 0x00])
            .unwrap();
        EidService::new(
            CoreConfig::default(),
            ProviderRegistry::new([provider("provider-a", "ref-1")]),
            terminals,
            Arc::new(AcceptingBackend),
        )
    }

    #[test]
    fn unknown_client_is_an_internal_error() {
        let service = service(Chat::empty());
        let response = service.use_id(&EidRequestInput::default(), None);
        assert_eq!(response.minor, Some(ResultMinor::InternalError));
        assert!(response.log_prefix.starts_with("<unknown>: "));
        assert_eq!(service.open_sessions(), 0);
    }

    #[test]
    fn short_request_id_fails_before_any_store_interaction() {
        let service = service(Chat::from_rights(&[ChatRight::ReadGivenNames]));
        let request = EidRequestInput {
            request_id: Some("short".to_string()),
            required_fields: vec![EidAttribute::GivenNames],
            ..Default::default()
        };
        let response = service.use_id(&request, Some("provider-a"));
        assert_eq!(response.minor, Some(ResultMinor::MissingArgument));
        assert_eq!(service.open_sessions(), 0);
    }

    #[test]
    fn oversized_request_id_is_rejected() {
        let service = service(Chat::from_rights(&[ChatRight::ReadGivenNames]));
        let request = EidRequestInput {
            request_id: Some("x".repeat(MAX_ID_LENGTH + 1)),
            ..Default::default()
        };
        let response = service.use_id(&request, Some("provider-a"));
        assert_eq!(response.minor, Some(ResultMinor::MissingArgument));
        assert_eq!(service.open_sessions(), 0);
    }

    #[test]
    fn refresh_url_carries_the_reference_parameter() {
        let service = service(Chat::empty());
        let url = service.refresh_url("abc def").unwrap();
        assert_eq!(url.path(), "/gov_autent/async");
        assert_eq!(url.query(), Some("refID=abc+def"));
    }

    #[test]
    fn session_id_equals_request_id_unless_allowed_to_differ() {
        let service = service(Chat::from_rights(&[ChatRight::ReadGivenNames]));
        let request = EidRequestInput {
            request_id: Some("r".repeat(20)),
            session_id: Some("s".repeat(20)),
            required_fields: vec![EidAttribute::GivenNames],
            ..Default::default()
        };
        let response = service.use_id(&request, Some("provider-a"));
        assert!(response.major.is_ok());
        assert_eq!(response.session_id, response.request_id);

        let request = EidRequestInput {
            session_id_may_differ: true,
            ..request
        };
        let response = service.use_id(&request, Some("provider-a"));
        assert!(response.major.is_ok());
        assert_eq!(response.session_id, "s".repeat(20));
        assert_eq!(response.request_id, "r".repeat(20));
    }
}
