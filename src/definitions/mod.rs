//! Data model of the authentication core: the attribute vocabulary, the
//! certificate holder authorization template, terminal PKI state and the
//! resolved per-session input.

pub mod attributes;
pub mod chat;
pub mod service_provider;
pub mod session_input;
pub mod terminal;

pub use attributes::EidAttribute;
pub use chat::{Chat, ChatRight};
pub use service_provider::{EpaConnectorConfiguration, ProviderRegistry, ServiceProvider};
pub use session_input::{
    AgeVerification, BlacklistConnector, BlacklistError, CommunityIdVerification, SessionInput,
};
pub use terminal::{
    Blacklist, CvcChain, PendingCertRequest, RenewalLease, RenewalTask, TerminalData,
    TerminalPermission,
};
