//! Authentication core of an eID middleware.
//!
//! Two halves share one data model: the session protocol engine in
//! [`protocol`] runs the `useID`/`getResult` exchange with relying parties,
//! and the lifecycle manager in [`pki`] keeps the terminal's card verifiable
//! certificates and revocation/trust lists current. The [`definitions`]
//! module holds the attribute vocabulary, the certificate holder
//! authorization template and the per-session input both halves agree on.
//!
//! The crate contains no transport: SOAP/PAOS unmarshalling, TLS and the
//! administration surface live in the embedding server, which hands the
//! engine plain request values and serializes its responses.

pub mod backend;
pub mod config;
pub mod definitions;
pub mod master_list;
pub mod pki;
pub mod protocol;

pub use config::CoreConfig;
pub use protocol::EidService;
