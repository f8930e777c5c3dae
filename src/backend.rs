//! Outbound interface to the eCard identity backend.

use crate::definitions::SessionInput;

#[derive(Debug, thiserror::Error)]
#[error("eCard backend did not accept the session: {0}")]
pub struct Error(pub String);

/// The identity backend that drives the actual card interaction.
///
/// `start_session` is invoked exactly once per `useID` call; the core does
/// not retry on failure, it surfaces an internal error to the caller.
pub trait EcardBackend: Send + Sync {
    fn start_session(&self, input: &SessionInput) -> Result<(), Error>;
}
