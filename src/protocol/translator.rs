//! Translation of a requested attribute set against the terminal's CHAT.

use crate::definitions::{Chat, EidAttribute, SessionInput};

use super::request::EidRequestInput;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The terminal's certificate does not authorize the named attribute.
    #[error("terminal is not authorized to request {0}")]
    MissingTerminalRights(EidAttribute),
    /// A parametric attribute was requested without its parameter.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
}

/// Fill the attribute configuration of `input` from the request, checking
/// every attribute against the terminal authorization.
///
/// Required attributes are processed before optional ones, both in caller
/// order; the order only decides which failure is reported first. Pure
/// apart from building up `input`.
pub(crate) fn translate(
    request: &EidRequestInput,
    chat: &Chat,
    input: &mut SessionInput,
) -> Result<(), Error> {
    for &attribute in &request.required_fields {
        translate_one(request, chat, input, attribute, true)?;
    }
    for &attribute in &request.optional_fields {
        translate_one(request, chat, input, attribute, false)?;
    }
    Ok(())
}

fn translate_one(
    request: &EidRequestInput,
    chat: &Chat,
    input: &mut SessionInput,
    attribute: EidAttribute,
    required: bool,
) -> Result<(), Error> {
    if !chat.permits(attribute) {
        return Err(Error::MissingTerminalRights(attribute));
    }
    match attribute {
        EidAttribute::AgeVerification => match request.requested_min_age {
            Some(min_age) if min_age > 0 => input.set_age_verification(min_age, required),
            _ => return Err(Error::MissingArgument("RequestedMinAge")),
        },
        EidAttribute::CommunityIdVerification => match &request.community_id_pattern {
            Some(pattern) => input.set_community_id_verification(pattern.clone(), required),
            None => return Err(Error::MissingArgument("CommunityIDPattern")),
        },
        _ if required => input.add_required_field(attribute),
        _ => input.add_optional_field(attribute),
    }
    Ok(())
}
