use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

use super::attributes::EidAttribute;

/// One capability bit of a Certificate Holder Authorization Template.
///
/// The read rights cover the card's data groups; the authenticate rights
/// cover the on-card verification functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter)]
#[repr(u8)]
pub enum ChatRight {
    ReadDocumentType = 0,
    ReadIssuingState,
    ReadDateOfExpiry,
    ReadGivenNames,
    ReadFamilyNames,
    ReadArtisticName,
    ReadAcademicTitle,
    ReadDateOfBirth,
    ReadPlaceOfBirth,
    ReadNationality,
    ReadSex,
    ReadOptionalDataR,
    ReadBirthName,
    ReadWrittenSignature,
    ReadDateOfIssuance,
    ReadPlaceOfResidence,
    ReadCommunityId,
    ReadResidencePermitI,
    ReadResidencePermitII,
    ReadPhoneNumber,
    ReadEmailAddress,
    AuthenticateRestrictedIdentification,
    AuthenticateAgeVerification,
    AuthenticateCommunityIdVerification,
}

/// Certificate Holder Authorization Template: the capability bitmap carried
/// by a CVC. Immutable for the life of the certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat(u64);

impl Chat {
    pub const fn empty() -> Self {
        Chat(0)
    }

    pub fn from_rights(rights: &[ChatRight]) -> Self {
        let mut chat = Chat(0);
        for right in rights {
            chat.0 |= 1 << (*right as u8);
        }
        chat
    }

    pub fn from_bits(bits: u64) -> Self {
        Chat(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn has(&self, right: ChatRight) -> bool {
        self.0 & (1 << (right as u8)) != 0
    }

    /// Whether the holder of this CHAT is authorized to request `attribute`.
    ///
    /// Attributes without a mapped right (document validity) are never
    /// authorized.
    pub fn permits(&self, attribute: EidAttribute) -> bool {
        match attribute.required_right() {
            Some(right) => self.has(right),
            None => false,
        }
    }
}
