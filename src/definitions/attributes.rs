use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use super::chat::ChatRight;

/// The fixed vocabulary of data groups and verification functions a service
/// provider may request from an identity card.
///
/// Most attributes are plain data groups read off the chip. Two entries are
/// parametric pseudo-attributes: [`EidAttribute::AgeVerification`] carries a
/// minimum age and [`EidAttribute::CommunityIdVerification`] carries a
/// community-id pattern; both are checked on-card and only a boolean result
/// leaves the chip.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumIter,
)]
pub enum EidAttribute {
    DocumentType,
    IssuingState,
    DateOfExpiry,
    GivenNames,
    FamilyNames,
    ArtisticName,
    AcademicTitle,
    DateOfBirth,
    PlaceOfBirth,
    Nationality,
    Sex,
    OptionalDataR,
    BirthName,
    WrittenSignature,
    DateOfIssuance,
    PlaceOfResidence,
    CommunityId,
    ResidencePermitI,
    ResidencePermitII,
    PhoneNumber,
    EmailAddress,
    DocumentValidity,
    RestrictedId,
    AgeVerification,
    CommunityIdVerification,
}

impl EidAttribute {
    /// The certificate holder authorization a terminal must carry to request
    /// this attribute.
    ///
    /// This table is the single source of truth for the attribute-to-CHAT
    /// mapping; a test iterates the whole vocabulary to keep it total.
    /// `DocumentValidity` has no corresponding right and can never be
    /// authorized.
    pub fn required_right(&self) -> Option<ChatRight> {
        use ChatRight::*;
        match self {
            EidAttribute::DocumentType => Some(ReadDocumentType),
            EidAttribute::IssuingState => Some(ReadIssuingState),
            EidAttribute::DateOfExpiry => Some(ReadDateOfExpiry),
            EidAttribute::GivenNames => Some(ReadGivenNames),
            EidAttribute::FamilyNames => Some(ReadFamilyNames),
            EidAttribute::ArtisticName => Some(ReadArtisticName),
            EidAttribute::AcademicTitle => Some(ReadAcademicTitle),
            EidAttribute::DateOfBirth => Some(ReadDateOfBirth),
            EidAttribute::PlaceOfBirth => Some(ReadPlaceOfBirth),
            EidAttribute::Nationality => Some(ReadNationality),
            EidAttribute::Sex => Some(ReadSex),
            EidAttribute::OptionalDataR => Some(ReadOptionalDataR),
            EidAttribute::BirthName => Some(ReadBirthName),
            EidAttribute::WrittenSignature => Some(ReadWrittenSignature),
            EidAttribute::DateOfIssuance => Some(ReadDateOfIssuance),
            EidAttribute::PlaceOfResidence => Some(ReadPlaceOfResidence),
            EidAttribute::CommunityId => Some(ReadCommunityId),
            EidAttribute::ResidencePermitI => Some(ReadResidencePermitI),
            EidAttribute::ResidencePermitII => Some(ReadResidencePermitII),
            EidAttribute::PhoneNumber => Some(ReadPhoneNumber),
            EidAttribute::EmailAddress => Some(ReadEmailAddress),
            EidAttribute::DocumentValidity => None,
            EidAttribute::RestrictedId => Some(AuthenticateRestrictedIdentification),
            EidAttribute::AgeVerification => Some(AuthenticateAgeVerification),
            EidAttribute::CommunityIdVerification => Some(AuthenticateCommunityIdVerification),
        }
    }

    /// Whether this attribute needs an extra request parameter to be usable.
    pub fn is_parametric(&self) -> bool {
        matches!(
            self,
            EidAttribute::AgeVerification | EidAttribute::CommunityIdVerification
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_attribute_has_a_table_row() {
        // DocumentValidity is the only entry deliberately mapped to no right.
        for attr in EidAttribute::iter() {
            match attr {
                EidAttribute::DocumentValidity => assert!(attr.required_right().is_none()),
                _ => assert!(
                    attr.required_right().is_some(),
                    "no CHAT right mapped for {attr}"
                ),
            }
        }
    }

    #[test]
    fn parametric_attributes() {
        assert!(EidAttribute::AgeVerification.is_parametric());
        assert!(EidAttribute::CommunityIdVerification.is_parametric());
        assert!(!EidAttribute::GivenNames.is_parametric());
    }
}
