//! Client-side checks on token metadata.
//!
//! Everything here runs before the wallet touches the network. The checks
//! are cheap and ordered so the first violated limit is the one reported.

use thiserror::Error;

use crate::config::{
    MAX_DECIMAL_PLACES, MAX_ICON_DATA_LENGTH, MAX_ICON_TYPE_LENGTH, MAX_NAME_LENGTH,
    MAX_NFT_DATA_LENGTH, MAX_NFT_NAME_LENGTH, MAX_SYMBOL_LENGTH, MAX_URI_LENGTH,
};
use crate::unit::{Icon, TokenKind, TypeId, UnitId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A request the wallet refuses to build.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A text or byte field exceeds its limit.
    #[error("{field} is too long: {len} bytes, at most {max} allowed")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("decimal places {value} exceed the maximum of {max}")]
    DecimalPlaces { value: u32, max: u32 },

    #[error("subtype decimal places {value} must equal parent's {parent}")]
    ParentDecimalsMismatch { value: u32, parent: u32 },

    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The unit ID does not carry the tag of the expected unit class.
    #[error("unit ID {id} is not a valid {expected} ID")]
    InvalidUnitId { id: UnitId, expected: &'static str },

    #[error("unit ID {0} is already in use")]
    UnitIdInUse(UnitId),

    /// Parent type is of the other token kind.
    #[error("parent type {parent} is not a {kind} type")]
    ParentKindMismatch { parent: TypeId, kind: TokenKind },

    #[error("amount must be positive")]
    ZeroAmount,
}

// ---------------------------------------------------------------------------
// Field checks
// ---------------------------------------------------------------------------

fn max_len(field: &'static str, len: usize, max: usize) -> Result<(), ValidationError> {
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

/// Symbol, name and icon of a new token type.
pub fn validate_type_metadata(
    symbol: &str,
    name: &str,
    icon: &Icon,
) -> Result<(), ValidationError> {
    max_len("symbol", symbol.len(), MAX_SYMBOL_LENGTH)?;
    max_len("name", name.len(), MAX_NAME_LENGTH)?;
    max_len("icon type", icon.icon_type.len(), MAX_ICON_TYPE_LENGTH)?;
    max_len("icon data", icon.data.len(), MAX_ICON_DATA_LENGTH)
}

pub fn validate_decimal_places(value: u32) -> Result<(), ValidationError> {
    if value > MAX_DECIMAL_PLACES {
        return Err(ValidationError::DecimalPlaces {
            value,
            max: MAX_DECIMAL_PLACES,
        });
    }
    Ok(())
}

/// Name, URI and data of a new NFT.
pub fn validate_nft_metadata(name: &str, uri: &str, data: &[u8]) -> Result<(), ValidationError> {
    max_len("NFT name", name.len(), MAX_NFT_NAME_LENGTH)?;
    validate_uri(uri)?;
    validate_nft_data(data)
}

pub fn validate_nft_data(data: &[u8]) -> Result<(), ValidationError> {
    max_len("NFT data", data.len(), MAX_NFT_DATA_LENGTH)
}

/// An NFT URI must be empty or an absolute URI.
pub fn validate_uri(uri: &str) -> Result<(), ValidationError> {
    max_len("URI", uri.len(), MAX_URI_LENGTH)?;
    if uri.is_empty() {
        return Ok(());
    }
    url::Url::parse(uri)
        .map(|_| ())
        .map_err(|e| ValidationError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Unit ID checks
// ---------------------------------------------------------------------------

pub fn check_type_id(id: &TypeId, kind: TokenKind) -> Result<(), ValidationError> {
    check_tag(id, kind.type_tag(), "token type")
}

pub fn check_token_id(id: &UnitId, kind: TokenKind) -> Result<(), ValidationError> {
    check_tag(id, kind.token_tag(), "token")
}

fn check_tag(id: &UnitId, tag: u8, expected: &'static str) -> Result<(), ValidationError> {
    if !id.has_tag(tag) {
        return Err(ValidationError::InvalidUnitId {
            id: id.clone(),
            expected,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{FUNGIBLE_TOKEN_TYPE_TAG, NFT_TAG};

    #[test]
    fn type_metadata_limits() {
        let icon = Icon {
            icon_type: "image/svg+xml".into(),
            data: vec![0u8; 10],
        };
        assert!(validate_type_metadata("TT", "Test", &icon).is_ok());
        assert!(validate_type_metadata(&"S".repeat(16), &"N".repeat(256), &icon).is_ok());

        assert_eq!(
            validate_type_metadata(&"S".repeat(17), "Test", &icon),
            Err(ValidationError::TooLong {
                field: "symbol",
                len: 17,
                max: 16
            })
        );
        assert!(matches!(
            validate_type_metadata("TT", &"N".repeat(257), &icon),
            Err(ValidationError::TooLong { field: "name", .. })
        ));

        let big_icon = Icon {
            icon_type: "image/png".into(),
            data: vec![0u8; MAX_ICON_DATA_LENGTH + 1],
        };
        assert!(matches!(
            validate_type_metadata("TT", "Test", &big_icon),
            Err(ValidationError::TooLong { field: "icon data", .. })
        ));
    }

    #[test]
    fn decimal_places_capped() {
        assert!(validate_decimal_places(0).is_ok());
        assert!(validate_decimal_places(8).is_ok());
        assert_eq!(
            validate_decimal_places(9),
            Err(ValidationError::DecimalPlaces { value: 9, max: 8 })
        );
    }

    #[test]
    fn nft_uri_must_parse_when_present() {
        assert!(validate_uri("").is_ok());
        assert!(validate_uri("https://example.com/nft/1.json").is_ok());
        assert!(validate_uri("ipfs://bafybeigdyrzt").is_ok());
        assert!(matches!(
            validate_uri("not a uri"),
            Err(ValidationError::InvalidUri { .. })
        ));

        let long = format!("https://example.com/{}", "a".repeat(MAX_URI_LENGTH));
        assert!(matches!(
            validate_uri(&long),
            Err(ValidationError::TooLong { field: "URI", .. })
        ));
    }

    #[test]
    fn nft_metadata_limits() {
        assert!(validate_nft_metadata("cat", "", &[1, 2, 3]).is_ok());
        assert!(matches!(
            validate_nft_metadata(&"n".repeat(257), "", &[]),
            Err(ValidationError::TooLong { field: "NFT name", .. })
        ));
        assert!(matches!(
            validate_nft_metadata("cat", "", &vec![0u8; MAX_NFT_DATA_LENGTH + 1]),
            Err(ValidationError::TooLong { field: "NFT data", .. })
        ));
    }

    #[test]
    fn unit_id_tags_checked() {
        let type_id = UnitId::random(FUNGIBLE_TOKEN_TYPE_TAG);
        assert!(check_type_id(&type_id, TokenKind::Fungible).is_ok());
        assert!(matches!(
            check_type_id(&type_id, TokenKind::NonFungible),
            Err(ValidationError::InvalidUnitId { .. })
        ));

        let nft = UnitId::random(NFT_TAG);
        assert!(check_token_id(&nft, TokenKind::NonFungible).is_ok());
        assert!(check_token_id(&nft, TokenKind::Fungible).is_err());
    }
}
