//! Clause and argument grammars.
//!
//! ```text
//! clause   := "" | "true" | "false"
//!           | "ptpkh" | "ptpkh:" <n> | "ptpkh:0x" <hash32>
//!           | "0x" <hex> | "@" <path>
//! argument := "" | "true" | "false" | "empty"
//!           | "ptpkh" | "ptpkh:" <n>
//!           | "0x" <hex> | "@" <path>
//! ```
//!
//! Account numbers are one-based. Parsing never touches keys; file
//! references are read eagerly so I/O errors surface here and not halfway
//! through building a transaction.

use std::path::Path;

use super::PredicateError;
use crate::crypto::keys::PubKeyHash;

const PTPKH: &str = "ptpkh";

/// A parsed predicate clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateClause {
    AlwaysTrue,
    AlwaysFalse,
    /// P2PKH bound to the acting account's key.
    ActingAccount,
    /// P2PKH bound to a one-based account number.
    Account(u64),
    /// P2PKH bound to an explicit key hash.
    PubKeyHash(PubKeyHash),
    /// Raw predicate bytes, from hex or a file.
    Bytes(Vec<u8>),
}

/// A parsed predicate argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateArgument {
    /// The empty argument.
    Nil,
    /// Sign with the acting account's key.
    ActingAccount,
    /// Sign with a one-based account number's key.
    Account(u64),
    /// Raw argument bytes, from hex or a file.
    Bytes(Vec<u8>),
}

/// Parses a predicate clause.
pub fn parse_clause(s: &str) -> Result<PredicateClause, PredicateError> {
    match s {
        "" | "true" => return Ok(PredicateClause::AlwaysTrue),
        "false" => return Ok(PredicateClause::AlwaysFalse),
        PTPKH => return Ok(PredicateClause::ActingAccount),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("ptpkh:") {
        if let Some(hash_hex) = rest.strip_prefix("0x") {
            let hash = hex::decode(hash_hex)
                .ok()
                .and_then(|bytes| PubKeyHash::try_from(bytes.as_slice()).ok())
                .ok_or_else(|| PredicateError::InvalidClause(s.to_string()))?;
            return Ok(PredicateClause::PubKeyHash(hash));
        }
        let number = parse_account_number(rest)
            .ok_or_else(|| PredicateError::InvalidClause(s.to_string()))??;
        return Ok(PredicateClause::Account(number));
    }

    if let Some(hex_str) = s.strip_prefix("0x") {
        return decode_hex(hex_str)
            .map(PredicateClause::Bytes)
            .ok_or_else(|| PredicateError::InvalidClause(s.to_string()));
    }

    if let Some(path) = s.strip_prefix('@') {
        return read_file(path).map(PredicateClause::Bytes);
    }

    Err(PredicateError::InvalidClause(s.to_string()))
}

/// Parses a predicate argument.
pub fn parse_argument(s: &str) -> Result<PredicateArgument, PredicateError> {
    match s {
        "" | "empty" | "true" | "false" => return Ok(PredicateArgument::Nil),
        PTPKH => return Ok(PredicateArgument::ActingAccount),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("ptpkh:") {
        let number = parse_account_number(rest)
            .ok_or_else(|| PredicateError::InvalidArgument(s.to_string()))??;
        return Ok(PredicateArgument::Account(number));
    }

    if let Some(hex_str) = s.strip_prefix("0x") {
        return decode_hex(hex_str)
            .map(PredicateArgument::Bytes)
            .ok_or_else(|| PredicateError::InvalidArgument(s.to_string()));
    }

    if let Some(path) = s.strip_prefix('@') {
        return read_file(path).map(PredicateArgument::Bytes);
    }

    Err(PredicateError::InvalidArgument(s.to_string()))
}

/// `None` when `s` is not a number at all; `Some(Err)` when it is one but
/// below 1.
fn parse_account_number(s: &str) -> Option<Result<u64, PredicateError>> {
    let n: i64 = s.parse().ok()?;
    if n < 1 {
        return Some(Err(PredicateError::InvalidAccountNumber(n)));
    }
    Some(Ok(n as u64))
}

/// Non-empty hex only.
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    hex::decode(s).ok().filter(|bytes| !bytes.is_empty())
}

fn read_file(path: &str) -> Result<Vec<u8>, PredicateError> {
    std::fs::read(Path::new(path)).map_err(|source| PredicateError::Io {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn literal_clauses() {
        assert_eq!(parse_clause("").unwrap(), PredicateClause::AlwaysTrue);
        assert_eq!(parse_clause("true").unwrap(), PredicateClause::AlwaysTrue);
        assert_eq!(parse_clause("false").unwrap(), PredicateClause::AlwaysFalse);
        assert_eq!(parse_clause("ptpkh").unwrap(), PredicateClause::ActingAccount);
    }

    #[test]
    fn account_clause_is_one_based() {
        assert_eq!(parse_clause("ptpkh:3").unwrap(), PredicateClause::Account(3));
        assert!(matches!(
            parse_clause("ptpkh:0"),
            Err(PredicateError::InvalidAccountNumber(0))
        ));
        assert!(matches!(
            parse_clause("ptpkh:-2"),
            Err(PredicateError::InvalidAccountNumber(-2))
        ));
        assert!(matches!(
            parse_clause("ptpkh:abc"),
            Err(PredicateError::InvalidClause(_))
        ));
    }

    #[test]
    fn explicit_hash_clause() {
        let hash = [0x5Au8; 32];
        let clause = parse_clause(&format!("ptpkh:0x{}", hex::encode(hash))).unwrap();
        assert_eq!(clause, PredicateClause::PubKeyHash(hash));
        assert!(matches!(
            parse_clause("ptpkh:0x0102"),
            Err(PredicateError::InvalidClause(_))
        ));
    }

    #[test]
    fn hex_clause_roundtrips_exact_bytes() {
        let bytes = vec![0x83, 0x02, 0xde, 0xad, 0xbe, 0xef];
        let clause = parse_clause(&format!("0x{}", hex::encode(&bytes))).unwrap();
        assert_eq!(clause, PredicateClause::Bytes(bytes));
        assert!(parse_clause("0x").is_err());
        assert!(parse_clause("0xnothex").is_err());
    }

    #[test]
    fn file_clause_reads_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        let clause = parse_clause(&format!("@{}", file.path().display())).unwrap();
        assert_eq!(clause, PredicateClause::Bytes(vec![1, 2, 3]));

        assert!(matches!(
            parse_clause("@/definitely/not/here"),
            Err(PredicateError::Io { .. })
        ));
    }

    #[test]
    fn unknown_clause_rejected() {
        assert!(matches!(
            parse_clause("bogus"),
            Err(PredicateError::InvalidClause(_))
        ));
    }

    #[test]
    fn argument_grammar() {
        for nil in ["", "empty", "true", "false"] {
            assert_eq!(parse_argument(nil).unwrap(), PredicateArgument::Nil);
        }
        assert_eq!(parse_argument("ptpkh").unwrap(), PredicateArgument::ActingAccount);
        assert_eq!(parse_argument("ptpkh:2").unwrap(), PredicateArgument::Account(2));
        assert_eq!(
            parse_argument("0x0a0b").unwrap(),
            PredicateArgument::Bytes(vec![0x0a, 0x0b])
        );
        assert!(matches!(
            parse_argument("ptpkh:0"),
            Err(PredicateError::InvalidAccountNumber(0))
        ));
        assert!(matches!(
            parse_argument(&format!("ptpkh:0x{}", hex::encode([1u8; 32]))),
            Err(PredicateError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_argument("what"),
            Err(PredicateError::InvalidArgument(_))
        ));
    }
}
