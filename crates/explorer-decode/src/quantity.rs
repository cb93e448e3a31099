//! Parsing of hex-encoded JSON-RPC quantities and data.
//!
//! Wide quantities go through `U256` and come out as base-10 strings;
//! hashes, addresses and byte strings are validated and lowercased.

use alloy::primitives::{hex, Address, B256, U256};

use crate::error::DecodeError;

fn digits<'a>(field: &'static str, value: &'a str) -> Result<&'a str, DecodeError> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) if !digits.is_empty() => Ok(digits),
        _ => Err(DecodeError::malformed(field, value)),
    }
}

/// Hex quantity that must fit 64 bits (numbers, timestamps, indices).
pub fn parse_u64(field: &'static str, value: &str) -> Result<u64, DecodeError> {
    u64::from_str_radix(digits(field, value)?, 16).map_err(|_| DecodeError::malformed(field, value))
}

/// Hex quantity of any width, rendered in base 10.
pub fn parse_decimal(field: &'static str, value: &str) -> Result<String, DecodeError> {
    let digits = digits(field, value)?;
    U256::from_str_radix(digits, 16)
        .map(|n| n.to_string())
        .map_err(|_| DecodeError::malformed(field, value))
}

/// Like [`parse_decimal`], empty when the node omitted the field.
pub fn parse_optional_decimal(
    field: &'static str,
    value: Option<&str>,
) -> Result<String, DecodeError> {
    value
        .map(|v| parse_decimal(field, v))
        .transpose()
        .map(Option::unwrap_or_default)
}

pub fn normalize_hash(field: &'static str, value: &str) -> Result<String, DecodeError> {
    value
        .parse::<B256>()
        .map(hex::encode_prefixed)
        .map_err(|_| DecodeError::malformed(field, value))
}

pub fn normalize_address(field: &'static str, value: &str) -> Result<String, DecodeError> {
    value
        .parse::<Address>()
        .map(hex::encode_prefixed)
        .map_err(|_| DecodeError::malformed(field, value))
}

/// Empty and `null`-ish addresses (some nodes send `""`) become `None`.
pub fn normalize_optional_address(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<String>, DecodeError> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => normalize_address(field, v).map(Some),
    }
}

/// Arbitrary-length byte string, validated and re-encoded with `0x`.
pub fn normalize_data(field: &'static str, value: &str) -> Result<String, DecodeError> {
    decode_bytes(field, value).map(hex::encode_prefixed)
}

pub fn decode_bytes(field: &'static str, value: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(value).map_err(|_| DecodeError::malformed(field, value))
}
