//! Utility functions for ids and storage keys

use super::leave::Day;
use bech32::Bech32m;
use chrono::Datelike;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

// big endian so the tree iterates in id order
pub fn request_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Composite key `a \0 b`. Identifiers are checked for NUL before they get here.
pub fn pair_key(a: &str, b: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(a.len() + b.len() + 1);
    key.extend_from_slice(a.as_bytes());
    key.push(0);
    key.extend_from_slice(b.as_bytes());
    key
}

/// Id stored in the trailing eight bytes of an index key.
pub fn request_id_suffix(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

// sign bit flipped so byte order matches date order
pub fn day_key(day: Day) -> [u8; 4] {
    ((day.date().num_days_from_ce() as u32) ^ 0x8000_0000).to_be_bytes()
}

/// `subject \0 leave_type \0 id`, so a prefix scan finds every entry of the pair.
pub fn pending_key(subject: &str, leave_type: &str, id: u64) -> Vec<u8> {
    let mut key = pending_prefix(subject, leave_type);
    key.extend_from_slice(&request_key(id));
    key
}

pub fn pending_prefix(subject: &str, leave_type: &str) -> Vec<u8> {
    let mut key = pair_key(subject, leave_type);
    key.push(0);
    key
}

/// Last day of the leave followed by the id.
pub fn away_key(end: Day, id: u64) -> Vec<u8> {
    let mut key = day_key(end).to_vec();
    key.extend_from_slice(&request_key(id));
    key
}

pub fn encode_days(days: u32) -> [u8; 4] {
    days.to_be_bytes()
}

pub fn decode_days(bytes: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}
