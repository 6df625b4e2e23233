//! Cache Record Module
//!
//! Defines the on-disk layout of a single file-backed cache record.
//!
//! ```text
//! <?php\n//  TTL(12)  CREATED(12)  payload...  \n?>
//! ```
//!
//! Both numeric fields are zero-padded decimal text with no delimiter.
//! The marker pair keeps the file inert if it is ever handed to a script
//! interpreter, and lets an empty or truncated file be told apart from a
//! real record.

use chrono::Utc;

use crate::backend::{MISSING, NEVER_EXPIRE};

// == Format Constants ==
/// Marker written before the numeric fields.
pub const HEADER: &[u8] = b"<?php\n//";
/// Marker written after the payload.
pub const TRAILER: &[u8] = b"\n?>";
/// Width of each numeric field, sign included.
pub const FIELD_WIDTH: usize = 12;
/// Largest TTL that still fits the fixed-width field.
pub const MAX_TTL: i64 = 999_999_999_999;

const TTL_START: usize = HEADER.len();
const CREATED_START: usize = TTL_START + FIELD_WIDTH;
const PAYLOAD_START: usize = CREATED_START + FIELD_WIDTH;

// == Cache Record ==
/// A decoded record: expiry, last write time and the raw value bytes.
///
/// Remaining TTL is never stored; it is derived from `expire_seconds`,
/// `created_at` and the current clock every time it is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// Lifetime in seconds counted from `created_at`, `-1` = never expires
    pub expire_seconds: i64,
    /// Unix seconds of the last write
    pub created_at: u64,
    /// Serialized value
    pub payload: Vec<u8>,
}

impl CacheRecord {
    // == Constructors ==
    /// Creates a record stamped with the current time.
    pub fn new(payload: Vec<u8>, expire_seconds: i64) -> Self {
        Self::at(payload, expire_seconds, current_timestamp())
    }

    /// Creates a record with an explicit creation timestamp.
    pub fn at(payload: Vec<u8>, expire_seconds: i64, created_at: u64) -> Self {
        Self {
            expire_seconds,
            created_at,
            payload,
        }
    }

    // == Encode ==
    /// Renders the record into its exact on-disk bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(PAYLOAD_START + self.payload.len() + TRAILER.len());
        out.extend_from_slice(HEADER);
        out.extend_from_slice(format!("{:012}", self.expire_seconds).as_bytes());
        out.extend_from_slice(format!("{:012}", self.created_at).as_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(TRAILER);
        out
    }

    // == Decode ==
    /// Parses on-disk bytes back into a record.
    ///
    /// Returns `None` for empty, truncated or foreign content; callers treat
    /// that exactly like a missing key.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PAYLOAD_START + TRAILER.len()
            || !bytes.starts_with(HEADER)
            || !bytes.ends_with(TRAILER)
        {
            return None;
        }

        let expire_seconds = parse_field::<i64>(&bytes[TTL_START..CREATED_START])?;
        let created_at = parse_field::<u64>(&bytes[CREATED_START..PAYLOAD_START])?;
        let payload = bytes[PAYLOAD_START..bytes.len() - TRAILER.len()].to_vec();

        Some(Self {
            expire_seconds,
            created_at,
            payload,
        })
    }

    // == Remaining Lifetime ==
    /// Remaining seconds at `now`.
    ///
    /// # Returns
    /// - `Some(-1)` if the record never expires
    /// - `Some(n)` with `n > 0` if the record is still live
    /// - `None` once the lifetime has fully elapsed
    pub fn remaining_at(&self, now: u64) -> Option<i64> {
        if self.expire_seconds == NEVER_EXPIRE {
            return Some(NEVER_EXPIRE);
        }
        let remaining =
            self.created_at as i128 + self.expire_seconds as i128 - now as i128;
        if remaining > 0 {
            Some(remaining.min(MAX_TTL as i128) as i64)
        } else {
            None
        }
    }

    /// Checks whether the record has expired at `now`.
    ///
    /// A record whose lifetime elapses exactly at `now` is already expired.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.remaining_at(now).is_none()
    }

    /// Checks whether the record has expired against the current clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp())
    }

    /// TTL as reported to callers: `-1`, seconds remaining, or `-2` once expired.
    pub fn ttl(&self) -> i64 {
        self.remaining_at(current_timestamp()).unwrap_or(MISSING)
    }
}

fn parse_field<T: std::str::FromStr>(field: &[u8]) -> Option<T> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

// == Utility Functions ==
/// Returns the current Unix timestamp in whole seconds.
pub fn current_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let record = CacheRecord::at(b"value_of_cache".to_vec(), 30, 1_700_000_000);
        let bytes = record.encode();

        let expected = concat!(
            "<?php\n//",
            "000000000030",
            "001700000000",
            "value_of_cache",
            "\n?>"
        );
        assert_eq!(bytes, expected.as_bytes());
    }

    #[test]
    fn test_encode_never_expire_keeps_field_width() {
        let record = CacheRecord::at(b"1".to_vec(), NEVER_EXPIRE, 42);
        let bytes = record.encode();

        assert_eq!(&bytes[8..20], b"-00000000001");
        assert_eq!(&bytes[20..32], b"000000000042");
        assert_eq!(CacheRecord::decode(&bytes), Some(record));
    }

    #[test]
    fn test_decode_empty_payload() {
        let record = CacheRecord::at(Vec::new(), 5, 10);
        let decoded = CacheRecord::decode(&record.encode()).unwrap();

        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.expire_seconds, 5);
    }

    #[test]
    fn test_decode_binary_payload_containing_markers() {
        let payload = b"\n?>\x00<?php\n//".to_vec();
        let record = CacheRecord::at(payload.clone(), 60, 99);

        assert_eq!(CacheRecord::decode(&record.encode()).unwrap().payload, payload);
    }

    #[test]
    fn test_decode_rejects_empty_file() {
        assert!(CacheRecord::decode(b"").is_none());
    }

    #[test]
    fn test_decode_rejects_missing_markers() {
        let mut bytes = CacheRecord::at(b"x".to_vec(), 5, 10).encode();
        bytes.pop();
        assert!(CacheRecord::decode(&bytes).is_none());

        assert!(CacheRecord::decode(b"plain text that is long enough to pass length").is_none());
    }

    #[test]
    fn test_decode_rejects_non_numeric_fields() {
        let bytes = b"<?php\n//00000000abcd000000000010x\n?>";
        assert!(CacheRecord::decode(bytes).is_none());
    }

    #[test]
    fn test_remaining_at() {
        let record = CacheRecord::at(Vec::new(), 10, 1_000);

        assert_eq!(record.remaining_at(1_000), Some(10));
        assert_eq!(record.remaining_at(1_009), Some(1));
        assert_eq!(record.remaining_at(1_010), None);
        assert_eq!(record.remaining_at(2_000), None);
    }

    #[test]
    fn test_never_expire_ignores_clock() {
        let record = CacheRecord::at(Vec::new(), NEVER_EXPIRE, 0);

        assert_eq!(record.remaining_at(u32::MAX as u64), Some(NEVER_EXPIRE));
        assert!(!record.is_expired());
        assert_eq!(record.ttl(), NEVER_EXPIRE);
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let record = CacheRecord::new(b"v".to_vec(), 0);

        assert!(record.is_expired());
        assert_eq!(record.ttl(), MISSING);
    }

    #[test]
    fn test_fresh_record_ttl_bounds() {
        let record = CacheRecord::new(b"v".to_vec(), 100);
        let ttl = record.ttl();

        assert!(ttl > 0 && ttl <= 100, "unexpected ttl {ttl}");
    }
}
