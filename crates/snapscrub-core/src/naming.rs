// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifier generation and validation.
//!
//! Every temporary resource of one execution shares a random 16-hex-char
//! suffix. Identifiers must satisfy the engine's naming rules before any
//! mutating call is issued.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::RngCore;
use std::fmt;

use crate::error::{Result, WorkflowError};

/// Maximum identifier length accepted by the engine.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Temp prefix used when the caller does not supply one.
pub const DEFAULT_TEMP_PREFIX: &str = "sanitize";

/// Naming rule broken by an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingViolation {
    /// Longer than [`MAX_IDENTIFIER_LEN`].
    TooLong,
    /// First character is not an ASCII letter (or the identifier is empty).
    NoLeadingLetter,
    /// Contains `--`.
    ConsecutiveHyphens,
}

impl fmt::Display for NamingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong => write!(f, "is too long"),
            Self::NoLeadingLetter => write!(f, "does not start with a letter"),
            Self::ConsecutiveHyphens => write!(f, "contains two consecutive hyphens"),
        }
    }
}

/// Check an identifier against the naming rules.
///
/// When several rules are broken, the most specific one wins:
/// consecutive hyphens, then the leading letter, then length.
pub fn validate_identifier(value: &str) -> std::result::Result<(), NamingViolation> {
    if value.contains("--") {
        return Err(NamingViolation::ConsecutiveHyphens);
    }
    if !value
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
    {
        return Err(NamingViolation::NoLeadingLetter);
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(NamingViolation::TooLong);
    }
    Ok(())
}

/// Validate `value` and attribute a violation to the context field `field`.
pub fn check_identifier(field: &'static str, value: &str) -> Result<()> {
    validate_identifier(value).map_err(|reason| WorkflowError::InvalidIdentifier {
        field,
        value: value.to_string(),
        reason,
    })
}

/// 8 random bytes, hex encoded.
pub fn random_suffix() -> String {
    random_hex::<8>()
}

/// 16 random bytes, hex encoded.
pub fn random_password() -> String {
    random_hex::<16>()
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `{prefix}-{YYYY}{MM}{DD}{hh}{mm}` in UTC.
pub fn target_snapshot_id(prefix: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{:04}{:02}{:02}{:02}{:02}",
        prefix,
        at.year(),
        at.month(),
        at.day(),
        at.hour(),
        at.minute()
    )
}

/// Identifiers of the temporary resources of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempNames {
    /// Snapshot of the source database.
    pub snapshot: String,
    /// Copy of `snapshot` re-encrypted under the caller's key.
    pub encrypted_snapshot: String,
    /// Temporary database (cluster or instance) restored from the snapshot.
    pub database: String,
    /// Writer instance inside the temporary cluster.
    pub instance: String,
}

impl TempNames {
    /// Derive all temp identifiers from a prefix and a shared suffix.
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self {
            snapshot: format!("{prefix}-{suffix}"),
            encrypted_snapshot: format!("{prefix}-enc-{suffix}"),
            database: format!("{prefix}-{suffix}"),
            instance: format!("{prefix}-inst-{suffix}"),
        }
    }

    /// Validate in context order; the first violation aborts.
    pub fn validate(&self) -> Result<()> {
        check_identifier("temp_snapshot_id", &self.snapshot)?;
        check_identifier("temp_enc_snapshot_id", &self.encrypted_snapshot)?;
        check_identifier("temp_db_id", &self.database)?;
        check_identifier("temp_db_instance_id", &self.instance)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_identifier_rules() {
        assert_eq!(validate_identifier("sanitize-abc"), Ok(()));
        assert_eq!(
            validate_identifier(""),
            Err(NamingViolation::NoLeadingLetter)
        );
        assert_eq!(
            validate_identifier("1db"),
            Err(NamingViolation::NoLeadingLetter)
        );
        assert_eq!(
            validate_identifier("db--x"),
            Err(NamingViolation::ConsecutiveHyphens)
        );
        assert_eq!(
            validate_identifier(&"a".repeat(64)),
            Err(NamingViolation::TooLong)
        );
        assert_eq!(validate_identifier(&"a".repeat(63)), Ok(()));
    }

    #[test]
    fn test_validate_identifier_priority() {
        // Too long, bad first char and double hyphen at once.
        let value = format!("-{}--", "a".repeat(70));
        assert_eq!(
            validate_identifier(&value),
            Err(NamingViolation::ConsecutiveHyphens)
        );
        let value = format!("9{}", "a".repeat(70));
        assert_eq!(
            validate_identifier(&value),
            Err(NamingViolation::NoLeadingLetter)
        );
    }

    #[test]
    fn test_random_suffix_and_password_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

        let password = random_password();
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random_password(), password);
    }

    #[test]
    fn test_target_snapshot_id_is_zero_padded_utc() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 4, 5, 59).unwrap();
        assert_eq!(target_snapshot_id("orders", at), "orders-202403070405");

        let at = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(target_snapshot_id("orders", at), "orders-202312312359");
    }

    #[test]
    fn test_temp_names_share_suffix() {
        let names = TempNames::new("sanitize", "0123456789abcdef");
        assert_eq!(names.snapshot, "sanitize-0123456789abcdef");
        assert_eq!(names.encrypted_snapshot, "sanitize-enc-0123456789abcdef");
        assert_eq!(names.database, "sanitize-0123456789abcdef");
        assert_eq!(names.instance, "sanitize-inst-0123456789abcdef");
        assert!(names.validate().is_ok());
    }

    #[test]
    fn test_temp_names_report_first_failing_field() {
        // 42 + "-inst-" + 16 = 64, every other name fits.
        let names = TempNames::new(&"p".repeat(42), "0123456789abcdef");
        match names.validate() {
            Err(WorkflowError::InvalidIdentifier { field, reason, .. }) => {
                assert_eq!(field, "temp_db_instance_id");
                assert_eq!(reason, NamingViolation::TooLong);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
