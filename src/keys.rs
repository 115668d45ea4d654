//! Storage key naming for snapshots.
//!
//! Every snapshot lives in the object store under a deterministic key of the
//! form `[prefix/]{target_id}_{YYYYMMDD}.{ext}`. The date sits between the
//! last underscore and the extension dot, so a target id whose own tail looks
//! like `_20240101` would make `parse_key` recover the wrong id. `build_key`
//! rejects such ids up front; on the accepted domain build and parse are
//! exact inverses.

use chrono::NaiveDate;
use thiserror::Error;

/// Date format used in storage keys.
pub const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("target id is empty")]
    EmptyId,
    #[error("target id `{0}` contains a reserved character")]
    ReservedCharacter(String),
    #[error("target id `{0}` ends in a date-like suffix")]
    AmbiguousSuffix(String),
}

/// A storage key decomposed back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub target_id: String,
    pub date: NaiveDate,
    pub ext: String,
}

/// Build the storage key for one target's snapshot on one date.
pub fn build_key(
    prefix: Option<&str>,
    target_id: &str,
    date: NaiveDate,
    ext: &str,
) -> Result<String, KeyError> {
    if target_id.is_empty() {
        return Err(KeyError::EmptyId);
    }
    if target_id.contains('/') {
        return Err(KeyError::ReservedCharacter(target_id.to_string()));
    }
    if has_date_suffix(target_id) {
        return Err(KeyError::AmbiguousSuffix(target_id.to_string()));
    }

    let name = format!("{}_{}.{}", target_id, date.format(DATE_FORMAT), ext);
    match prefix {
        Some(p) if !p.is_empty() => Ok(format!("{}/{}", p.trim_end_matches('/'), name)),
        _ => Ok(name),
    }
}

/// Recover `(target_id, date, ext)` from a storage key.
///
/// Returns `None` for keys that do not follow the snapshot layout; callers
/// skip those rather than treating them as errors.
pub fn parse_key(key: &str) -> Option<ParsedKey> {
    let name = key.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    let (target_id, date_str) = stem.rsplit_once('_')?;
    if target_id.is_empty() || date_str.len() != 8 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).ok()?;
    Some(ParsedKey {
        target_id: target_id.to_string(),
        date,
        ext: ext.to_string(),
    })
}

/// True when the id ends with `_` followed by a valid 8-digit date, which
/// `parse_key` could not distinguish from the real date segment.
fn has_date_suffix(target_id: &str) -> bool {
    let Some((_, tail)) = target_id.rsplit_once('_') else {
        return false;
    };
    tail.len() == 8 && NaiveDate::parse_from_str(tail, DATE_FORMAT).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn round_trips_plain_id() {
        let key = build_key(None, "nightly-sync", date(2026, 8, 7), "txt").unwrap();
        assert_eq!(key, "nightly-sync_20260807.txt");

        let parsed = parse_key(&key).unwrap();
        assert_eq!(parsed.target_id, "nightly-sync");
        assert_eq!(parsed.date, date(2026, 8, 7));
        assert_eq!(parsed.ext, "txt");
    }

    #[test]
    fn round_trips_id_with_underscores_and_digits() {
        // Underscores and digit runs are fine as long as the tail is not a
        // full date; parse always splits at the last underscore.
        for id in ["etl_job_2", "job20240101", "report_v2_final"] {
            let key = build_key(Some("backups"), id, date(2026, 1, 31), "xml").unwrap();
            let parsed = parse_key(&key).unwrap();
            assert_eq!(parsed.target_id, id);
            assert_eq!(parsed.date, date(2026, 1, 31));
        }
    }

    #[test]
    fn prefix_is_prepended_once() {
        let key = build_key(Some("backups/"), "job", date(2026, 8, 7), "txt").unwrap();
        assert_eq!(key, "backups/job_20260807.txt");
    }

    #[test]
    fn rejects_ambiguous_date_suffix() {
        let err = build_key(None, "job_20240101", date(2026, 8, 7), "txt").unwrap_err();
        assert_eq!(err, KeyError::AmbiguousSuffix("job_20240101".to_string()));
    }

    #[test]
    fn accepts_eight_digit_tail_that_is_not_a_date() {
        // 99999999 never parses as a date, so the key stays unambiguous.
        let key = build_key(None, "job_99999999", date(2026, 8, 7), "txt").unwrap();
        assert_eq!(parse_key(&key).unwrap().target_id, "job_99999999");
    }

    #[test]
    fn rejects_empty_and_reserved_ids() {
        assert_eq!(build_key(None, "", date(2026, 8, 7), "txt"), Err(KeyError::EmptyId));
        assert!(matches!(
            build_key(None, "a/b", date(2026, 8, 7), "txt"),
            Err(KeyError::ReservedCharacter(_))
        ));
    }

    #[test]
    fn parse_skips_foreign_keys() {
        assert!(parse_key("README.md").is_none());
        assert!(parse_key("job-without-date.txt").is_none());
        assert!(parse_key("job_2026.txt").is_none());
        assert!(parse_key("job_99999999.txt").is_none());
        assert!(parse_key("_20260807.txt").is_none());
    }
}
