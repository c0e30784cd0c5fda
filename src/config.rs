//! Configuration constants and validation functions for the ETL pipeline.

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{EtlError, Result};

/// Filename prefix of nightly dump files. A full name is `FBOFeedYYYYMMDD`.
pub const DUMP_FILE_PREFIX: &str = "FBOFeed";

/// Default destination database filename.
pub const DEFAULT_DB_FILE: &str = "fbo.sqlite3";

/// Maximum length of a raw source fragment kept on a rejection diagnostic.
pub const REJECTION_FRAGMENT_LEN: usize = 200;

/// Dump date pattern: YYYYMMDD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DUMP_DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}$").expect("valid regex"));

/// Validate and parse a dump date in YYYYMMDD format.
///
/// Rejects dates in the future since the feed cannot have published them yet.
///
/// # Examples
/// ```
/// use fbo_nightly::config::validate_dump_date;
///
/// assert!(validate_dump_date("20180706").is_ok());
/// assert!(validate_dump_date("2018-07-06").is_err());
/// assert!(validate_dump_date("20181301").is_err()); // Invalid month
/// ```
pub fn validate_dump_date(date_str: &str) -> Result<NaiveDate> {
    if !DUMP_DATE_PATTERN.is_match(date_str) {
        return Err(EtlError::InvalidDumpDate(date_str.to_string()));
    }

    let parsed = NaiveDate::parse_from_str(date_str, "%Y%m%d")
        .map_err(|_| EtlError::InvalidDumpDate(date_str.to_string()))?;

    let today = chrono::Local::now().date_naive();
    if parsed > today {
        return Err(EtlError::InvalidDumpDate(format!(
            "{date_str} is in the future (today is {today})"
        )));
    }

    Ok(parsed)
}

/// Build the dump filename for a publish date, e.g. `FBOFeed20180706`.
#[must_use]
pub fn dump_file_name(date: NaiveDate) -> String {
    format!("{DUMP_FILE_PREFIX}{}", date.format("%Y%m%d"))
}

/// Extract the publish date encoded in a dump filename.
///
/// Returns `None` for files that are not nightly dumps (wrong prefix, no
/// date, or generated artifacts like `FBOFeed20180706.sql`).
#[must_use]
pub fn date_from_file_name(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(DUMP_FILE_PREFIX)?;
    if rest.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(rest, "%Y%m%d").ok()
}

/// Decode dump bytes to a string.
///
/// The feed predates UTF-8 and is published as Latin-1, where every byte
/// maps directly to the code point of the same value.
#[must_use]
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_dump_date_valid() {
        assert_eq!(
            validate_dump_date("20180706").unwrap(),
            NaiveDate::from_ymd_opt(2018, 7, 6).unwrap()
        );
    }

    #[test]
    fn test_validate_dump_date_invalid_format() {
        assert!(validate_dump_date("").is_err());
        assert!(validate_dump_date("2018-07-06").is_err());
        assert!(validate_dump_date("201807").is_err());
        assert!(validate_dump_date("2018070a").is_err());
    }

    #[test]
    fn test_validate_dump_date_invalid_date() {
        assert!(validate_dump_date("20181301").is_err()); // month 13
        assert!(validate_dump_date("20180230").is_err()); // Feb 30
    }

    #[test]
    fn test_validate_dump_date_future() {
        assert!(validate_dump_date("29990101").is_err());
    }

    #[test]
    fn test_dump_file_name() {
        let date = NaiveDate::from_ymd_opt(2018, 7, 6).unwrap();
        assert_eq!(dump_file_name(date), "FBOFeed20180706");
    }

    #[test]
    fn test_date_from_file_name() {
        assert_eq!(
            date_from_file_name(&PathBuf::from("data/FBOFeed20180706")),
            NaiveDate::from_ymd_opt(2018, 7, 6)
        );
        assert_eq!(date_from_file_name(&PathBuf::from("FBOFeed20180706.sql")), None);
        assert_eq!(date_from_file_name(&PathBuf::from("README.md")), None);
        assert_eq!(date_from_file_name(&PathBuf::from("FBOFeed")), None);
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_latin1(b"plain ascii"), "plain ascii");
        // 0xE9 is e-acute in Latin-1
        assert_eq!(decode_latin1(&[0x63, 0x61, 0x66, 0xE9]), "caf\u{e9}");
    }
}
