//! Pipeline orchestration: one synchronous pass per dump file.
//!
//! Each dump flows strictly downstream (bytes, tokens, nodes, records,
//! rows) in a single pass. Directories are processed oldest-to-newest so
//! later updates to the same natural key win.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::{date_from_file_name, decode_latin1};
use crate::error::{EtlError, Result};
use crate::normalize::normalize;
use crate::records::RecordKind;
use crate::store::{ConflictPolicy, LoadStats, Store};
use crate::taxonomy::Taxonomy;
use crate::tokenizer::Tokenizer;
use crate::tree::reconstruct;

/// Outcome of processing one dump file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSummary {
    pub date: NaiveDate,
    pub stats: LoadStats,
}

/// Parse and load a single dump file.
///
/// Tokenization, reconstruction and normalization never fail; rejected
/// records are logged and tallied but excluded from the load. The
/// completion marker is written only after the load transaction commits,
/// so a storage failure leaves the dump eligible for a clean retry.
pub fn process_dump(
    path: &Path,
    date: NaiveDate,
    store: &mut Store,
    taxonomy: &Taxonomy,
    kinds: &[RecordKind],
    policy: ConflictPolicy,
) -> Result<DumpSummary> {
    info!(path = %path.display(), %date, "processing dump");

    let bytes = fs::read(path)?;
    let text = decode_latin1(&bytes);

    let forest = reconstruct(Tokenizer::new(&text, taxonomy), taxonomy);
    let output = normalize(&forest, kinds);

    for rejection in &output.rejections {
        warn!(
            kind = %rejection.kind,
            reason = rejection.reason.label(),
            fragment = %rejection.fragment,
            "rejected record"
        );
    }

    let mut stats = store.load(&output.records, policy)?;
    stats.rejected = output.rejections.len();

    store.mark_complete(date)?;
    store.log(
        "nightly",
        &format!(
            "Parsed {}: {} inserted, {} updated, {} unchanged, {} rejected",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            stats.inserted,
            stats.updated,
            stats.unchanged,
            stats.rejected,
        ),
    )?;

    info!(
        %date,
        inserted = stats.inserted,
        updated = stats.updated,
        unchanged = stats.unchanged,
        rejected = stats.rejected,
        "dump complete"
    );

    Ok(DumpSummary { date, stats })
}

/// Dump files in `dir` awaiting processing, oldest first.
///
/// Skips non-dump files, generated artifacts and, unless `force`,
/// dumps already marked complete.
pub fn pending_dumps(dir: &Path, store: &Store, force: bool) -> Result<Vec<(PathBuf, NaiveDate)>> {
    let mut dumps: Vec<(PathBuf, NaiveDate)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(date) = date_from_file_name(&path) else {
            continue;
        };
        if !force && store.is_complete(date)? {
            info!(path = %path.display(), "already processed, skipping");
            continue;
        }
        dumps.push((path, date));
    }

    dumps.sort_by_key(|(_, date)| *date);
    Ok(dumps)
}

/// Process every pending dump in a directory, oldest to newest.
pub fn process_dir(
    dir: &Path,
    store: &mut Store,
    taxonomy: &Taxonomy,
    kinds: &[RecordKind],
    policy: ConflictPolicy,
    force: bool,
) -> Result<Vec<DumpSummary>> {
    if !dir.is_dir() {
        return Err(EtlError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Data directory does not exist: {}", dir.display()),
        )));
    }

    let pending = pending_dumps(dir, store, force)?;
    let mut summaries = Vec::with_capacity(pending.len());
    for (path, date) in pending {
        summaries.push(process_dump(&path, date, store, taxonomy, kinds, policy)?);
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fbo_nightly_kinds;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = "<PRESOL>\n<DATE>0706</DATE>\n<YEAR>18</YEAR>\n\
<SOLNBR>ABC-123</SOLNBR>\n<SUBJECT>Sample</SUBJECT>\n</PRESOL>\n";

    fn write_dump(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.init_schema(&fbo_nightly_kinds()).unwrap();
        store
    }

    #[test]
    fn test_process_dump_inserts_and_marks_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dump(dir.path(), "FBOFeed20180706", SAMPLE);
        let date = NaiveDate::from_ymd_opt(2018, 7, 6).unwrap();
        let mut store = store();

        let summary = process_dump(
            &path,
            date,
            &mut store,
            &Taxonomy::fbo_nightly(),
            &fbo_nightly_kinds(),
            ConflictPolicy::LastWins,
        )
        .unwrap();

        assert_eq!(summary.stats.inserted, 1);
        assert!(store.is_complete(date).unwrap());
        assert_eq!(store.recent_log(5).unwrap().len(), 1);
    }

    #[test]
    fn test_pending_dumps_sorted_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(dir.path(), "FBOFeed20180708", SAMPLE);
        write_dump(dir.path(), "FBOFeed20180706", SAMPLE);
        write_dump(dir.path(), "FBOFeed20180707", SAMPLE);
        write_dump(dir.path(), "FBOFeed20180706.sql", "not a dump");
        write_dump(dir.path(), "notes.txt", "not a dump");
        let store = store();

        let pending = pending_dumps(dir.path(), &store, false).unwrap();
        let dates: Vec<String> = pending
            .iter()
            .map(|(_, d)| d.format("%Y%m%d").to_string())
            .collect();
        assert_eq!(dates, vec!["20180706", "20180707", "20180708"]);
    }

    #[test]
    fn test_pending_dumps_skips_completed() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(dir.path(), "FBOFeed20180706", SAMPLE);
        write_dump(dir.path(), "FBOFeed20180707", SAMPLE);
        let store = store();
        store
            .mark_complete(NaiveDate::from_ymd_opt(2018, 7, 6).unwrap())
            .unwrap();

        let pending = pending_dumps(dir.path(), &store, false).unwrap();
        assert_eq!(pending.len(), 1);

        let forced = pending_dumps(dir.path(), &store, true).unwrap();
        assert_eq!(forced.len(), 2);
    }

    #[test]
    fn test_process_dir_missing_directory() {
        let mut store = store();
        let result = process_dir(
            Path::new("/nonexistent/fbo-data"),
            &mut store,
            &Taxonomy::fbo_nightly(),
            &fbo_nightly_kinds(),
            ConflictPolicy::LastWins,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reprocessing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(dir.path(), "FBOFeed20180706", SAMPLE);
        let mut store = store();
        let taxonomy = Taxonomy::fbo_nightly();
        let kinds = fbo_nightly_kinds();

        let first = process_dir(
            dir.path(),
            &mut store,
            &taxonomy,
            &kinds,
            ConflictPolicy::LastWins,
            false,
        )
        .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].stats.inserted, 1);

        // Second run skips the completed dump entirely.
        let second = process_dir(
            dir.path(),
            &mut store,
            &taxonomy,
            &kinds,
            ConflictPolicy::LastWins,
            false,
        )
        .unwrap();
        assert!(second.is_empty());

        // Forced reprocessing finds everything unchanged.
        let forced = process_dir(
            dir.path(),
            &mut store,
            &taxonomy,
            &kinds,
            ConflictPolicy::LastWins,
            true,
        )
        .unwrap();
        assert_eq!(forced[0].stats.unchanged, 1);
        assert_eq!(forced[0].stats.inserted, 0);
        assert_eq!(store.table_len("presol").unwrap(), 1);
    }
}
