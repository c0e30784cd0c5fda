//! Record normalization: reconstructed nodes to typed records.
//!
//! Walks the record forest in document order and yields typed records plus
//! rejection diagnostics. One malformed record never blocks extraction of
//! the rest of the dump; raw source text travels with each rejection so
//! nothing is silently dropped.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::REJECTION_FRAGMENT_LEN;
use crate::records::{fix_date, parse_compact_date, FieldKind, RecordKind};
use crate::tree::Node;

/// A coerced field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Integer(i64),
}

impl FieldValue {
    /// Canonical string rendering, used for natural keys and digests.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Integer(i) => i.to_string(),
        }
    }
}

/// A typed, flattened record ready for loading.
#[derive(Debug, Clone)]
pub struct Record {
    /// Record kind name (also the destination table).
    pub kind: String,

    /// Destination table name.
    pub table: String,

    /// Coerced values keyed by destination column. Absent optional fields
    /// have no entry.
    pub values: BTreeMap<String, FieldValue>,

    /// Natural key as (column, rendered value) pairs, in configured order.
    /// Missing optional key columns render as the empty string.
    pub natural_key: Vec<(String, String)>,

    /// Hex sha256 over all rendered values, used for change detection.
    pub digest: String,
}

/// Why a record was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// A required field tag was absent.
    MissingField(String),

    /// A field was present but its text could not be coerced.
    CoercionError { field: String, raw: String },
}

impl RejectReason {
    /// Short machine-readable label for logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::MissingField(_) => "missing-field",
            RejectReason::CoercionError { .. } => "coercion-error",
        }
    }
}

/// A rejected record with enough raw context for manual inspection.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub kind: String,
    pub reason: RejectReason,

    /// Truncated raw source text of the offending record.
    pub fragment: String,
}

/// Output of one normalization pass.
#[derive(Debug, Default)]
pub struct NormalizeOutput {
    /// Accepted records in document order. No deduplication here; the
    /// loader is the dedup authority.
    pub records: Vec<Record>,

    /// Per-record rejection diagnostics.
    pub rejections: Vec<Rejection>,

    /// Occurrence counts of root tags with no configured record kind.
    pub unhandled: BTreeMap<String, usize>,
}

/// Normalize a record forest against the configured kinds.
#[must_use]
pub fn normalize(forest: &[Node], kinds: &[RecordKind]) -> NormalizeOutput {
    let mut output = NormalizeOutput::default();

    for node in forest {
        let Some(kind) = kinds.iter().find(|k| k.name.eq_ignore_ascii_case(&node.tag)) else {
            let count = output.unhandled.entry(node.tag.clone()).or_insert(0);
            if *count == 0 {
                warn!(tag = %node.tag, "unhandled record type");
            }
            *count += 1;
            continue;
        };

        match normalize_record(node, kind) {
            Ok(record) => output.records.push(record),
            Err(reason) => {
                output.rejections.push(Rejection {
                    kind: kind.name.clone(),
                    reason,
                    fragment: fragment_of(node),
                });
            }
        }
    }

    output
}

/// Normalize a single record node. Errors are per-record rejections, never
/// failures of the pass.
fn normalize_record(node: &Node, kind: &RecordKind) -> Result<Record, RejectReason> {
    let mut values: BTreeMap<String, FieldValue> = BTreeMap::new();

    for field in &kind.fields {
        let source = node.find_by_path(&field.path);

        let Some(source) = source else {
            if field.required {
                return Err(RejectReason::MissingField(field.column.clone()));
            }
            continue;
        };

        let raw = source.trimmed_text();
        if raw.is_empty() && field.required {
            return Err(RejectReason::MissingField(field.column.clone()));
        }
        if raw.is_empty() {
            continue;
        }

        let value = coerce(raw, field.kind, node).ok_or_else(|| RejectReason::CoercionError {
            field: field.column.clone(),
            raw: raw.to_string(),
        })?;
        values.insert(field.column.clone(), value);
    }

    // Natural key columns always land in the row, empty when absent, so
    // re-runs find the same row they inserted.
    for column in &kind.natural_key {
        values
            .entry(column.clone())
            .or_insert_with(|| FieldValue::Text(String::new()));
    }

    let natural_key = kind
        .natural_key
        .iter()
        .map(|column| {
            let rendered = values.get(column).map(FieldValue::render).unwrap_or_default();
            (column.clone(), rendered)
        })
        .collect();

    let digest = digest_of(&values);

    Ok(Record {
        kind: kind.name.clone(),
        table: kind.table.clone(),
        values,
        natural_key,
        digest,
    })
}

/// Coerce raw field text per the configured kind. `record` gives access to
/// sibling tags (the posted date needs the `YEAR` companion).
fn coerce(raw: &str, kind: FieldKind, record: &Node) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => Some(FieldValue::Text(raw.to_string())),
        FieldKind::PostedDate => {
            let year = record.find_child("year")?.trimmed_text();
            fix_date(raw, year).map(FieldValue::Date)
        }
        FieldKind::CompactDate => parse_compact_date(raw).map(FieldValue::Date),
        FieldKind::Integer => raw.parse::<i64>().ok().map(FieldValue::Integer),
    }
}

/// Hex sha256 over all rendered values, pipe-joined in column order.
fn digest_of(values: &BTreeMap<String, FieldValue>) -> String {
    let mut hasher = Sha256::new();
    for (column, value) in values {
        hasher.update(column.as_bytes());
        hasher.update(b"=");
        hasher.update(value.render().as_bytes());
        hasher.update(b"|");
    }
    hex::encode(hasher.finalize())
}

/// Truncated raw text of a record node for rejection diagnostics.
fn fragment_of(node: &Node) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    let trimmed = text.trim();
    let mut fragment: String = trimmed.chars().take(REJECTION_FRAGMENT_LEN).collect();
    if fragment.len() < trimmed.len() {
        fragment.push('…');
    }
    fragment
}

fn collect_text(node: &Node, out: &mut String) {
    out.push_str(&node.text);
    for child in &node.children {
        out.push(' ');
        collect_text(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fbo_nightly_kinds;
    use crate::taxonomy::Taxonomy;
    use crate::tokenizer::Tokenizer;
    use crate::tree::reconstruct;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Vec<Node> {
        let taxonomy = Taxonomy::fbo_nightly();
        reconstruct(Tokenizer::new(input, &taxonomy), &taxonomy)
    }

    const GOOD_PRESOL: &str = "<PRESOL>\n<DATE>0706</DATE>\n<YEAR>18</YEAR>\n\
<SOLNBR>W91247-18-R-0001</SOLNBR>\n<AGENCY>Department of the Army</AGENCY>\n\
<SUBJECT>Grounds maintenance</SUBJECT>\n<NAICS>561730</NAICS>\n\
<RESPDATE>081518</RESPDATE>\n<DESC>Mow all the lawns.</DESC>\n</PRESOL>\n";

    #[test]
    fn test_normalize_well_formed_record() {
        let forest = parse(GOOD_PRESOL);
        let output = normalize(&forest, &fbo_nightly_kinds());

        assert_eq!(output.records.len(), 1);
        assert!(output.rejections.is_empty());

        let record = &output.records[0];
        assert_eq!(record.kind, "presol");
        assert_eq!(
            record.values.get("date"),
            Some(&FieldValue::Date(
                NaiveDate::from_ymd_opt(2018, 7, 6).unwrap()
            ))
        );
        assert_eq!(
            record.values.get("solicitation_number"),
            Some(&FieldValue::Text("W91247-18-R-0001".to_string()))
        );
        assert_eq!(
            record.values.get("naics"),
            Some(&FieldValue::Integer(561_730))
        );
        assert_eq!(
            record.values.get("response_date"),
            Some(&FieldValue::Date(
                NaiveDate::from_ymd_opt(2018, 8, 15).unwrap()
            ))
        );
        assert_eq!(
            record.natural_key,
            vec![
                ("solicitation_number".to_string(), "W91247-18-R-0001".to_string()),
                ("date".to_string(), "2018-07-06".to_string()),
            ]
        );
        assert_eq!(record.digest.len(), 64);
    }

    #[test]
    fn test_missing_required_field_rejects() {
        // No DATE tag at all.
        let forest = parse(
            "<PRESOL>\n<YEAR>18</YEAR>\n<SOLNBR>ABC-123</SOLNBR>\n<SUBJECT>x</SUBJECT>\n</PRESOL>",
        );
        let output = normalize(&forest, &fbo_nightly_kinds());

        assert!(output.records.is_empty());
        assert_eq!(output.rejections.len(), 1);
        assert_eq!(
            output.rejections[0].reason,
            RejectReason::MissingField("date".to_string())
        );
        assert_eq!(output.rejections[0].reason.label(), "missing-field");
        assert!(output.rejections[0].fragment.contains("ABC-123"));
    }

    #[test]
    fn test_coercion_error_rejects_and_keeps_raw() {
        let forest = parse(
            "<PRESOL>\n<DATE>9999</DATE>\n<YEAR>18</YEAR>\n<SOLNBR>ABC-123</SOLNBR>\n</PRESOL>",
        );
        let output = normalize(&forest, &fbo_nightly_kinds());

        assert!(output.records.is_empty());
        assert_eq!(output.rejections.len(), 1);
        match &output.rejections[0].reason {
            RejectReason::CoercionError { field, raw } => {
                assert_eq!(field, "date");
                assert_eq!(raw, "9999");
            }
            other => panic!("expected coercion error, got {other:?}"),
        }
    }

    #[test]
    fn test_one_bad_record_does_not_block_others() {
        let input = format!(
            "{GOOD_PRESOL}<PRESOL>\n<YEAR>18</YEAR>\n<SOLNBR>NO-DATE</SOLNBR>\n</PRESOL>\n{GOOD_PRESOL}"
        );
        let forest = parse(&input);
        let output = normalize(&forest, &fbo_nightly_kinds());

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.rejections.len(), 1);
    }

    #[test]
    fn test_link_desc_disambiguation() {
        let input = "<PRESOL>\n<DATE>0706</DATE>\n<YEAR>18</YEAR>\n<SOLNBR>X-1</SOLNBR>\n\
<DESC>Record description</DESC>\n\
<LINK>\n<URL>https://example.gov/notice</URL>\n<DESC>Link to notice</DESC>\n</LINK>\n\
<EMAIL>\n<ADDRESS>contracting@example.gov</ADDRESS>\n<DESC>Contracting officer</DESC>\n</EMAIL>\n\
</PRESOL>";
        let forest = parse(input);
        let output = normalize(&forest, &fbo_nightly_kinds());

        assert_eq!(output.records.len(), 1);
        let record = &output.records[0];
        assert_eq!(
            record.values.get("desc"),
            Some(&FieldValue::Text("Record description".to_string()))
        );
        assert_eq!(
            record.values.get("url"),
            Some(&FieldValue::Text("https://example.gov/notice".to_string()))
        );
        assert_eq!(
            record.values.get("url_desc"),
            Some(&FieldValue::Text("Link to notice".to_string()))
        );
        assert_eq!(
            record.values.get("email"),
            Some(&FieldValue::Text("contracting@example.gov".to_string()))
        );
        assert_eq!(
            record.values.get("email_desc"),
            Some(&FieldValue::Text("Contracting officer".to_string()))
        );
    }

    #[test]
    fn test_unhandled_record_type_counted() {
        let mut taxonomy = Taxonomy::fbo_nightly();
        taxonomy.register(crate::taxonomy::TagSpec::record("MYSTERY").with_text_bearing());
        let forest = reconstruct(
            Tokenizer::new("<MYSTERY>stuff</MYSTERY><MYSTERY>more</MYSTERY>", &taxonomy),
            &taxonomy,
        );
        let output = normalize(&forest, &fbo_nightly_kinds());

        assert!(output.records.is_empty());
        assert!(output.rejections.is_empty());
        assert_eq!(output.unhandled.get("mystery"), Some(&2));
    }

    #[test]
    fn test_document_order_preserved() {
        let input = format!("{GOOD_PRESOL}<AWARD>\n<DATE>0707</DATE>\n<YEAR>18</YEAR>\n<SOLNBR>Z-9</SOLNBR>\n<AWDNBR>AW-1</AWDNBR>\n</AWARD>\n");
        let forest = parse(&input);
        let output = normalize(&forest, &fbo_nightly_kinds());

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].kind, "presol");
        assert_eq!(output.records[1].kind, "award");
        assert_eq!(
            output.records[1].natural_key[2],
            ("award_number".to_string(), "AW-1".to_string())
        );
    }

    #[test]
    fn test_identical_records_share_digest() {
        let forest = parse(&format!("{GOOD_PRESOL}{GOOD_PRESOL}"));
        let output = normalize(&forest, &fbo_nightly_kinds());
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].digest, output.records[1].digest);
    }
}
