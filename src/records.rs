//! Record-kind configuration: which subtrees become typed records, and how
//! their fields map onto destination columns.
//!
//! Like the taxonomy, record kinds are data: each kind declares its root
//! tag, destination table, natural key, and a field list mapping source
//! tag paths to coerced columns. The built-in set mirrors the thirteen
//! notice types published in the nightly feed.

use chrono::NaiveDate;

/// How a field's raw text is coerced into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Trimmed free text.
    Text,

    /// Posting date: an `MMDD` digit pair combined with the sibling
    /// two-digit `YEAR` tag.
    PostedDate,

    /// A full `MMDDYY` date in a single field.
    CompactDate,

    /// Integer, e.g. a NAICS code.
    Integer,
}

/// Mapping from one source tag path to a destination column.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Slash-separated tag path relative to the record root, lowercase
    /// (e.g. `"solnbr"`, `"link/url"`).
    pub path: String,

    /// Destination column name.
    pub column: String,

    /// Coercion applied to the raw text.
    pub kind: FieldKind,

    /// Whether absence rejects the record.
    pub required: bool,
}

impl FieldSpec {
    /// Optional text field.
    #[must_use]
    pub fn text(path: &str, column: &str) -> Self {
        Self {
            path: path.to_string(),
            column: column.to_string(),
            kind: FieldKind::Text,
            required: false,
        }
    }

    /// Set the coercion kind.
    #[must_use]
    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Configuration of one record kind.
#[derive(Debug, Clone)]
pub struct RecordKind {
    /// Kind name, also the root tag (lowercase).
    pub name: String,

    /// Destination table name.
    pub table: String,

    /// Columns forming the natural key for upserts.
    pub natural_key: Vec<String>,

    /// Field mappings in destination column order.
    pub fields: Vec<FieldSpec>,
}

impl RecordKind {
    /// Create a record kind named after its root tag; the table gets the
    /// same name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            table: name.to_lowercase(),
            natural_key: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Set the natural key columns.
    #[must_use]
    pub fn with_natural_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append field mappings.
    #[must_use]
    pub fn with_fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = FieldSpec>,
    {
        self.fields.extend(fields);
        self
    }

    /// Look up a field spec by destination column.
    #[must_use]
    pub fn field(&self, column: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.column == column)
    }
}

/// Fields shared by every notice type.
fn base_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::text("date", "date")
            .with_kind(FieldKind::PostedDate)
            .required(),
        FieldSpec::text("solnbr", "solicitation_number").required(),
        FieldSpec::text("respdate", "response_date").with_kind(FieldKind::CompactDate),
        FieldSpec::text("archdate", "archive_date"),
        FieldSpec::text("setaside", "setaside"),
        FieldSpec::text("agency", "agency"),
        FieldSpec::text("office", "office"),
        FieldSpec::text("location", "location"),
        FieldSpec::text("offadd", "office_address"),
        FieldSpec::text("zip", "zip"),
        FieldSpec::text("classcod", "class_code"),
        FieldSpec::text("naics", "naics").with_kind(FieldKind::Integer),
        FieldSpec::text("subject", "subject"),
        FieldSpec::text("desc", "desc"),
        FieldSpec::text("link/url", "url"),
        FieldSpec::text("link/desc", "url_desc"),
        FieldSpec::text("email/address", "email"),
        FieldSpec::text("email/desc", "email_desc"),
        FieldSpec::text("contact", "contact"),
        FieldSpec::text("popaddress", "pop_address"),
        FieldSpec::text("popzip", "pop_zip"),
        FieldSpec::text("popcountry", "pop_country"),
    ]
}

/// Award-shaped extras (award identification plus amounts).
fn award_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::text("awdnbr", "award_number"),
        FieldSpec::text("awdamt", "award_amount"),
        FieldSpec::text("awddate", "award_date"),
    ]
}

/// Natural key for notice kinds keyed by solicitation.
fn solicitation_key() -> Vec<String> {
    vec!["solicitation_number".to_string(), "date".to_string()]
}

/// Natural key for award-shaped kinds.
fn award_key() -> Vec<String> {
    vec![
        "solicitation_number".to_string(),
        "date".to_string(),
        "award_number".to_string(),
    ]
}

/// Built-in record kinds for the FBO nightly feed.
#[must_use]
pub fn fbo_nightly_kinds() -> Vec<RecordKind> {
    let mut kinds = Vec::new();

    // Plain solicitation notices.
    for name in ["presol", "combine", "srcsgt", "snote", "ssale"] {
        kinds.push(
            RecordKind::new(name)
                .with_natural_key(solicitation_key())
                .with_fields(base_fields()),
        );
    }

    // Amendments and modifications carry a notice type.
    for name in ["amdcss", "mod"] {
        kinds.push(
            RecordKind::new(name)
                .with_natural_key(solicitation_key())
                .with_fields(base_fields())
                .with_fields([FieldSpec::text("ntype", "ntype")]),
        );
    }

    kinds.push(
        RecordKind::new("award")
            .with_natural_key(award_key())
            .with_fields(base_fields())
            .with_fields(award_fields())
            .with_fields([
                FieldSpec::text("awardee", "awardee"),
                FieldSpec::text("linenbr", "line_number"),
                FieldSpec::text("ntype", "ntype"),
                FieldSpec::text("correction", "correction"),
            ]),
    );

    kinds.push(
        RecordKind::new("ja")
            .with_natural_key(award_key())
            .with_fields(base_fields())
            .with_fields(award_fields())
            .with_fields([
                FieldSpec::text("ntype", "ntype"),
                FieldSpec::text("stauth", "stauth"),
                FieldSpec::text("correction", "correction"),
                FieldSpec::text("modnbr", "modnbr"),
            ]),
    );

    // Fair-opportunity and archival notices share the JA-like tail.
    for name in ["fairopp", "archive", "unarchive", "fstd"] {
        kinds.push(
            RecordKind::new(name)
                .with_natural_key(award_key())
                .with_fields(base_fields())
                .with_fields(award_fields())
                .with_fields([
                    FieldSpec::text("ntype", "ntype"),
                    FieldSpec::text("foja", "foja"),
                    FieldSpec::text("donbr", "donbr"),
                    FieldSpec::text("correction", "correction"),
                    FieldSpec::text("modnbr", "modnbr"),
                ]),
        );
    }

    kinds
}

/// Combine an `MMDD` digit pair with a two-digit year into a date.
///
/// Years below 90 are 2000s, 90-99 are 1900s; four-digit years pass
/// through unchanged.
#[must_use]
pub fn fix_date(mmdd: &str, year: &str) -> Option<NaiveDate> {
    let mmdd = mmdd.trim();
    let year: i32 = year.trim().parse().ok()?;
    let year = if year >= 1000 {
        year
    } else if year < 90 {
        year + 2000
    } else {
        year + 1900
    };

    if mmdd.len() != 4 || !mmdd.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let month: u32 = mmdd[0..2].parse().ok()?;
    let day: u32 = mmdd[2..4].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a compact `MMDDYY` date field.
#[must_use]
pub fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    fix_date(&raw[0..4], &raw[4..6])
}
