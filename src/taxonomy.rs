//! Tag taxonomy: the static configuration that drives every parsing stage.
//!
//! The nightly feed has no formal grammar, so structure is inferred from a
//! declarative table rather than a recursive-descent parser: each known tag
//! declares its role, repeatability, whether it bears free text, and which
//! tags may legally contain it. New feed quirks are addressed by editing
//! this table (or an external YAML file), not by code changes.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// Role of a tag in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagRole {
    /// Root tag of a record subtree (e.g. `PRESOL`). Legal only at the top
    /// level of a dump.
    Record,

    /// Field tag within a record (e.g. `SOLNBR`).
    Field,
}

/// Specification of one known tag.
#[derive(Debug, Clone, Deserialize)]
pub struct TagSpec {
    /// Tag name as it appears in the feed (matched case-insensitively).
    pub name: String,

    /// Record or field role.
    pub role: TagRole,

    /// Whether a second opener for this tag starts a new sibling instance.
    #[serde(default)]
    pub repeatable: bool,

    /// Whether whitespace-only literals inside this tag are kept.
    #[serde(default)]
    pub text_bearing: bool,

    /// Tags this one may legally contain, in addition to the defaults.
    /// Any field tag is legal directly under any record tag.
    #[serde(default)]
    pub children: Vec<String>,

    /// Restriction: only these tags may contain this one. Empty means
    /// the default rules apply.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl TagSpec {
    /// Create a record-root tag spec.
    #[must_use]
    pub fn record(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: TagRole::Record,
            repeatable: false,
            text_bearing: false,
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Create a field tag spec.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: TagRole::Field,
            repeatable: false,
            text_bearing: false,
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Mark the tag as repeatable.
    #[must_use]
    pub fn with_repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Mark the tag as text-bearing.
    #[must_use]
    pub fn with_text_bearing(mut self) -> Self {
        self.text_bearing = true;
        self
    }

    /// Declare the tags this one may contain.
    #[must_use]
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the tag to the given parents.
    #[must_use]
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }
}

/// External taxonomy file shape for YAML loading.
#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    tags: Vec<TagSpec>,
}

/// Registry of known tags, keyed case-insensitively by name.
///
/// Anything the registry does not know is literal data, not markup; this
/// is what disambiguates tag-like text in the feed.
pub struct Taxonomy {
    tags: HashMap<String, TagSpec>,
}

impl Taxonomy {
    /// Create a new empty taxonomy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tags: HashMap::new(),
        }
    }

    /// Register a tag spec, replacing any previous spec for the same name.
    pub fn register(&mut self, spec: TagSpec) {
        self.tags.insert(spec.name.to_ascii_lowercase(), spec);
    }

    /// Check whether a tag name is known.
    #[must_use]
    pub fn is_known(&self, name: &str) -> bool {
        self.tags.contains_key(&name.to_ascii_lowercase())
    }

    /// Look up the spec for a tag name.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&TagSpec> {
        self.tags.get(&name.to_ascii_lowercase())
    }

    /// Whether a second opener for `name` starts a new sibling instance.
    #[must_use]
    pub fn is_repeatable(&self, name: &str) -> bool {
        self.spec(name).is_some_and(|s| s.repeatable)
    }

    /// Whether whitespace-only literals inside `name` are kept.
    #[must_use]
    pub fn is_text_bearing(&self, name: &str) -> bool {
        self.spec(name).is_some_and(|s| s.text_bearing)
    }

    /// Decide whether `child` may legally open under `parent`.
    ///
    /// `parent` of `None` means the top level of the dump, where only
    /// record tags are legal. This containment table is what stands in for
    /// the feed's absent closing tags.
    #[must_use]
    pub fn can_contain(&self, parent: Option<&str>, child: &str) -> bool {
        let Some(child_spec) = self.spec(child) else {
            return false;
        };

        let Some(parent_name) = parent else {
            return child_spec.role == TagRole::Record;
        };

        let Some(parent_spec) = self.spec(parent_name) else {
            return false;
        };

        // A parents list is a restriction and overrides the defaults.
        if !child_spec.parents.is_empty() {
            return child_spec
                .parents
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&parent_spec.name));
        }

        if parent_spec
            .children
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&child_spec.name))
        {
            return true;
        }

        // By default any field tag sits directly under any record tag.
        parent_spec.role == TagRole::Record && child_spec.role == TagRole::Field
    }

    /// Load a taxonomy from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: TaxonomyFile = serde_yaml_ng::from_str(yaml)?;
        let mut taxonomy = Self::new();
        for spec in file.tags {
            taxonomy.register(spec);
        }
        Ok(taxonomy)
    }

    /// Load a taxonomy from a YAML file on disk.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Built-in taxonomy for the FBO nightly feed.
    ///
    /// Record tags cannot nest inside one another; field tags sit directly
    /// under a record except for the `LINK` and `EMAIL` containers, whose
    /// descriptions land in separate columns.
    #[must_use]
    pub fn fbo_nightly() -> Self {
        let mut taxonomy = Self::new();

        for record in RECORD_TAGS {
            taxonomy.register(TagSpec::record(*record).with_text_bearing());
        }

        for field in [
            "DATE", "YEAR", "SOLNBR", "RESPDATE", "ARCHDATE", "SETASIDE", "AGENCY", "OFFICE",
            "LOCATION", "OFFADD", "ZIP", "CLASSCOD", "NAICS", "SUBJECT", "CONTACT", "POPADDRESS",
            "POPZIP", "POPCOUNTRY", "AWDNBR", "AWDAMT", "AWDDATE", "AWARDEE", "LINENBR", "NTYPE",
            "CORRECTION", "MODNBR", "STAUTH", "FOJA", "DONBR",
        ] {
            taxonomy.register(TagSpec::field(field).with_text_bearing());
        }

        // DESC repeats: once for the record description and once inside
        // each LINK/EMAIL container.
        taxonomy.register(TagSpec::field("DESC").with_text_bearing().with_repeatable());

        taxonomy.register(TagSpec::field("LINK").with_children(["URL", "DESC"]));
        taxonomy.register(TagSpec::field("EMAIL").with_children(["ADDRESS", "DESC"]));
        taxonomy.register(TagSpec::field("URL").with_text_bearing().with_parents(["LINK"]));
        taxonomy.register(TagSpec::field("ADDRESS").with_text_bearing().with_parents(["EMAIL"]));

        taxonomy
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new()
    }
}

/// Record root tags in the nightly feed.
pub const RECORD_TAGS: &[&str] = &[
    "PRESOL", "COMBINE", "AMDCSS", "MOD", "AWARD", "JA", "FAIROPP", "ARCHIVE", "UNARCHIVE",
    "SRCSGT", "SNOTE", "SSALE", "FSTD",
];
