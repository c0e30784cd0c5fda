//! FBO Nightly ETL - Parse legacy procurement dumps into SQLite.
//!
//! This crate parses the nightly FedBizOpps feed, a pre-XML format of
//! angle-bracket tags without a grammar, and loads the resulting notices
//! into a SQLite database idempotently.
//!
//! # Example
//!
//! ```
//! use fbo_nightly::config;
//!
//! // Dump dates are YYYYMMDD
//! assert!(config::validate_dump_date("20180706").is_ok());
//! assert!(config::validate_dump_date("2018-07-06").is_err());
//! ```
//!
//! # Architecture
//!
//! The pipeline is organized into several modules:
//!
//! - [`config`]: Configuration constants and validation
//! - [`error`]: Error types and Result alias
//! - [`taxonomy`]: The tag table gating tokenization and containment
//! - [`tokenizer`]: Lossless byte-to-token scanning
//! - [`tree`]: Structural reconstruction of the tag stream
//! - [`records`]: Record-kind and field-mapping configuration
//! - [`normalize`]: Typed record extraction with per-record rejection
//! - [`store`]: SQLite destination with upserts and audit logging
//! - [`etl`]: Per-dump and per-directory orchestration
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod etl;
pub mod normalize;
pub mod records;
pub mod store;
pub mod taxonomy;
pub mod tokenizer;
pub mod tree;

pub use error::{EtlError, Result};
pub use etl::{process_dir, process_dump, DumpSummary};
pub use normalize::{normalize, Record};
pub use records::{fbo_nightly_kinds, RecordKind};
pub use store::{ConflictPolicy, LoadStats, Store};
pub use taxonomy::Taxonomy;
pub use tokenizer::{Token, Tokenizer};
pub use tree::{reconstruct, Node};
