//! # thalo-core
//!
//! The semantic engine behind the thalo plain-text knowledge language: parse `.thalo` files and
//! fenced ` ```thalo ` blocks in markdown, build a cross-file model of entries, schemas and links,
//! validate it with a configurable rule set, and answer editor navigation requests.
//!
//! ## Overview
//!
//! A thalo entry is a timestamped header line followed by indented metadata and content:
//!
//! ```text
//! 2026-01-05T10:30Z create lore "Ada Lovelace" ^ada #people
//!   type: "fact"
//!
//!   # Content
//!   First published algorithm.
//! ```
//!
//! Entities are declared with `define-entity` and extended with `alter-entity`; instances are
//! checked against the schema folded from both. `define-synthesis` entries name a query over
//! other entries, and `actualize-synthesis` entries record the checkpoint of the last time that
//! synthesis was regenerated.
//!
//! ## Architecture
//!
//! - [`source_map`] - block-relative ↔ file-absolute positions
//! - [`syntax`] - the parser boundary and the built-in thalo/markdown parsers
//! - [`ast`] - typed entry records extracted from syntax trees
//! - [`query`] - synthesis source queries and their matching
//! - [`model`] - [`Document`](model::Document), [`Workspace`](model::Workspace), the schema
//!   registry and the link index
//! - [`checker`] - rule engine, built-in rules, full and incremental checks
//! - [`config`] - `thalo.toml` rule severities and change tracker settings
//! - [`change_tracker`] - which entries changed since a checkpoint (git or timestamps)
//! - [`actualize`] - planning an `actualize-synthesis` run
//! - [`services`] - definition, references, hover and completion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use thalo_core::{checker::Checker, config::TomlConfigProvider, model::Workspace};
//!
//! # fn main() -> Result<(), thalo_core::ThaloError> {
//! let mut workspace = Workspace::new();
//! workspace.load_directory("./notes")?;
//!
//! let config = TomlConfigProvider::for_workspace("./notes").load()?;
//! let checker = Checker::with_config(config);
//! for diagnostic in checker.check(&workspace) {
//!     println!(
//!         "{}:{}: [{}] {}",
//!         diagnostic.file,
//!         diagnostic.location.start.line + 1,
//!         diagnostic.code,
//!         diagnostic.message
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! **Documents and blocks**: a `.thalo` file is a single block; a markdown file contributes one
//! block per thalo fence. Entry locations are block-relative and mapped back to file positions
//! through each block's [`SourceMap`](source_map::SourceMap).
//!
//! **Invalidation**: [`Workspace::add_document`](model::Workspace::add_document) and
//! [`Workspace::remove_document`](model::Workspace::remove_document) report which entities and
//! link ids changed, which drives
//! [`Checker::check_incremental`](checker::Checker::check_incremental).
//!
//! **Checkpoints**: a [`ChangeMarker`](change_tracker::ChangeMarker) is either `git:<commit>` or
//! `ts:<timestamp>`; trackers return the entries matching a synthesis' sources that changed
//! since one.

pub mod actualize;
pub mod ast;
pub mod change_tracker;
pub mod checker;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod services;
pub mod source_map;
pub mod syntax;

pub use error::*;
