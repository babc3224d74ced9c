//! The cross-file semantic model.
//!
//! A [`Workspace`] owns one [`Document`] per file plus two derived indices:
//!
//! - [`SchemaRegistry`] - entity name → schema folded from every `define-entity`/`alter-entity`
//! - [`LinkIndex`] - link id → definitions and references
//!
//! Both are patched incrementally by [`Workspace::add_document`] and
//! [`Workspace::remove_document`], which report what changed as an [`InvalidationResult`].

pub mod document;
pub mod link_index;
pub mod schema_registry;
pub mod workspace;

pub use document::{Document, DocumentOptions, SemanticModel};
pub use link_index::{LinkContributions, LinkDefinition, LinkIndex, LinkReference};
pub use schema_registry::{ResolvedSchema, SchemaRegistry, SchemaSource};
pub use workspace::{InvalidationResult, Workspace};
