//! The library code for the `notesite` static site generator, which publishes
//! a vault of markdown notes as a browsable, searchable website. The
//! architecture can be generally broken down into three steps:
//!
//! 1. Scanning notes from the vault on disk ([`crate::source`]) and
//!    normalizing them into page records ([`crate::page`]), resolving
//!    `[[wikilinks]]` along the way ([`crate::resolve`])
//! 2. Deriving indexes from the records: backlinks ([`crate::backlinks`]), the
//!    directory tree ([`crate::tree`]) and the search payload
//!    ([`crate::payload`])
//! 3. Rendering all pages to disk ([`crate::write`], [`crate::feed`])
//!
//! Records are immutable once built. Every index is computed from the full
//! slice of records and only refers to records by link path, so nothing
//! points back into the structure it was derived from.
//!
//! Search runs in the browser against the embedded payload; [`crate::engine`]
//! is the same search engine in Rust, used by the `search` subcommand, and
//! [`crate::highlight`] turns matches into displayable segments.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod backlinks;
pub mod build;
pub mod config;
pub mod engine;
pub mod feed;
pub mod highlight;
pub mod markdown;
pub mod page;
pub mod payload;
pub mod resolve;
pub mod source;
pub mod tree;
pub mod value;
pub mod write;

#[cfg(test)]
mod testutil;
