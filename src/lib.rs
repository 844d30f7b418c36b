//! opml2json: turns an OPML subscription list into one paginated JSON timeline.
//!
//! The library exposes the pipeline (OPML resolving, cached feed fetching,
//! normalization, pagination) and the axum router that serves it; the
//! `opml2json` binary only wires configuration and logging around them.

pub mod config;
pub mod error;
pub mod feed;
pub mod server;
pub mod service;
pub mod util;
