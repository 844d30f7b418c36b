//! Helpers shared by the fetch paths.
//!
//! - **URL policy**: SSRF guard applied to user-supplied OPML and feed URLs,
//!   and to every redirect hop
//!
//! # Examples
//!
//! ```
//! use opml2json::util::UrlPolicy;
//!
//! // Loopback is only reachable when private hosts are allowed
//! assert!(UrlPolicy::AllowPrivate.check("http://127.0.0.1:8080/feed").is_ok());
//! assert!(UrlPolicy::PublicOnly.check("http://127.0.0.1:8080/feed").is_err());
//! ```

mod url_policy;

pub use url_policy::{validate_url, UrlPolicy, UrlValidationError};
