//! Git source fetching for opkg
//!
//! Clones or refreshes remote package repositories into a local cache
//! directory and checks out the requested ref, reporting the commit SHA.

pub mod error;
pub mod fetch;
pub mod url;

pub use error::{Error, Result};
pub use fetch::{Checkout, GitFetcher};
pub use url::{GitShorthand, normalize_url, parse_shorthand};
