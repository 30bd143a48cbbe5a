//! Content comparison.

pub mod fingerprint;

pub use fingerprint::{fingerprint, ContentComparator, ContentMatch, Fingerprint};
