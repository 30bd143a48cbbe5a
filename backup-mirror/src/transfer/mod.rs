//! Transfer reporting helpers.

pub mod progress;
