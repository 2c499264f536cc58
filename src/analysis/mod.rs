//! Analysis modules.
//!
//! `aggregator` holds the pure filters and statistics; `summary` composes
//! them into the numbers shown on each dashboard.

pub mod aggregator;
pub mod summary;

pub use aggregator::*;
pub use summary::*;
