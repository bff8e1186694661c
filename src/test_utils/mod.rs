//! Test utilities: an in-memory connection factory with scriptable failures.
//!
//! Enabled for this crate's own tests and, for downstream crates, via the
//! `test-utils` feature.

pub mod mock;

pub use mock::{MockConnection, MockFactory};
