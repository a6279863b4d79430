//! Query scopes for tagged records
//!
//! Builds "has all of these tags" / "has any of these tags" conditions and
//! runs them against the association store.

mod scope;

pub use scope::{RecordQuery, TagScope};
