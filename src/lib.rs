//! aerodb-sindex - secondary index maintenance for aerodb
//!
//! Keeps value-to-record indexes consistent with record writes under
//! concurrent mutation, index creation and destruction.

pub mod observability;
pub mod sindex;
