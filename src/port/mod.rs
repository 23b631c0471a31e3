//! Port assignment and port occupancy.
//!
//! [`allocator`] picks ports for new services from the recorded registry
//! state only. [`conflict`] looks at the live host: who is bound to a port,
//! and how to make them let go.

pub mod allocator;
pub mod conflict;

pub use allocator::{allocate, allocate_from, AllocationError};
pub use conflict::{PortOccupants, ProcessInfo};
