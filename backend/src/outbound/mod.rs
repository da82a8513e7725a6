//! Outbound adapters implementing the farm store port.
//!
//! - **memory**: lock-based store for tests and single-process use
//! - **persistence**: PostgreSQL via Diesel
//!
//! Adapters translate between domain types and storage representations and
//! own atomicity of each committed change. Overlap and rollup rules live in
//! the domain.

pub mod memory;
pub mod persistence;
