//! Top-level facade crate for voltmesh.
//!
//! Re-exports core types and the CSMS library so users can depend on a single crate.

pub mod core {
    pub use voltmesh_core::*;
}

pub mod csms {
    pub use voltmesh_csms::*;
}
