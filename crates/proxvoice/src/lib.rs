//! Top-level facade crate for proxvoice.
//!
//! Re-exports the wire contracts and the control plane library so users can depend on a single crate.

pub mod core {
    pub use proxvoice_core::*;
}

pub mod control {
    pub use proxvoice_control::*;
}
