//! Bundled profiles
//!
//! The core profile is the generic bootstrap every host needs: base value
//! types, the standard conversion table, and a small catalogue of
//! domain-neutral nodes. Domain catalogues are supplied by host profiles.

mod core;

pub use core::*;
