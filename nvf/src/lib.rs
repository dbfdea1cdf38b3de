//! NV Fabric — the shared infrastructure of the NV microservice platform.
//!
//! This facade crate re-exports the fabric sub-crates through a single
//! dependency with feature flags:
//!
//! | Feature  | Default | Crate        |
//! |----------|---------|--------------|
//! | `mirror` | **yes** | `nvf-mirror` |
//! | `policy` | **yes** | `nvf-policy` |
//! | `token`  | **yes** | `nvf-token`  |
//! | `s2s`    | **yes** | `nvf-s2s`    |
//! | `wal`    | **yes** | `nvf-wal`    |
//! | `edge`   | **yes** | `nvf-edge`   |
//! | `full`   | no      | All of the above |
//!
//! `nvf-core` and `nvf-config` are always present.

pub use nvf_config;
pub use nvf_core;

// Re-export the kernel at the top level for convenience.
pub use nvf_core::*;

#[cfg(feature = "mirror")]
pub use nvf_mirror;

#[cfg(feature = "policy")]
pub use nvf_policy;

#[cfg(feature = "token")]
pub use nvf_token;

#[cfg(feature = "s2s")]
pub use nvf_s2s;

#[cfg(feature = "wal")]
pub use nvf_wal;

#[cfg(feature = "edge")]
pub use nvf_edge;
