//! CFM/ERPS: IEEE 802.1ag / ITU-T Y.1731 Connectivity Fault Management
//!
//! This library encodes and decodes CFM frames (CCM, LBM/LBR, LTM/LTR and
//! G.8032 R-APS), tracks remote MEPs from the CCMs they send and raises an
//! R-APS Signal-Fail when continuity to one of them is lost.
pub mod core;
pub mod engine;
pub mod network;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Error, Result};
pub use crate::engine::{Engine, EngineHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
