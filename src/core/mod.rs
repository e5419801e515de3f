//! Core types and traits for the CFM/ERPS engine
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    CcmInterval,
    Config,
    MacAddress,
    MepId,
};

/// Highest MEP ID allowed by IEEE 802.1ag
pub const MAX_MEPID: u16 = 8191;

/// Maximum frame size in octets
pub const MAX_FRAME_SIZE: usize = 1516;

/// Minimum Ethernet frame length without FCS
pub const ETHER_MIN_LEN: usize = 60;

/// Size of the MAID field carried in a CCM
pub const MAID_SIZE: usize = 48;

/// Longest Maintenance Domain name that fits a MAID
pub const MAX_MD_NAME_LEN: usize = 43;

/// Highest MD level
pub const MAX_MD_LEVEL: u8 = 7;

/// Highest usable VLAN id
pub const MAX_VLAN_ID: u16 = 4094;
