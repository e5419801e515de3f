//! Protocol implementation module
//!
//! This module defines the CFM wire format: the frame buffer and common header,
//! TLV records, and the CCM, LBM/LBR, LTM/LTR and R-APS payload variants.

pub mod ccm;
pub mod codec;
pub mod frame;
pub mod linktrace;
pub mod loopback;
pub mod raps;
pub mod tlv;

pub use self::codec::FrameCodec;
pub use self::frame::{CfmHeader, Frame};
pub use self::raps::{RapsPdu, RapsRequest};
pub use self::tlv::{Tlv, TlvIter};

use crate::core::{Error, MacAddress, Result};

/// 802.1Q tag protocol identifier
pub const ETYPE_8021Q: u16 = 0x8100;

/// CFM EtherType
pub const ETYPE_CFM: u16 = 0x8902;

/// Version field for 802.1ag PDUs
pub const CFM_VERSION_0: u8 = 0;

/// Version field for R-APS PDUs
pub const CFM_VERSION_1: u8 = 1;

/// CFM group address base, the last nibble carries the MD level
pub const CFM_GROUP_MAC: MacAddress = MacAddress([0x01, 0x80, 0xC2, 0x00, 0x00, 0x30]);

/// R-APS multicast base, the last octet carries the ring id
pub const RAPS_GROUP_MAC: MacAddress = MacAddress([0x01, 0x19, 0xA7, 0x00, 0x00, 0x01]);

/// CFM opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Ccm = 1,
    Lbr = 2,
    Lbm = 3,
    Ltr = 4,
    Ltm = 5,
    Raps = 40,
}

impl Opcode {
    /// Returns the raw opcode value
    pub fn value(self) -> u8 {
        self as u8
    }

    /// First-TLV offset used when building a PDU with this opcode
    pub fn first_tlv_offset(self) -> u8 {
        match self {
            Opcode::Ccm => 70,
            Opcode::Lbm | Opcode::Lbr => 4,
            Opcode::Ltm => 17,
            Opcode::Ltr => 6,
            Opcode::Raps => 32,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Opcode::Ccm),
            2 => Ok(Opcode::Lbr),
            3 => Ok(Opcode::Lbm),
            4 => Ok(Opcode::Ltr),
            5 => Ok(Opcode::Ltm),
            40 => Ok(Opcode::Raps),
            other => Err(Error::malformed(format!("unknown CFM opcode {}", other))),
        }
    }
}

/// CFM group destination for the given MD level
pub fn cfm_group_address(md_level: u8) -> MacAddress {
    let mut mac = CFM_GROUP_MAC;
    mac.0[5] = 0x30 | (md_level & 0x0F);
    mac
}

/// Linktrace group destination for the given MD level
pub fn ltm_group_address(md_level: u8) -> MacAddress {
    let mut mac = CFM_GROUP_MAC;
    mac.0[5] = 0x38 | (md_level & 0x07);
    mac
}

/// R-APS destination for the given ring id
pub fn raps_group_address(ring_id: u8) -> MacAddress {
    let mut mac = RAPS_GROUP_MAC;
    mac.0[5] = ring_id;
    mac
}
