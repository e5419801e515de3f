//! Ring Automatic Protection Switching PDU (G.8032)
//!
//! ```text
//!  octet
//!  1-4     common CFM header (version 1, opcode 40, first TLV offset 32)
//!  5       request/state (high nibble) | sub-code (low nibble)
//!  6       RB | DNF | BPR | reserved(5)
//!  7-12    node id
//!  13-36   reserved
//! ```

use crate::core::{Config, Error, MacAddress, Result};
use super::frame::{Frame, VlanTag};
use super::{raps_group_address, Opcode, CFM_VERSION_1};

/// Length of the R-APS specific information
pub const RAPS_PDU_LEN: usize = 32;

const STATUS_RB: u8 = 0x80;
const STATUS_DNF: u8 = 0x40;
const STATUS_BPR: u8 = 0x20;

/// R-APS request/state codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RapsRequest {
    NoRequest = 0b0000,
    ManualSwitch = 0b0111,
    SignalFail = 0b1011,
    ForcedSwitch = 0b1101,
    Event = 0b1110,
}

impl TryFrom<u8> for RapsRequest {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0b0000 => Ok(RapsRequest::NoRequest),
            0b0111 => Ok(RapsRequest::ManualSwitch),
            0b1011 => Ok(RapsRequest::SignalFail),
            0b1101 => Ok(RapsRequest::ForcedSwitch),
            0b1110 => Ok(RapsRequest::Event),
            other => Err(Error::malformed(format!("unknown R-APS request {:#06b}", other))),
        }
    }
}

/// Status bits of an R-APS PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RapsStatus {
    /// RPL blocked
    pub rb: bool,
    /// Do not flush
    pub dnf: bool,
    /// Blocked port reference
    pub bpr: bool,
}

impl RapsStatus {
    fn to_octet(self) -> u8 {
        (if self.rb { STATUS_RB } else { 0 })
            | (if self.dnf { STATUS_DNF } else { 0 })
            | (if self.bpr { STATUS_BPR } else { 0 })
    }

    fn from_octet(octet: u8) -> Self {
        RapsStatus {
            rb: octet & STATUS_RB != 0,
            dnf: octet & STATUS_DNF != 0,
            bpr: octet & STATUS_BPR != 0,
        }
    }
}

/// Fields of an R-APS PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RapsPdu {
    /// Raw 4-bit request/state code; see [`RapsPdu::request`]
    pub request_code: u8,
    pub sub_code: u8,
    pub status: RapsStatus,
    pub node_id: MacAddress,
}

impl RapsPdu {
    /// A request with no status bits set
    pub fn new(request: RapsRequest, node_id: MacAddress) -> Self {
        RapsPdu {
            request_code: request as u8,
            sub_code: 0,
            status: RapsStatus::default(),
            node_id,
        }
    }

    /// The request, if the code is one G.8032 defines
    pub fn request(&self) -> Option<RapsRequest> {
        RapsRequest::try_from(self.request_code).ok()
    }

    fn encode(&self) -> [u8; RAPS_PDU_LEN] {
        let mut pdu = [0u8; RAPS_PDU_LEN];
        pdu[0] = ((self.request_code & 0x0F) << 4) | (self.sub_code & 0x0F);
        pdu[1] = self.status.to_octet();
        pdu[2..8].copy_from_slice(&self.node_id.0);
        pdu
    }
}

/// Builds an R-APS frame for the configured ring, sourced from `local`
pub fn build_raps(config: &Config, local: MacAddress, pdu: &RapsPdu) -> Result<Frame> {
    let vlan = config.vlan_tag().map(VlanTag::new).transpose()?;
    let mut frame = Frame::begin(raps_group_address(config.ring_id), local, vlan);
    frame.add_cfm_header(
        config.md_level,
        0,
        Opcode::Raps.first_tlv_offset(),
        Opcode::Raps,
        CFM_VERSION_1,
    )?;
    frame.put(&pdu.encode())?;
    frame.add_end_tlv()?;
    Ok(frame)
}

/// Builds the Signal-Fail request whose node id is the local MAC
pub fn build_signal_fail(config: &Config, local: MacAddress) -> Result<Frame> {
    build_raps(config, local, &RapsPdu::new(RapsRequest::SignalFail, local))
}

/// Validates EtherType and opcode only; R-APS is any-to-any multicast,
/// so neither MAC address is checked. Unknown request codes are kept raw
/// and a short payload reads as zero-filled.
pub fn match_raps(frame: &Frame) -> Result<RapsPdu> {
    if !frame.is_cfm() {
        return Err(Error::mismatch("not a CFM frame"));
    }
    if frame.header()?.opcode != Opcode::Raps.value() {
        return Err(Error::mismatch("not an R-APS PDU"));
    }
    let mut pdu = [0u8; RAPS_PDU_LEN];
    let payload = frame.pdu()?;
    let len = payload.len().min(RAPS_PDU_LEN);
    pdu[..len].copy_from_slice(&payload[..len]);

    Ok(RapsPdu {
        request_code: pdu[0] >> 4,
        sub_code: pdu[0] & 0x0F,
        status: RapsStatus::from_octet(pdu[1]),
        node_id: MacAddress::from_slice(&pdu[2..8])?,
    })
}
