//! Linktrace Message and Reply
//!
//! ```text
//!  LTM                              LTR
//!  1-4    common CFM header         1-4   common CFM header
//!  5-8    transaction id            5-8   transaction id
//!  9      TTL                       9     TTL
//!  10-15  original MAC address      10    relay action
//!  16-21  target MAC address
//! ```

use crate::core::{Config, Error, MacAddress, Result};
use super::frame::{Frame, VlanTag};
use super::{ltm_group_address, Opcode, CFM_VERSION_0};

/// LTM flag: use only the FDB
pub const LTM_USE_FDB_ONLY: u8 = 0x80;

/// LTR flag: the LTM was forwarded
pub const LTR_FWD_YES: u8 = 0x40;

/// LTR flag: the replying MP is a MEP
pub const LTR_TERMINAL_MEP: u8 = 0x20;

/// Default TTL for originated LTMs
pub const DEFAULT_LTM_TTL: u8 = 64;

/// Relay action carried in an LTR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelayAction {
    /// The target MAC was reached
    RlyHit = 1,
    /// Forwarded using the filtering database
    RlyFdb = 2,
    /// Forwarded using the MIP CCM database
    RlyMpdb = 3,
}

impl TryFrom<u8> for RelayAction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RelayAction::RlyHit),
            2 => Ok(RelayAction::RlyFdb),
            3 => Ok(RelayAction::RlyMpdb),
            other => Err(Error::malformed(format!("unknown relay action {}", other))),
        }
    }
}

/// Fields of a received LTM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LtmPdu {
    pub md_level: u8,
    pub transaction_id: u32,
    pub ttl: u8,
    pub original: MacAddress,
    pub target: MacAddress,
}

/// Builds an LTM toward `target`, sent to the linktrace group address
pub fn build_ltm(
    config: &Config,
    local: MacAddress,
    target: MacAddress,
    transaction_id: u32,
    ttl: u8,
) -> Result<Frame> {
    let vlan = config.vlan_tag().map(VlanTag::new).transpose()?;
    let mut frame = Frame::begin(ltm_group_address(config.md_level), local, vlan);
    frame.add_cfm_header(
        config.md_level,
        LTM_USE_FDB_ONLY,
        Opcode::Ltm.first_tlv_offset(),
        Opcode::Ltm,
        CFM_VERSION_0,
    )?;
    frame.put_u32(transaction_id)?;
    frame.put_u8(ttl)?;
    frame.put(&local.0)?;
    frame.put(&target.0)?;
    frame.add_end_tlv()?;
    Ok(frame)
}

/// Parses a received LTM
pub fn parse_ltm(frame: &Frame) -> Result<LtmPdu> {
    if !frame.is_cfm() {
        return Err(Error::mismatch("not a CFM frame"));
    }
    let header = frame.header()?;
    if header.opcode != Opcode::Ltm.value() {
        return Err(Error::mismatch("not an LTM"));
    }
    let pdu = frame.pdu()?;
    if pdu.len() < 17 {
        return Err(Error::malformed("truncated LTM payload"));
    }
    Ok(LtmPdu {
        md_level: header.md_level,
        transaction_id: u32::from_be_bytes([pdu[0], pdu[1], pdu[2], pdu[3]]),
        ttl: pdu[4],
        original: MacAddress::from_slice(&pdu[5..11])?,
        target: MacAddress::from_slice(&pdu[11..17])?,
    })
}

/// Builds the LTR a terminal MEP sends back for `ltm`
pub fn build_ltr(
    ltm: &LtmPdu,
    local: MacAddress,
    vlan: Option<VlanTag>,
    action: RelayAction,
) -> Result<Frame> {
    let mut frame = Frame::begin(ltm.original, local, vlan);
    frame.add_cfm_header(
        ltm.md_level,
        LTR_TERMINAL_MEP,
        Opcode::Ltr.first_tlv_offset(),
        Opcode::Ltr,
        CFM_VERSION_0,
    )?;
    frame.put_u32(ltm.transaction_id)?;
    frame.put_u8(ltm.ttl.saturating_sub(1))?;
    frame.put_u8(action as u8)?;
    frame.add_end_tlv()?;
    Ok(frame)
}

/// Outcome of a successful LTR match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LtrMatch {
    pub ttl: u8,
    /// The replying MP reached the target
    pub hit_target: bool,
}

/// Checks a received frame against the LTR expected for an outstanding LTM.
///
/// `vlan` and `md_level` are accepted for symmetry with the other matchers
/// but are not enforced; EtherType, destination, opcode and transaction id are.
pub fn match_ltr(
    frame: &Frame,
    expected_dst: MacAddress,
    _vlan: u16,
    _md_level: u8,
    transaction_id: u32,
) -> Result<LtrMatch> {
    if !frame.is_cfm() {
        return Err(Error::mismatch("not a CFM frame"));
    }
    let dst = frame.dst_mac()?;
    if dst != expected_dst {
        return Err(Error::mismatch(format!("LTR addressed to {} (ours {})", dst, expected_dst)));
    }
    if frame.header()?.opcode != Opcode::Ltr.value() {
        return Err(Error::mismatch("not an LTR"));
    }
    let pdu = frame.pdu()?;
    if pdu.len() < 6 {
        return Err(Error::malformed("truncated LTR payload"));
    }
    let received = u32::from_be_bytes([pdu[0], pdu[1], pdu[2], pdu[3]]);
    if received != transaction_id {
        return Err(Error::mismatch(format!(
            "LTR transaction id {} (expected {})",
            received, transaction_id
        )));
    }
    Ok(LtrMatch {
        ttl: pdu[4],
        hit_target: pdu[5] == RelayAction::RlyHit as u8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> MacAddress {
        MacAddress([0x02, 0, 0, 0, 0, 0x01])
    }

    fn target() -> MacAddress {
        MacAddress([0x02, 0, 0, 0, 0, 0x02])
    }

    #[test]
    fn test_ltm_layout() {
        let config = Config { md_level: 2, ..Default::default() };
        let frame = build_ltm(&config, local(), target(), 9, DEFAULT_LTM_TTL).unwrap();
        assert_eq!(frame.dst_mac().unwrap().to_string(), "01:80:c2:00:00:3a");
        assert_eq!(frame.header().unwrap().first_tlv_offset, 17);

        let ltm = parse_ltm(&frame).unwrap();
        assert_eq!(ltm.transaction_id, 9);
        assert_eq!(ltm.ttl, DEFAULT_LTM_TTL);
        assert_eq!(ltm.original, local());
        assert_eq!(ltm.target, target());
        assert_eq!(ltm.md_level, 2);
    }

    #[test]
    fn test_linktrace_round_trip() {
        let config = Config::default();
        let frame = build_ltm(&config, local(), target(), 1234, 8).unwrap();
        let ltm = parse_ltm(&frame).unwrap();

        let reply = build_ltr(&ltm, target(), None, RelayAction::RlyHit).unwrap();
        assert_eq!(reply.kind(), Some(Opcode::Ltr));
        assert_eq!(reply.header().unwrap().flags, LTR_TERMINAL_MEP);

        let matched = match_ltr(&reply, local(), 0, 0, 1234).unwrap();
        assert!(matched.hit_target);
        assert_eq!(matched.ttl, 7);

        assert!(match_ltr(&reply, local(), 0, 0, 1235).is_err());
        assert!(match_ltr(&reply, target(), 0, 0, 1234).is_err());
        assert!(match_ltr(&frame, local(), 0, 0, 1234).is_err());
    }

    #[test]
    fn test_relay_without_hit() {
        let ltm = LtmPdu {
            md_level: 0,
            transaction_id: 5,
            ttl: 0,
            original: local(),
            target: target(),
        };
        let reply = build_ltr(&ltm, target(), None, RelayAction::RlyFdb).unwrap();
        let matched = match_ltr(&reply, local(), 0, 0, 5).unwrap();
        assert!(!matched.hit_target);
        assert_eq!(matched.ttl, 0);
    }

    #[test]
    fn test_relay_action_values() {
        assert_eq!(RelayAction::try_from(1).unwrap(), RelayAction::RlyHit);
        assert!(RelayAction::try_from(4).is_err());
    }
}
