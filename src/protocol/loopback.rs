//! Loopback Message and Reply

use crate::core::{Config, Error, MacAddress, Result};
use super::frame::{Frame, VlanTag};
use super::tlv::TLV_SENDER_ID;
use super::{Opcode, CFM_VERSION_0};

/// Builds an LBM addressed to the configured remote MAC
pub fn build_lbm(config: &Config, local: MacAddress, transaction_id: u32) -> Result<Frame> {
    let remote = config
        .remote_mac
        .ok_or_else(|| Error::config("a remote MAC is required to send LBMs"))?;
    let vlan = config.vlan_tag().map(VlanTag::new).transpose()?;

    let mut frame = Frame::begin(remote, local, vlan);
    frame.add_cfm_header(
        config.md_level,
        0,
        Opcode::Lbm.first_tlv_offset(),
        Opcode::Lbm,
        CFM_VERSION_0,
    )?;
    frame.put_u32(transaction_id)?;
    // chassis ID length 0: no chassis ID present
    frame.add_tlv(TLV_SENDER_ID, &[0])?;
    frame.add_end_tlv()?;
    Ok(frame)
}

/// Turns a received LBM into the LBR answering it, in place.
///
/// LBMs from group addresses, and LBMs addressed neither to `local` nor to
/// a CFM group address, are rejected.
pub fn convert_lbm_to_lbr(frame: &mut Frame, local: MacAddress) -> Result<()> {
    let src = frame.src_mac()?;
    if src.is_multicast() {
        return Err(Error::mismatch(format!("LBM received from multicast address {}", src)));
    }
    let dst = frame.dst_mac()?;
    if !(dst.is_cfm_group() || dst == local) {
        return Err(Error::mismatch(format!("LBM addressed to {} (ours {})", dst, local)));
    }
    if frame.opcode()? != Opcode::Lbm {
        return Err(Error::mismatch("not an LBM"));
    }

    frame.set_dst_mac(src)?;
    frame.set_src_mac(local)?;
    frame.set_opcode(Opcode::Lbr)
}

/// Checks a received frame against the LBR expected for an outstanding LBM.
///
/// The reply must be a CFM frame addressed to `local`, carry the LBR opcode
/// and the same transaction id. When `peer` is given the reply must also
/// come from it.
pub fn match_lbr(
    frame: &Frame,
    transaction_id: u32,
    local: MacAddress,
    peer: Option<MacAddress>,
) -> Result<()> {
    if !frame.is_cfm() {
        return Err(Error::mismatch("not a CFM frame"));
    }
    let dst = frame.dst_mac()?;
    if dst != local {
        return Err(Error::mismatch(format!("LBR addressed to {} (ours {})", dst, local)));
    }
    if let Some(peer) = peer {
        let src = frame.src_mac()?;
        if src != peer {
            return Err(Error::mismatch(format!("LBR from {} (expected {})", src, peer)));
        }
    }
    if frame.header()?.opcode != Opcode::Lbr.value() {
        return Err(Error::mismatch("not an LBR"));
    }
    let received = frame.transaction_id()?;
    if received != transaction_id {
        return Err(Error::mismatch(format!(
            "TID mismatched: mine is {} while received {}",
            transaction_id, received
        )));
    }
    Ok(())
}
