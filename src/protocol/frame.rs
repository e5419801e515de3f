//! Frame buffer and header codec
//!
//! A [`Frame`] owns the octets of one Ethernet frame carrying a CFM PDU:
//!
//! ```text
//! dst(6) src(6) [0x8100 TCI(2)] 0x8902 | level/version opcode flags first-TLV | payload | TLVs
//! ```
//!
//! Builders append to the frame in wire order; accessors read fields back
//! at their fixed offsets. The valid length never exceeds [`MAX_FRAME_SIZE`].

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::core::{Error, MacAddress, Result, MAX_FRAME_SIZE, MAX_MD_LEVEL, MAX_VLAN_ID};
use super::tlv::{TlvIter, TLV_END};
use super::{Opcode, ETYPE_8021Q, ETYPE_CFM};

/// Untagged Ethernet header length
pub const ETHER_HDR_LEN: usize = 14;

/// 802.1Q tag length
pub const DOT1Q_TAG_LEN: usize = 4;

/// Common CFM header length
pub const CFM_HDR_LEN: usize = 4;

/// 802.1Q tag control information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanTag {
    /// Priority code point (3 bits)
    pub priority: u8,
    /// Drop eligible indicator
    pub drop_eligible: bool,
    /// VLAN id (12 bits)
    pub vid: u16,
}

impl VlanTag {
    /// Creates a tag with priority 0; the VLAN id must be in 1-4094
    pub fn new(vid: u16) -> Result<Self> {
        if vid == 0 || vid > MAX_VLAN_ID {
            return Err(Error::config(format!("allowed VID range is 1-{}, got {}", MAX_VLAN_ID, vid)));
        }
        Ok(VlanTag { priority: 0, drop_eligible: false, vid })
    }

    /// Sets the priority code point
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Encodes PCP(3) / DEI(1) / VID(12)
    pub fn tci(&self) -> u16 {
        (u16::from(self.priority & 0x07) << 13)
            | (u16::from(self.drop_eligible) << 12)
            | (self.vid & 0x0FFF)
    }

    /// Decodes a tag control information field
    pub fn from_tci(tci: u16) -> Self {
        VlanTag {
            priority: (tci >> 13) as u8,
            drop_eligible: tci & 0x1000 != 0,
            vid: tci & 0x0FFF,
        }
    }
}

/// The 4-octet common CFM header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfmHeader {
    pub md_level: u8,
    pub version: u8,
    pub opcode: u8,
    pub flags: u8,
    pub first_tlv_offset: u8,
}

impl CfmHeader {
    /// Reads a header from the first four octets of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CFM_HDR_LEN {
            return Err(Error::malformed("truncated CFM header"));
        }
        Ok(CfmHeader {
            md_level: data[0] >> 5,
            version: data[0] & 0x1F,
            opcode: data[1],
            flags: data[2],
            first_tlv_offset: data[3],
        })
    }

    /// Encodes the header into its wire form
    pub fn to_bytes(&self) -> [u8; CFM_HDR_LEN] {
        [
            ((self.md_level & 0x07) << 5) | (self.version & 0x1F),
            self.opcode,
            self.flags,
            self.first_tlv_offset,
        ]
    }
}

/// One Ethernet frame carrying a CFM PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    buf: BytesMut,
    /// PDU kind stamped by the builder; `None` for received frames
    kind: Option<Opcode>,
}

impl Frame {
    /// Starts a frame: Ethernet addresses, optional 802.1Q tag and the CFM EtherType
    pub fn begin(dst: MacAddress, src: MacAddress, vlan: Option<VlanTag>) -> Self {
        let mut buf = BytesMut::with_capacity(MAX_FRAME_SIZE);
        buf.put_slice(&dst.0);
        buf.put_slice(&src.0);
        if let Some(tag) = vlan {
            buf.put_u16(ETYPE_8021Q);
            buf.put_u16(tag.tci());
        }
        buf.put_u16(ETYPE_CFM);
        Frame { buf, kind: None }
    }

    /// Wraps received octets; nothing beyond the length bound is checked here
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge { len: data.len(), max: MAX_FRAME_SIZE });
        }
        Ok(Frame { buf: BytesMut::from(data), kind: None })
    }

    /// Valid length in octets
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if the frame holds no octets
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The valid octets of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the frame, returning its octets
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// PDU kind recorded by the builder
    pub fn kind(&self) -> Option<Opcode> {
        self.kind
    }

    /// Appends raw octets, refusing to grow past the maximum frame size
    pub fn put(&mut self, data: &[u8]) -> Result<()> {
        let len = self.buf.len() + data.len();
        if len > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge { len, max: MAX_FRAME_SIZE });
        }
        self.buf.put_slice(data);
        Ok(())
    }

    /// Appends a single octet
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value])
    }

    /// Appends a big-endian 16-bit value
    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.put(&value.to_be_bytes())
    }

    /// Appends a big-endian 32-bit value
    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value.to_be_bytes())
    }

    /// Appends the common CFM header. An MD level above 7 is clamped to 0.
    pub fn add_cfm_header(
        &mut self,
        md_level: u8,
        flags: u8,
        first_tlv_offset: u8,
        opcode: Opcode,
        version: u8,
    ) -> Result<()> {
        let md_level = if md_level > MAX_MD_LEVEL {
            warn!(md_level, "allowed MD level range is 0-7, using 0");
            0
        } else {
            md_level
        };
        let header = CfmHeader {
            md_level,
            version,
            opcode: opcode.value(),
            flags,
            first_tlv_offset,
        };
        self.put(&header.to_bytes())?;
        self.kind = Some(opcode);
        Ok(())
    }

    /// Appends a TLV. The End TLV is a lone type octet; every other type
    /// carries a 16-bit length followed by the value.
    pub fn add_tlv(&mut self, tlv_type: u8, value: &[u8]) -> Result<()> {
        if tlv_type == TLV_END {
            return self.put_u8(TLV_END);
        }
        let len = u16::try_from(value.len())
            .map_err(|_| Error::FrameTooLarge { len: value.len(), max: MAX_FRAME_SIZE })?;
        self.put_u8(tlv_type)?;
        self.put_u16(len)?;
        self.put(value)
    }

    /// Appends the End TLV
    pub fn add_end_tlv(&mut self) -> Result<()> {
        self.add_tlv(TLV_END, &[])
    }

    fn require(&self, len: usize, what: &str) -> Result<()> {
        if self.buf.len() < len {
            return Err(Error::malformed(format!(
                "frame of {} octets too short for {}",
                self.buf.len(),
                what
            )));
        }
        Ok(())
    }

    /// Destination MAC address
    pub fn dst_mac(&self) -> Result<MacAddress> {
        self.require(6, "destination MAC")?;
        MacAddress::from_slice(&self.buf[0..6])
    }

    /// Source MAC address
    pub fn src_mac(&self) -> Result<MacAddress> {
        self.require(12, "source MAC")?;
        MacAddress::from_slice(&self.buf[6..12])
    }

    /// Overwrites the destination MAC address
    pub fn set_dst_mac(&mut self, mac: MacAddress) -> Result<()> {
        self.require(6, "destination MAC")?;
        self.buf[0..6].copy_from_slice(&mac.0);
        Ok(())
    }

    /// Overwrites the source MAC address
    pub fn set_src_mac(&mut self, mac: MacAddress) -> Result<()> {
        self.require(12, "source MAC")?;
        self.buf[6..12].copy_from_slice(&mac.0);
        Ok(())
    }

    fn read_u16(&self, offset: usize) -> Result<u16> {
        self.require(offset + 2, "16-bit field")?;
        Ok(u16::from_be_bytes([self.buf[offset], self.buf[offset + 1]]))
    }

    fn read_u32(&self, offset: usize) -> Result<u32> {
        self.require(offset + 4, "32-bit field")?;
        let mut octets = [0u8; 4];
        octets.copy_from_slice(&self.buf[offset..offset + 4]);
        Ok(u32::from_be_bytes(octets))
    }

    /// True if the outer EtherType is the 802.1Q TPID
    pub fn is_tagged(&self) -> bool {
        matches!(self.read_u16(12), Ok(ETYPE_8021Q))
    }

    /// The 802.1Q tag, if present
    pub fn vlan(&self) -> Option<VlanTag> {
        if !self.is_tagged() {
            return None;
        }
        self.read_u16(14).ok().map(VlanTag::from_tci)
    }

    /// VLAN id of a tagged frame, 0 for untagged frames
    pub fn vlan_id(&self) -> u16 {
        self.vlan().map_or(0, |tag| tag.vid)
    }

    /// The EtherType behind the optional tag
    pub fn ether_type(&self) -> Result<u16> {
        if self.is_tagged() {
            self.read_u16(16)
        } else {
            self.read_u16(12)
        }
    }

    /// True if the frame carries the CFM EtherType
    pub fn is_cfm(&self) -> bool {
        matches!(self.ether_type(), Ok(ETYPE_CFM))
    }

    /// Offset of the common CFM header
    pub fn cfm_offset(&self) -> usize {
        if self.is_tagged() {
            ETHER_HDR_LEN + DOT1Q_TAG_LEN
        } else {
            ETHER_HDR_LEN
        }
    }

    /// Parses the common CFM header
    pub fn header(&self) -> Result<CfmHeader> {
        let offset = self.cfm_offset();
        self.require(offset + CFM_HDR_LEN, "CFM header")?;
        CfmHeader::parse(&self.buf[offset..])
    }

    /// The opcode, if it is one this crate knows
    pub fn opcode(&self) -> Result<Opcode> {
        Opcode::try_from(self.header()?.opcode)
    }

    /// Rewrites the opcode in place
    pub fn set_opcode(&mut self, opcode: Opcode) -> Result<()> {
        let offset = self.cfm_offset() + 1;
        self.require(offset + 1, "CFM opcode")?;
        self.buf[offset] = opcode.value();
        self.kind = Some(opcode);
        Ok(())
    }

    /// Rewrites the flags octet in place
    pub fn set_flags(&mut self, flags: u8) -> Result<()> {
        let offset = self.cfm_offset() + 2;
        self.require(offset + 1, "CFM flags")?;
        self.buf[offset] = flags;
        Ok(())
    }

    /// Offset of the first octet after the common CFM header
    pub fn pdu_offset(&self) -> usize {
        self.cfm_offset() + CFM_HDR_LEN
    }

    /// Octets following the common CFM header
    pub fn pdu(&self) -> Result<&[u8]> {
        let offset = self.pdu_offset();
        self.require(offset, "CFM payload")?;
        Ok(&self.buf[offset..])
    }

    /// Transaction id or sequence number: the first 32 bits after the header
    pub fn transaction_id(&self) -> Result<u32> {
        self.read_u32(self.pdu_offset())
    }

    /// Overwrites the transaction id or sequence number
    pub fn set_transaction_id(&mut self, id: u32) -> Result<()> {
        let offset = self.pdu_offset();
        self.require(offset + 4, "transaction id")?;
        self.buf[offset..offset + 4].copy_from_slice(&id.to_be_bytes());
        Ok(())
    }

    /// Walks the TLVs starting at the header's first-TLV offset
    pub fn tlvs(&self) -> Result<TlvIter<'_>> {
        let header = self.header()?;
        let offset = self.pdu_offset() + usize::from(header.first_tlv_offset);
        self.require(offset, "first TLV")?;
        Ok(TlvIter::new(&self.buf[offset..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddress {
        MacAddress([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn test_untagged_header_layout() {
        let mut frame = Frame::begin(mac(2), mac(1), None);
        assert_eq!(frame.len(), ETHER_HDR_LEN);
        frame.add_cfm_header(5, 0x04, 70, Opcode::Ccm, 0).unwrap();

        let bytes = frame.as_bytes();
        assert_eq!(&bytes[12..14], &[0x89, 0x02]);
        assert_eq!(bytes[14], 5 << 5);
        assert_eq!(bytes[15], 1);
        assert_eq!(bytes[16], 0x04);
        assert_eq!(bytes[17], 70);

        assert!(!frame.is_tagged());
        assert_eq!(frame.vlan_id(), 0);
        assert_eq!(frame.ether_type().unwrap(), ETYPE_CFM);
        assert_eq!(frame.kind(), Some(Opcode::Ccm));
        assert_eq!(frame.dst_mac().unwrap(), mac(2));
        assert_eq!(frame.src_mac().unwrap(), mac(1));
    }

    #[test]
    fn test_tagged_header_layout() {
        let tag = VlanTag::new(100).unwrap().with_priority(7);
        let mut frame = Frame::begin(mac(2), mac(1), Some(tag));
        frame.add_cfm_header(1, 0, 4, Opcode::Lbm, 0).unwrap();

        let bytes = frame.as_bytes();
        assert_eq!(&bytes[12..14], &[0x81, 0x00]);
        assert_eq!(u16::from_be_bytes([bytes[14], bytes[15]]), 0xE064);
        assert_eq!(&bytes[16..18], &[0x89, 0x02]);

        assert!(frame.is_tagged());
        assert_eq!(frame.vlan(), Some(tag));
        assert_eq!(frame.vlan_id(), 100);
        assert_eq!(frame.cfm_offset(), 18);
        let header = frame.header().unwrap();
        assert_eq!(header.md_level, 1);
        assert_eq!(header.opcode, Opcode::Lbm.value());
    }

    #[test]
    fn test_vlan_range() {
        assert!(VlanTag::new(0).is_err());
        assert!(VlanTag::new(4095).is_err());
        assert!(VlanTag::new(1).is_ok());
        assert!(VlanTag::new(4094).is_ok());
    }

    #[test]
    fn test_md_level_clamped() {
        let mut frame = Frame::begin(mac(2), mac(1), None);
        frame.add_cfm_header(9, 0, 4, Opcode::Lbm, 0).unwrap();
        assert_eq!(frame.header().unwrap().md_level, 0);
    }

    #[test]
    fn test_tlv_encoding() {
        let mut frame = Frame::begin(mac(2), mac(1), None);
        frame.add_cfm_header(0, 0, 0, Opcode::Lbm, 0).unwrap();
        frame.add_tlv(2, &[0x02]).unwrap();
        frame.add_end_tlv().unwrap();
        assert_eq!(&frame.as_bytes()[18..], &[2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_frame_size_bound() {
        let mut frame = Frame::begin(mac(2), mac(1), None);
        let filler = vec![0u8; MAX_FRAME_SIZE - frame.len()];
        frame.put(&filler).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_SIZE);
        assert!(matches!(frame.put_u8(0), Err(Error::FrameTooLarge { .. })));
        assert_eq!(frame.len(), MAX_FRAME_SIZE);

        assert!(Frame::from_bytes(&vec![0u8; MAX_FRAME_SIZE + 1]).is_err());
    }

    #[test]
    fn test_short_frame_accessors() {
        let frame = Frame::from_bytes(&[0u8; 10]).unwrap();
        assert!(frame.src_mac().is_err());
        assert!(frame.header().is_err());
        assert!(frame.transaction_id().is_err());
        assert!(!frame.is_cfm());
    }

    #[test]
    fn test_transaction_id_rewrite() {
        let mut frame = Frame::begin(mac(2), mac(1), None);
        frame.add_cfm_header(0, 0, 4, Opcode::Lbm, 0).unwrap();
        frame.put_u32(1).unwrap();
        frame.set_transaction_id(0xDEADBEEF).unwrap();
        assert_eq!(frame.transaction_id().unwrap(), 0xDEADBEEF);
        frame.set_opcode(Opcode::Lbr).unwrap();
        assert_eq!(frame.opcode().unwrap(), Opcode::Lbr);
        assert_eq!(frame.kind(), Some(Opcode::Lbr));
    }
}
