//! Continuity Check Message
//!
//! ```text
//!  octet
//!  1-4     common CFM header (opcode 1, first TLV offset 70)
//!  5-8     sequence number
//!  9-10    MEP ID
//!  11-58   MAID (48 octets)
//!  59-74   defined by ITU-T Y.1731, transmitted as zero
//!  75-     Sender ID, Port Status, Interface Status and End TLVs
//! ```

use crate::core::{CcmInterval, Config, Error, MacAddress, MepId, Result, MAID_SIZE, MAX_MD_NAME_LEN, MAX_MEPID};
use super::frame::{Frame, VlanTag};
use super::tlv::{PortStatus, InterfaceStatus, TLV_INTERFACE_STATUS, TLV_PORT_STATUS, TLV_SENDER_ID};
use super::{cfm_group_address, Opcode, CFM_VERSION_0};

/// Remote Defect Indication flag
pub const CCM_RDI_FLAG: u8 = 0x80;

/// Y.1731 reserved area following the MAID
pub const Y1731_RESERVED_LEN: usize = 16;

/// MD name format: no name present
pub const MD_FORMAT_NONE: u8 = 1;

/// MD name format: character string
pub const MD_FORMAT_STRING: u8 = 4;

/// Short MA name format: character string
pub const MA_FORMAT_STRING: u8 = 2;

/// Maintenance Association Identifier as carried in a CCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maid {
    pub md_format: u8,
    pub md_name: Vec<u8>,
    pub ma_format: u8,
    pub ma_name: Vec<u8>,
}

impl Maid {
    /// Character-string MD and short MA names
    pub fn from_names(md_name: &str, ma_name: &str) -> Self {
        Maid {
            md_format: MD_FORMAT_STRING,
            md_name: md_name.as_bytes().to_vec(),
            ma_format: MA_FORMAT_STRING,
            ma_name: ma_name.as_bytes().to_vec(),
        }
    }

    /// Packs the names into the 48-octet field, truncating names that do not fit
    pub fn encode(&self) -> [u8; MAID_SIZE] {
        let mut maid = [0u8; MAID_SIZE];
        let md_len = if self.md_format == MD_FORMAT_NONE {
            0
        } else {
            self.md_name.len().min(MAX_MD_NAME_LEN)
        };
        let ma_len = self.ma_name.len().min(MAID_SIZE - 4 - md_len);

        maid[0] = self.md_format;
        let mut pos = 1;
        if self.md_format != MD_FORMAT_NONE {
            maid[1] = md_len as u8;
            maid[2..2 + md_len].copy_from_slice(&self.md_name[..md_len]);
            pos = 2 + md_len;
        }
        maid[pos] = self.ma_format;
        maid[pos + 1] = ma_len as u8;
        maid[pos + 2..pos + 2 + ma_len].copy_from_slice(&self.ma_name[..ma_len]);
        maid
    }

    /// Unpacks a MAID field
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MAID_SIZE {
            return Err(Error::malformed("truncated MAID"));
        }
        let md_format = data[0];
        let (md_name, mut pos) = if md_format == MD_FORMAT_NONE {
            (Vec::new(), 1)
        } else {
            let md_len = usize::from(data[1]);
            if md_format == MD_FORMAT_STRING && (md_len < 1 || md_len > MAX_MD_NAME_LEN) {
                return Err(Error::malformed(format!("illegal MD name length {}", md_len)));
            }
            if 2 + md_len + 2 > MAID_SIZE {
                return Err(Error::malformed(format!("MD name length {} overflows MAID", md_len)));
            }
            (data[2..2 + md_len].to_vec(), 2 + md_len)
        };

        let ma_format = data[pos];
        let mut ma_len = usize::from(data[pos + 1]);
        pos += 2;
        if ma_format == MA_FORMAT_STRING && ma_len < 1 {
            return Err(Error::malformed("illegal short MA name length 0"));
        }
        ma_len = ma_len.min(MAID_SIZE - pos);
        let ma_name = data[pos..pos + ma_len].to_vec();

        Ok(Maid { md_format, md_name, ma_format, ma_name })
    }

    /// Compares character-string names against the configured ones.
    /// Names in other formats are not compared.
    pub fn check_names(&self, md_name: &str, ma_name: &str) -> Result<()> {
        if self.md_format == MD_FORMAT_STRING && self.md_name != md_name.as_bytes() {
            return Err(Error::mismatch(format!(
                "MD \"{}\" (expected \"{}\")",
                String::from_utf8_lossy(&self.md_name),
                md_name
            )));
        }
        if self.ma_format == MA_FORMAT_STRING && self.ma_name != ma_name.as_bytes() {
            return Err(Error::mismatch(format!(
                "MA \"{}\" (expected \"{}\")",
                String::from_utf8_lossy(&self.ma_name),
                ma_name
            )));
        }
        Ok(())
    }
}

/// Builds the CCM this MEP transmits. The sequence number is zero and is
/// stamped at send time.
pub fn build_ccm(config: &Config, local: MacAddress) -> Result<Frame> {
    let mep_id = config
        .mep_id
        .ok_or_else(|| Error::config("a MEP ID is required to send CCMs"))?;
    let vlan = config.vlan_tag().map(VlanTag::new).transpose()?;

    let mut frame = Frame::begin(cfm_group_address(config.md_level), local, vlan);
    frame.add_cfm_header(
        config.md_level,
        config.ccm_interval.code(),
        Opcode::Ccm.first_tlv_offset(),
        Opcode::Ccm,
        CFM_VERSION_0,
    )?;
    frame.put_u32(0)?;
    frame.put_u16(mep_id)?;
    frame.put(&Maid::from_names(&config.md_name, &config.ma_name).encode())?;
    frame.put(&[0u8; Y1731_RESERVED_LEN])?;

    // chassis ID length 0: no chassis ID present
    frame.add_tlv(TLV_SENDER_ID, &[0])?;
    frame.add_tlv(TLV_PORT_STATUS, &[PortStatus::Up as u8])?;
    frame.add_tlv(TLV_INTERFACE_STATUS, &[InterfaceStatus::Up as u8])?;
    frame.add_end_tlv()?;
    Ok(frame)
}

/// Fields of a received CCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcmPdu {
    pub src: MacAddress,
    pub md_level: u8,
    pub flags: u8,
    pub sequence: u32,
    pub mep_id: MepId,
    pub maid: Maid,
    /// Last Port Status TLV value, if present
    pub port_status: Option<u8>,
    /// Last Interface Status TLV value, if present
    pub interface_status: Option<u8>,
}

impl CcmPdu {
    /// Advertised transmission interval
    pub fn interval(&self) -> Option<CcmInterval> {
        CcmInterval::from_code(self.flags)
    }

    /// Remote Defect Indication
    pub fn rdi(&self) -> bool {
        self.flags & CCM_RDI_FLAG != 0
    }
}

/// Parses a CCM without applying any receiver policy
pub fn parse_ccm(frame: &Frame) -> Result<CcmPdu> {
    if !frame.is_cfm() {
        return Err(Error::mismatch("not a CFM frame"));
    }
    let header = frame.header()?;
    if header.opcode != Opcode::Ccm.value() {
        return Err(Error::mismatch(format!("opcode {} is not CCM", header.opcode)));
    }
    let pdu = frame.pdu()?;
    if pdu.len() < 4 + 2 + MAID_SIZE + Y1731_RESERVED_LEN {
        return Err(Error::malformed("truncated CCM payload"));
    }
    let sequence = u32::from_be_bytes([pdu[0], pdu[1], pdu[2], pdu[3]]);
    let mep_id = u16::from_be_bytes([pdu[4], pdu[5]]);
    if mep_id == 0 || mep_id > MAX_MEPID {
        return Err(Error::malformed(format!("MEP ID {} out of range", mep_id)));
    }
    let maid = Maid::decode(&pdu[6..6 + MAID_SIZE])?;

    let mut port_status = None;
    let mut interface_status = None;
    for tlv in frame.tlvs()? {
        let tlv = tlv?;
        match tlv.tlv_type {
            TLV_PORT_STATUS => port_status = tlv.first_octet(),
            TLV_INTERFACE_STATUS => interface_status = tlv.first_octet(),
            _ => {}
        }
    }

    Ok(CcmPdu {
        src: frame.src_mac()?,
        md_level: header.md_level,
        flags: header.flags,
        sequence,
        mep_id,
        maid,
        port_status,
        interface_status,
    })
}

/// Receiver filters applied before the MD level check: VLAN and own MEP ID
pub fn match_ccm(frame: &Frame, config: &Config) -> Result<CcmPdu> {
    let vid = frame.vlan_id();
    if vid != config.vlan {
        return Err(Error::mismatch(format!(
            "CCM received with vlan {} (ours {})",
            vid, config.vlan
        )));
    }
    let ccm = parse_ccm(frame)?;
    if Some(ccm.mep_id) == config.mep_id {
        return Err(Error::mismatch(format!(
            "CCM received with our MEP ID {}",
            ccm.mep_id
        )));
    }
    Ok(ccm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tlv::TLV_END;

    fn local() -> MacAddress {
        MacAddress([0x02, 0, 0, 0, 0, 0x01])
    }

    fn config() -> Config {
        Config {
            mep_id: Some(11),
            md_level: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_maid_encoding() {
        let maid = Maid::from_names("HCL", "HCL_ERPS").encode();
        let mut expected = vec![4, 3, b'H', b'C', b'L', 2, 8];
        expected.extend_from_slice(b"HCL_ERPS");
        expected.resize(MAID_SIZE, 0);
        assert_eq!(maid.to_vec(), expected);

        let decoded = Maid::decode(&maid).unwrap();
        assert_eq!(decoded, Maid::from_names("HCL", "HCL_ERPS"));
    }

    #[test]
    fn test_maid_truncates_long_ma_name() {
        let md = "d".repeat(40);
        let maid = Maid::from_names(&md, "abcdefgh").encode();
        assert_eq!(maid[42], MA_FORMAT_STRING);
        assert_eq!(maid[43], 4);
        assert_eq!(&maid[44..48], b"abcd");
    }

    #[test]
    fn test_maid_rejects_bad_lengths() {
        let mut maid = Maid::from_names("HCL", "HCL_ERPS").encode();
        maid[1] = 0;
        assert!(Maid::decode(&maid).is_err());
        maid[1] = 44;
        assert!(Maid::decode(&maid).is_err());
        assert!(Maid::decode(&[4, 3]).is_err());
    }

    #[test]
    fn test_name_check() {
        let maid = Maid::from_names("HCL", "HCL_ERPS");
        assert!(maid.check_names("HCL", "HCL_ERPS").is_ok());
        assert!(matches!(maid.check_names("HC", "HCL_ERPS"), Err(Error::FilterMismatch(_))));
        assert!(maid.check_names("HCL", "HCL_ERPS2").is_err());

        let unnamed = Maid { md_format: MD_FORMAT_NONE, md_name: vec![], ..maid };
        assert!(unnamed.check_names("anything", "HCL_ERPS").is_ok());
    }

    #[test]
    fn test_build_layout() {
        let frame = build_ccm(&config(), local()).unwrap();
        let bytes = frame.as_bytes();

        assert_eq!(frame.dst_mac().unwrap().to_string(), "01:80:c2:00:00:33");
        assert_eq!(frame.kind(), Some(Opcode::Ccm));
        let header = frame.header().unwrap();
        assert_eq!(header.md_level, 3);
        assert_eq!(header.version, 0);
        assert_eq!(header.flags, 4);
        assert_eq!(header.first_tlv_offset, 70);

        // 14 ethernet + 4 header + 70 payload + 4 + 4 + 4 + 1 TLVs
        assert_eq!(frame.len(), 101);
        assert_eq!(&bytes[22..24], &[0, 11]);
        assert_eq!(bytes[88], TLV_SENDER_ID);
        assert_eq!(bytes[100], TLV_END);
    }

    #[test]
    fn test_build_requires_mep_id() {
        let config = Config::default();
        assert!(matches!(build_ccm(&config, local()), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_round_trip() {
        let mut frame = build_ccm(&config(), local()).unwrap();
        frame.set_transaction_id(42).unwrap();

        let ccm = parse_ccm(&frame).unwrap();
        assert_eq!(ccm.src, local());
        assert_eq!(ccm.mep_id, 11);
        assert_eq!(ccm.sequence, 42);
        assert_eq!(ccm.md_level, 3);
        assert_eq!(ccm.interval(), Some(CcmInterval::Sec1));
        assert!(!ccm.rdi());
        assert_eq!(ccm.port_status, Some(PortStatus::Up as u8));
        assert_eq!(ccm.interface_status, Some(InterfaceStatus::Up as u8));
        assert!(ccm.maid.check_names("HCL", "HCL_ERPS").is_ok());
    }

    #[test]
    fn test_match_filters() {
        let sender = Config { mep_id: Some(12), vlan: 20, ..config() };
        let frame = build_ccm(&sender, local()).unwrap();

        let receiver = Config { vlan: 20, ..config() };
        assert_eq!(match_ccm(&frame, &receiver).unwrap().mep_id, 12);

        let other_vlan = Config { vlan: 21, ..config() };
        assert!(matches!(match_ccm(&frame, &other_vlan), Err(Error::FilterMismatch(_))));

        let untagged = config();
        assert!(match_ccm(&frame, &untagged).is_err());

        let same_mep = Config { mep_id: Some(12), vlan: 20, ..config() };
        assert!(match_ccm(&frame, &same_mep).is_err());
    }

    #[test]
    fn test_untagged_frame_on_vlan_zero() {
        let sender = Config { mep_id: Some(12), ..config() };
        let frame = build_ccm(&sender, local()).unwrap();
        assert!(match_ccm(&frame, &config()).is_ok());

        let tagged_receiver = Config { vlan: 5, ..config() };
        assert!(match_ccm(&frame, &tagged_receiver).is_err());
    }

    #[test]
    fn test_truncated_tlvs_are_malformed() {
        let frame = build_ccm(&config(), local()).unwrap();
        let cut = Frame::from_bytes(&frame.as_bytes()[..frame.len() - 3]).unwrap();
        assert!(matches!(parse_ccm(&cut), Err(Error::MalformedFrame(_))));
    }
}
