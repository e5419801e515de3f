//! Type-Length-Value records

use crate::core::{Error, Result};

pub const TLV_END: u8 = 0;
pub const TLV_SENDER_ID: u8 = 1;
pub const TLV_PORT_STATUS: u8 = 2;
pub const TLV_DATA: u8 = 3;
pub const TLV_INTERFACE_STATUS: u8 = 4;

/// One TLV borrowed from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tlv_type: u8,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// First value octet, which is all the status TLVs carry
    pub fn first_octet(&self) -> Option<u8> {
        self.value.first().copied()
    }
}

/// Port Status TLV values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PortStatus {
    Blocked = 1,
    Up = 2,
}

impl TryFrom<u8> for PortStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PortStatus::Blocked),
            2 => Ok(PortStatus::Up),
            other => Err(Error::malformed(format!("unknown port status {}", other))),
        }
    }
}

/// Interface Status TLV values (RFC 2863 ifOperStatus)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterfaceStatus {
    Up = 1,
    Down = 2,
    Testing = 3,
    Unknown = 4,
    Dormant = 5,
    NotPresent = 6,
    LowerLayerDown = 7,
}

impl TryFrom<u8> for InterfaceStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(InterfaceStatus::Up),
            2 => Ok(InterfaceStatus::Down),
            3 => Ok(InterfaceStatus::Testing),
            4 => Ok(InterfaceStatus::Unknown),
            5 => Ok(InterfaceStatus::Dormant),
            6 => Ok(InterfaceStatus::NotPresent),
            7 => Ok(InterfaceStatus::LowerLayerDown),
            other => Err(Error::malformed(format!("unknown interface status {}", other))),
        }
    }
}

/// Lazy walk over a TLV sequence.
///
/// Stops after the End TLV (which is not yielded). Running past the buffer
/// before an End TLV yields one `MalformedFrame` error and then ends.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> TlvIter<'a> {
    /// Starts a walk at the first octet of `data`
    pub fn new(data: &'a [u8]) -> Self {
        TlvIter { data, pos: 0, done: false }
    }

    fn overrun(&mut self, what: &str) -> Option<Result<Tlv<'a>>> {
        self.done = true;
        Some(Err(Error::malformed(format!("TLV {} runs past end of frame at offset {}", what, self.pos))))
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<Tlv<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(&tlv_type) = self.data.get(self.pos) else {
            return self.overrun("type");
        };
        if tlv_type == TLV_END {
            self.done = true;
            return None;
        }
        let Some(len_bytes) = self.data.get(self.pos + 1..self.pos + 3) else {
            return self.overrun("length");
        };
        let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        let start = self.pos + 3;
        let Some(value) = self.data.get(start..start + len) else {
            return self.overrun("value");
        };
        self.pos = start + len;
        Some(Ok(Tlv { tlv_type, value }))
    }
}

impl std::iter::FusedIterator for TlvIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_until_end() {
        let data = [1, 0, 1, 0, 2, 0, 1, 2, 4, 0, 1, 1, 0, 0xAA, 0xBB];
        let tlvs: Vec<_> = TlvIter::new(&data).collect::<Result<_>>().unwrap();
        assert_eq!(tlvs.len(), 3);
        assert_eq!(tlvs[0], Tlv { tlv_type: TLV_SENDER_ID, value: &[0] });
        assert_eq!(tlvs[1].tlv_type, TLV_PORT_STATUS);
        assert_eq!(tlvs[1].first_octet(), Some(PortStatus::Up as u8));
        assert_eq!(tlvs[2].tlv_type, TLV_INTERFACE_STATUS);
    }

    #[test]
    fn test_empty_value() {
        let data = [TLV_DATA, 0, 0, TLV_END];
        let tlvs: Vec<_> = TlvIter::new(&data).collect::<Result<_>>().unwrap();
        assert_eq!(tlvs, vec![Tlv { tlv_type: TLV_DATA, value: &[] }]);
        assert_eq!(tlvs[0].first_octet(), None);
    }

    #[test]
    fn test_overrun_is_malformed() {
        // length claims 16 octets, only 2 present
        let data = [TLV_DATA, 0, 16, 1, 2];
        let mut iter = TlvIter::new(&data);
        assert!(matches!(iter.next(), Some(Err(Error::MalformedFrame(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_missing_end_is_malformed() {
        let data = [TLV_PORT_STATUS, 0, 1, 2];
        let results: Vec<_> = TlvIter::new(&data).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_truncated_length() {
        let data = [TLV_SENDER_ID, 0];
        assert!(matches!(TlvIter::new(&data).next(), Some(Err(_))));
    }

    #[test]
    fn test_status_values() {
        assert_eq!(PortStatus::try_from(1).unwrap(), PortStatus::Blocked);
        assert!(PortStatus::try_from(3).is_err());
        assert_eq!(InterfaceStatus::try_from(7).unwrap(), InterfaceStatus::LowerLayerDown);
        assert!(InterfaceStatus::try_from(0).is_err());
    }
}
