use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use super::{Error, Result, MAID_SIZE, MAX_MD_LEVEL, MAX_MD_NAME_LEN, MAX_MEPID, MAX_VLAN_ID};

/// Maintenance association End Point identifier
pub type MepId = u16;

/// 48-bit IEEE 802 MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The all-zero address
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    /// Returns the raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Group (multicast or broadcast) addresses have the I/G bit set
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Returns true for the CFM group addresses `01:80:C2:00:00:3x`
    pub fn is_cfm_group(&self) -> bool {
        self.0[..5] == [0x01, 0x80, 0xC2, 0x00, 0x00] && self.0[5] & 0xF0 == 0x30
    }

    /// Parses a MAC address slice; the slice must be exactly 6 octets
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| Error::malformed(format!("MAC address needs 6 octets, got {}", bytes.len())))?;
        Ok(MacAddress(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` and `aabb.ccdd.eeff`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::config(format!("invalid MAC address '{}'", s));
        let mut octets = [0u8; 6];

        if s.contains('.') {
            let groups: Vec<&str> = s.split('.').collect();
            if groups.len() != 3 {
                return Err(invalid());
            }
            for (i, group) in groups.iter().enumerate() {
                if group.is_empty() || group.len() > 4 {
                    return Err(invalid());
                }
                let value = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
                octets[i * 2..i * 2 + 2].copy_from_slice(&value.to_be_bytes());
            }
            return Ok(MacAddress(octets));
        }

        let sep = if s.contains('-') { '-' } else { ':' };
        let parts: Vec<&str> = s.split(sep).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(MacAddress(octets))
    }
}

/// CCM transmission interval, encoded in the low 3 bits of the CCM flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CcmInterval {
    Ms100,
    Sec1,
    Sec10,
    Min1,
    Min10,
}

impl CcmInterval {
    /// Converts a millisecond value; anything outside the supported set is rejected
    pub fn from_millis(ms: u64) -> Result<Self> {
        match ms {
            100 => Ok(CcmInterval::Ms100),
            1_000 => Ok(CcmInterval::Sec1),
            10_000 => Ok(CcmInterval::Sec10),
            60_000 => Ok(CcmInterval::Min1),
            600_000 => Ok(CcmInterval::Min10),
            other => Err(Error::config(format!(
                "unsupported CCM interval {} ms (use 100, 1000, 10000, 60000 or 600000)",
                other
            ))),
        }
    }

    /// Decodes the 3-bit interval field of a received CCM
    pub fn from_code(code: u8) -> Option<Self> {
        match code & 0x07 {
            3 => Some(CcmInterval::Ms100),
            4 => Some(CcmInterval::Sec1),
            5 => Some(CcmInterval::Sec10),
            6 => Some(CcmInterval::Min1),
            7 => Some(CcmInterval::Min10),
            _ => None,
        }
    }

    /// Returns the interval in milliseconds
    pub fn as_millis(&self) -> u64 {
        match self {
            CcmInterval::Ms100 => 100,
            CcmInterval::Sec1 => 1_000,
            CcmInterval::Sec10 => 10_000,
            CcmInterval::Min1 => 60_000,
            CcmInterval::Min10 => 600_000,
        }
    }

    /// Returns the 3-bit wire code
    pub fn code(&self) -> u8 {
        match self {
            CcmInterval::Ms100 => 3,
            CcmInterval::Sec1 => 4,
            CcmInterval::Sec10 => 5,
            CcmInterval::Min1 => 6,
            CcmInterval::Min10 => 7,
        }
    }

    /// Returns the interval as a duration
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }

    /// Time without a CCM after which a remote MEP is declared down (3.5 intervals)
    pub fn loss_threshold(&self) -> Duration {
        Duration::from_millis(self.as_millis() * 7 / 2)
    }
}

impl Default for CcmInterval {
    fn default() -> Self {
        CcmInterval::Sec1
    }
}

/// Configuration consumed once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface to send and receive on
    pub interface: String,
    /// Local MAC address; discovered from the transport when absent
    #[serde(serialize_with = "super::serde::serialize_mac_opt")]
    #[serde(deserialize_with = "super::serde::deserialize_mac_opt")]
    pub local_mac: Option<MacAddress>,
    /// Loopback target; LBMs are only sent when present
    #[serde(serialize_with = "super::serde::serialize_mac_opt")]
    #[serde(deserialize_with = "super::serde::deserialize_mac_opt")]
    pub remote_mac: Option<MacAddress>,
    /// VLAN id, 0 for untagged
    pub vlan: u16,
    /// Maintenance domain level (0-7)
    pub md_level: u8,
    /// Ring id, last octet of the R-APS destination
    pub ring_id: u8,
    /// Local MEP ID; CCMs are only sent when present
    pub mep_id: Option<MepId>,
    /// CCM transmission interval
    #[serde(serialize_with = "super::serde::serialize_interval")]
    #[serde(deserialize_with = "super::serde::deserialize_interval")]
    pub ccm_interval: CcmInterval,
    /// Number of CCM slots skipped between transmissions
    pub ccm_skips: u32,
    /// Maintenance domain name
    pub md_name: String,
    /// Short maintenance association name
    pub ma_name: String,
    /// Verbose logging
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interface: String::new(),
            local_mac: None,
            remote_mac: None,
            vlan: 0,
            md_level: 0,
            ring_id: 2,
            mep_id: None,
            ccm_interval: CcmInterval::Sec1,
            ccm_skips: 0,
            md_name: "HCL".to_string(),
            ma_name: "HCL_ERPS".to_string(),
            verbose: false,
        }
    }
}

impl Config {
    /// Checks every field that would otherwise produce a broken frame
    pub fn validate(&self) -> Result<()> {
        if self.md_level > MAX_MD_LEVEL {
            return Err(Error::config(format!(
                "MD level should be in range 0-{}, got {}",
                MAX_MD_LEVEL, self.md_level
            )));
        }
        if self.vlan > MAX_VLAN_ID {
            return Err(Error::config(format!(
                "VLAN id should be in range 0-{}, got {}",
                MAX_VLAN_ID, self.vlan
            )));
        }
        if let Some(mep_id) = self.mep_id {
            if mep_id == 0 || mep_id > MAX_MEPID {
                return Err(Error::config(format!(
                    "MEP ID should be in range 1-{}, got {}",
                    MAX_MEPID, mep_id
                )));
            }
        }
        if self.md_name.is_empty() || self.md_name.len() > MAX_MD_NAME_LEN {
            return Err(Error::config(format!(
                "MD name must be 1-{} octets, got {}",
                MAX_MD_NAME_LEN,
                self.md_name.len()
            )));
        }
        if self.ma_name.is_empty() || self.md_name.len() + self.ma_name.len() > MAID_SIZE - 4 {
            return Err(Error::config(format!(
                "MD and MA names must fit in {} octets together",
                MAID_SIZE - 4
            )));
        }
        if let Some(remote) = self.remote_mac {
            if remote.is_multicast() {
                return Err(Error::config(format!("loopback target {} is a group address", remote)));
            }
        }
        Ok(())
    }

    /// VLAN id as an optional tag
    pub fn vlan_tag(&self) -> Option<u16> {
        (self.vlan != 0).then_some(self.vlan)
    }
}
