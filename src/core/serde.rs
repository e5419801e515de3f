use serde::{Serialize, Deserialize, Serializer, Deserializer};
use serde::de::Error as _;

use super::types::{CcmInterval, MacAddress};

/// Serializes an optional MAC address as its colon-separated string form
pub fn serialize_mac_opt<S>(mac: &Option<MacAddress>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    mac.map(|m| m.to_string()).serialize(serializer)
}

/// Deserializes an optional MAC address from any accepted string form
pub fn deserialize_mac_opt<'de, D>(deserializer: D) -> Result<Option<MacAddress>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?;
    text.map(|s| s.parse::<MacAddress>().map_err(D::Error::custom))
        .transpose()
}

/// Serializes a CCM interval as milliseconds
pub fn serialize_interval<S>(interval: &CcmInterval, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    interval.as_millis().serialize(serializer)
}

/// Deserializes a CCM interval from milliseconds, rejecting unsupported values
pub fn deserialize_interval<'de, D>(deserializer: D) -> Result<CcmInterval, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    CcmInterval::from_millis(ms).map_err(D::Error::custom)
}
