//! Remote MEP table and CCM loss detection

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{CcmInterval, Config, Error, MacAddress, MepId, Result, MAX_MEPID};
use crate::protocol::ccm::match_ccm;
use crate::protocol::Frame;

/// Connectivity state of one remote MEP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MepState {
    /// No CCM ever accepted
    Unseen,
    /// CCMs arriving within the loss threshold
    Healthy,
    /// No CCM within the loss threshold
    Defect,
}

/// What is known about one remote MEP
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteMepEntry {
    /// Source MAC of the last accepted CCM
    pub mac: MacAddress,
    pub active: bool,
    pub defect: bool,
    /// The last CCM was at our MD level
    pub ccm_received_equal: bool,
    pub port_status: Option<u8>,
    pub interface_status: Option<u8>,
    pub last_sequence: Option<u32>,
    /// Declared in defect at or after this instant
    pub expires_at: Option<Instant>,
}

impl RemoteMepEntry {
    pub fn state(&self) -> MepState {
        match (self.active, self.defect) {
            (false, _) => MepState::Unseen,
            (true, false) => MepState::Healthy,
            (true, true) => MepState::Defect,
        }
    }
}

/// Result of an accepted CCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcmAccepted {
    pub mep_id: MepId,
    /// First CCM ever accepted from this MEP
    pub first_seen: bool,
    /// The MEP was in defect and is now healthy again
    pub recovered: bool,
}

/// Fixed-size table indexed by MEP ID (1..=8191)
pub struct RemoteMepTable {
    entries: Vec<RemoteMepEntry>,
    loss_threshold: Duration,
}

impl RemoteMepTable {
    /// Creates an empty table; remote MEPs are expected to use `interval` too
    pub fn new(interval: CcmInterval) -> Self {
        RemoteMepTable {
            entries: vec![RemoteMepEntry::default(); usize::from(MAX_MEPID) + 1],
            loss_threshold: interval.loss_threshold(),
        }
    }

    pub fn loss_threshold(&self) -> Duration {
        self.loss_threshold
    }

    pub fn get(&self, mep_id: MepId) -> Option<&RemoteMepEntry> {
        if mep_id == 0 {
            return None;
        }
        self.entries.get(usize::from(mep_id))
    }

    /// Active entries in MEP ID order
    pub fn active(&self) -> impl Iterator<Item = (MepId, &RemoteMepEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, entry)| entry.active)
            .map(|(id, entry)| (id as MepId, entry))
    }

    /// Applies the receive rules to a CCM.
    ///
    /// Order matters: the MD level is checked before the entry is marked
    /// active, the names only afterwards. A CCM with mismatched names
    /// therefore leaves an active entry without refreshing its deadline.
    pub fn apply_ccm(&mut self, frame: &Frame, config: &Config, now: Instant) -> Result<CcmAccepted> {
        let ccm = match_ccm(frame, config)?;
        debug!(
            mep_id = ccm.mep_id,
            src = %ccm.src,
            level = ccm.md_level,
            sequence = ccm.sequence,
            "CCM received"
        );

        let loss_threshold = self.loss_threshold;
        let entry = &mut self.entries[usize::from(ccm.mep_id)];

        if ccm.md_level != config.md_level {
            entry.ccm_received_equal = false;
            return Err(Error::mismatch(format!(
                "CCM from MEP {} at level {} (ours {})",
                ccm.mep_id, ccm.md_level, config.md_level
            )));
        }

        let first_seen = !entry.active;
        entry.active = true;
        entry.ccm_received_equal = true;
        if first_seen {
            info!(mep_id = ccm.mep_id, mac = %ccm.src, "remote MEP ACTIVE");
        }

        ccm.maid.check_names(&config.md_name, &config.ma_name)?;

        if let Some(interval) = ccm.interval() {
            if interval.loss_threshold() != loss_threshold {
                warn!(
                    mep_id = ccm.mep_id,
                    interval_ms = interval.as_millis(),
                    "remote MEP advertises a different CCM interval"
                );
            }
        }
        if ccm.rdi() {
            debug!(mep_id = ccm.mep_id, "remote defect indication set");
        }

        entry.mac = ccm.src;
        entry.last_sequence = Some(ccm.sequence);
        if ccm.port_status.is_some() {
            entry.port_status = ccm.port_status;
        }
        if ccm.interface_status.is_some() {
            entry.interface_status = ccm.interface_status;
        }

        let recovered = entry.defect;
        if recovered {
            entry.defect = false;
            info!(mep_id = ccm.mep_id, mac = %ccm.src, "remote MEP UP");
        }
        entry.expires_at = Some(now + loss_threshold);

        Ok(CcmAccepted {
            mep_id: ccm.mep_id,
            first_seen,
            recovered,
        })
    }

    /// Declares defect on every healthy MEP whose deadline has passed.
    ///
    /// Returns the MEP IDs that entered defect during this call.
    pub fn sweep(&mut self, now: Instant) -> Vec<MepId> {
        let mut failed = Vec::new();
        for (id, entry) in self.entries.iter_mut().enumerate().skip(1) {
            if !entry.active || entry.defect {
                continue;
            }
            match entry.expires_at {
                Some(deadline) if now >= deadline => {
                    entry.defect = true;
                    info!(mep_id = id, mac = %entry.mac, "remote MEP DOWN");
                    failed.push(id as MepId);
                }
                _ => {}
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ccm::build_ccm;

    fn remote() -> MacAddress {
        MacAddress([0x02, 0, 0, 0, 0, 0x02])
    }

    fn local_config() -> Config {
        Config {
            mep_id: Some(1),
            md_level: 3,
            ..Default::default()
        }
    }

    fn remote_ccm(mep_id: MepId, md_level: u8) -> Frame {
        let config = Config {
            mep_id: Some(mep_id),
            md_level,
            ..Default::default()
        };
        build_ccm(&config, remote()).unwrap()
    }

    #[test]
    fn test_first_ccm_activates() {
        let mut table = RemoteMepTable::new(CcmInterval::Sec1);
        let now = Instant::now();
        assert_eq!(table.get(7).unwrap().state(), MepState::Unseen);

        let accepted = table.apply_ccm(&remote_ccm(7, 3), &local_config(), now).unwrap();
        assert!(accepted.first_seen);
        assert!(!accepted.recovered);

        let entry = table.get(7).unwrap();
        assert_eq!(entry.state(), MepState::Healthy);
        assert_eq!(entry.mac, remote());
        assert!(entry.ccm_received_equal);
        assert_eq!(entry.expires_at, Some(now + Duration::from_millis(3500)));
        assert_eq!(entry.port_status, Some(2));
        assert_eq!(entry.interface_status, Some(1));
        assert_eq!(table.active().count(), 1);
    }

    #[test]
    fn test_loss_after_three_and_a_half_intervals() {
        let mut table = RemoteMepTable::new(CcmInterval::Sec1);
        let t0 = Instant::now();
        table.apply_ccm(&remote_ccm(7, 3), &local_config(), t0).unwrap();

        assert!(table.sweep(t0 + Duration::from_millis(3499)).is_empty());
        assert_eq!(table.get(7).unwrap().state(), MepState::Healthy);

        assert_eq!(table.sweep(t0 + Duration::from_millis(3500)), vec![7]);
        assert_eq!(table.get(7).unwrap().state(), MepState::Defect);

        // already in defect: not reported twice
        assert!(table.sweep(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_recovery() {
        let mut table = RemoteMepTable::new(CcmInterval::Ms100);
        let t0 = Instant::now();
        table.apply_ccm(&remote_ccm(9, 3), &local_config(), t0).unwrap();
        assert_eq!(table.sweep(t0 + Duration::from_millis(350)), vec![9]);

        let t1 = t0 + Duration::from_secs(1);
        let accepted = table.apply_ccm(&remote_ccm(9, 3), &local_config(), t1).unwrap();
        assert!(accepted.recovered);
        assert!(!accepted.first_seen);
        assert_eq!(table.get(9).unwrap().state(), MepState::Healthy);
        assert_eq!(table.get(9).unwrap().expires_at, Some(t1 + Duration::from_millis(350)));
    }

    #[test]
    fn test_level_mismatch_leaves_entry_inactive() {
        let mut table = RemoteMepTable::new(CcmInterval::Sec1);
        let result = table.apply_ccm(&remote_ccm(7, 5), &local_config(), Instant::now());
        assert!(matches!(result, Err(Error::FilterMismatch(_))));

        let entry = table.get(7).unwrap();
        assert!(!entry.active);
        assert!(!entry.ccm_received_equal);
    }

    #[test]
    fn test_level_mismatch_on_active_entry() {
        let mut table = RemoteMepTable::new(CcmInterval::Sec1);
        let t0 = Instant::now();
        table.apply_ccm(&remote_ccm(7, 3), &local_config(), t0).unwrap();

        let result = table.apply_ccm(&remote_ccm(7, 5), &local_config(), t0);
        assert!(matches!(result, Err(Error::FilterMismatch(_))));

        let entry = table.get(7).unwrap();
        assert!(entry.active);
        assert!(!entry.ccm_received_equal);
        assert_eq!(entry.state(), MepState::Healthy);
        assert_eq!(entry.expires_at, Some(t0 + Duration::from_millis(3500)));
        assert!(table.sweep(t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_name_mismatch_marks_active_without_deadline() {
        let mut table = RemoteMepTable::new(CcmInterval::Sec1);
        let config = Config {
            ma_name: "OTHER".to_string(),
            ..local_config()
        };
        let now = Instant::now();
        assert!(table.apply_ccm(&remote_ccm(7, 3), &config, now).is_err());

        let entry = table.get(7).unwrap();
        assert!(entry.active);
        assert_eq!(entry.expires_at, None);
        // nothing to expire
        assert!(table.sweep(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_own_mep_id_rejected() {
        let mut table = RemoteMepTable::new(CcmInterval::Sec1);
        assert!(table.apply_ccm(&remote_ccm(1, 3), &local_config(), Instant::now()).is_err());
        assert!(!table.get(1).unwrap().active);
    }

    #[test]
    fn test_out_of_range_lookup() {
        let table = RemoteMepTable::new(CcmInterval::Sec1);
        assert!(table.get(0).is_none());
        assert!(table.get(MAX_MEPID).is_some());
        assert!(table.get(MAX_MEPID + 1).is_none());
    }
}
