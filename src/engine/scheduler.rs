//! Periodic CCM/LBM transmission and loss sweeping

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::{Config, MacAddress, MepId, Result};
use crate::network::Transport;
use crate::protocol::ccm::build_ccm;
use crate::protocol::loopback::build_lbm;
use crate::protocol::{Frame, Opcode};
use super::ring::RingProtection;
use super::SharedState;

/// Scheduler wake-up period
pub const WAKEUP: Duration = Duration::from_millis(20);

/// What one scheduler tick did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// A CCM interval elapsed during this tick
    pub slot: bool,
    /// Frames handed to the transport
    pub frames_sent: usize,
    /// Remote MEPs that entered defect during this tick
    pub newly_defective: Vec<MepId>,
    pub signal_fail_sent: bool,
}

/// Sends the CCM and LBM templates once per CCM interval (minus skipped
/// slots), sweeps the remote MEP table and raises Signal-Fail.
pub struct Scheduler {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    shared: Arc<SharedState>,
    ring: RingProtection,
    ccm: Option<Frame>,
    lbm: Option<Frame>,
    sequence: u32,
    next_lbm_id: u32,
    next_slot: Instant,
}

impl Scheduler {
    /// Builds the frame templates. The first slot is due at `start`.
    pub fn new(
        config: Arc<Config>,
        local: MacAddress,
        transport: Arc<dyn Transport>,
        shared: Arc<SharedState>,
        start: Instant,
    ) -> Result<Self> {
        let ccm = match config.mep_id {
            Some(_) => Some(build_ccm(&config, local)?),
            None => None,
        };
        let lbm = match config.remote_mac {
            Some(_) => Some(build_lbm(&config, local, 0)?),
            None => None,
        };
        let next_lbm_id = shared.random_transaction_id();

        Ok(Scheduler {
            ring: RingProtection::new(&config, local)?,
            config,
            transport,
            shared,
            ccm,
            lbm,
            sequence: 0,
            next_lbm_id,
            next_slot: start,
        })
    }

    /// Reseeds the shared transaction id generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.shared.reseed(seed);
        self.next_lbm_id = self.shared.random_transaction_id();
        self
    }

    /// Number of CCM slots elapsed so far
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Transaction id the next LBM will carry
    pub fn next_lbm_id(&self) -> u32 {
        self.next_lbm_id
    }

    /// Runs one scheduling step at `now`
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        let period = self.config.ccm_interval.duration();

        if now >= self.next_slot {
            report.slot = true;
            let every = u64::from(self.config.ccm_skips) + 1;
            if u64::from(self.sequence) % every == 0 {
                for template in [self.ccm.clone(), self.lbm.clone()].into_iter().flatten() {
                    match self.send_pdu(template) {
                        Ok(()) => report.frames_sent += 1,
                        Err(e) => warn!("Failed to send PDU: {}", e),
                    }
                }
            } else {
                trace!(sequence = self.sequence, "CCM slot skipped");
            }
            self.sequence = self.sequence.wrapping_add(1);

            self.next_slot += period;
            if self.next_slot <= now {
                // fell more than one interval behind
                self.next_slot = now + period;
            }
        }

        report.newly_defective = self.shared.meps().sweep(now);
        if !report.newly_defective.is_empty() {
            match self.ring.signal_fail(self.transport.as_ref()) {
                Ok(()) => {
                    report.signal_fail_sent = true;
                    report.frames_sent += 1;
                }
                Err(e) => warn!("Failed to send Signal Fail: {}", e),
            }
        }

        report
    }

    /// Stamps the per-send fields according to the PDU kind, then sends
    fn send_pdu(&mut self, mut frame: Frame) -> Result<()> {
        match frame.kind() {
            Some(Opcode::Ccm) => {
                frame.set_transaction_id(self.sequence)?;
                trace!(sequence = self.sequence, "sending CCM");
            }
            Some(Opcode::Lbm) => {
                let id = self.next_lbm_id;
                frame.set_transaction_id(id)?;
                self.shared.set_pending_lbm(id);
                self.next_lbm_id = id.wrapping_add(1);
                debug!(transaction_id = id, "sending LBM");
            }
            _ => {}
        }
        self.transport.send_frame(frame)
    }

    /// Ticks every [`WAKEUP`] until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(WAKEUP);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }
            }
        }
        debug!(sequence = self.sequence, "scheduler stopped");
    }
}
