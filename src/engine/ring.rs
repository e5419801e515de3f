//! Ring protection trigger

use tracing::info;

use crate::core::{Config, MacAddress, Result};
use crate::network::Transport;
use crate::protocol::raps::build_signal_fail;
use crate::protocol::Frame;

/// Emits R-APS Signal-Fail when connectivity to a remote MEP is lost
#[derive(Clone)]
pub struct RingProtection {
    ring_id: u8,
    signal_fail: Frame,
}

impl RingProtection {
    pub fn new(config: &Config, local: MacAddress) -> Result<Self> {
        Ok(RingProtection {
            ring_id: config.ring_id,
            signal_fail: build_signal_fail(config, local)?,
        })
    }

    /// Sends one Signal-Fail request
    pub fn signal_fail(&self, transport: &dyn Transport) -> Result<()> {
        info!(ring_id = self.ring_id, "sending R-APS Signal Fail");
        transport.send_frame(self.signal_fail.clone())
    }
}
