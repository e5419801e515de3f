//! Receive-side frame routing

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::core::{Config, Error, MacAddress, Result};
use crate::network::Transport;
use crate::protocol::linktrace::{build_ltr, match_ltr, parse_ltm, LtrMatch, RelayAction};
use crate::protocol::loopback::{convert_lbm_to_lbr, match_lbr};
use crate::protocol::raps::match_raps;
use crate::protocol::{Frame, Opcode, RapsPdu};
use super::mep::CcmAccepted;
use super::SharedState;

/// What happened to a dispatched frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Ccm(CcmAccepted),
    /// An LBR was sent back
    LoopbackReplied { transaction_id: u32 },
    /// An LBR matched the outstanding LBM
    LoopbackMatched { transaction_id: u32 },
    /// An LTR was sent back for an LTM targeting us
    LinktraceReplied { transaction_id: u32 },
    /// An LTR matched the outstanding LTM
    LinktraceMatched { transaction_id: u32, reply: LtrMatch },
    Raps(RapsPdu),
    /// Valid but nothing to do (no outstanding request, LTM for another target)
    Ignored,
}

/// Routes received frames by opcode
pub struct Dispatcher {
    config: Arc<Config>,
    local: MacAddress,
    transport: Arc<dyn Transport>,
    shared: Arc<SharedState>,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        local: MacAddress,
        transport: Arc<dyn Transport>,
        shared: Arc<SharedState>,
    ) -> Self {
        Dispatcher {
            config,
            local,
            transport,
            shared,
        }
    }

    /// Dispatches one frame, logging instead of returning drop errors
    pub fn handle(&self, frame: Frame, now: Instant) {
        match self.dispatch(frame, now) {
            Ok(outcome) => trace!(?outcome, "frame dispatched"),
            Err(Error::FilterMismatch(reason)) => debug!("frame filtered: {}", reason),
            Err(Error::MalformedFrame(reason)) => trace!("dropping malformed frame: {}", reason),
            Err(e) => warn!("Failed to process frame: {}", e),
        }
    }

    pub fn dispatch(&self, mut frame: Frame, now: Instant) -> Result<Dispatched> {
        if !frame.is_cfm() {
            return Err(Error::mismatch("not a CFM frame"));
        }
        match frame.opcode()? {
            Opcode::Ccm => {
                let accepted = self.shared.meps().apply_ccm(&frame, &self.config, now)?;
                Ok(Dispatched::Ccm(accepted))
            }
            Opcode::Lbm => {
                let transaction_id = frame.transaction_id()?;
                convert_lbm_to_lbr(&mut frame, self.local)?;
                debug!(transaction_id, to = %frame.dst_mac()?, "answering LBM");
                self.transport.send_frame(frame)?;
                Ok(Dispatched::LoopbackReplied { transaction_id })
            }
            Opcode::Lbr => {
                let transaction_id = match self.shared.pending_lbm() {
                    Some(id) => id,
                    None => return Ok(Dispatched::Ignored),
                };
                match_lbr(&frame, transaction_id, self.local, self.config.remote_mac)?;
                self.shared.record_loopback_reply();
                info!(transaction_id, from = %frame.src_mac()?, "LBR received");
                Ok(Dispatched::LoopbackMatched { transaction_id })
            }
            Opcode::Ltm => {
                let ltm = parse_ltm(&frame)?;
                if ltm.target != self.local || ltm.ttl == 0 {
                    return Ok(Dispatched::Ignored);
                }
                let reply = build_ltr(&ltm, self.local, frame.vlan(), RelayAction::RlyHit)?;
                debug!(transaction_id = ltm.transaction_id, to = %ltm.original, "answering LTM");
                self.transport.send_frame(reply)?;
                Ok(Dispatched::LinktraceReplied {
                    transaction_id: ltm.transaction_id,
                })
            }
            Opcode::Ltr => {
                let transaction_id = match self.shared.pending_linktrace() {
                    Some(pending) => pending.transaction_id,
                    None => return Ok(Dispatched::Ignored),
                };
                let reply = match_ltr(
                    &frame,
                    self.local,
                    self.config.vlan,
                    self.config.md_level,
                    transaction_id,
                )?;
                self.shared.record_linktrace_reply(transaction_id, reply);
                info!(
                    transaction_id,
                    from = %frame.src_mac()?,
                    ttl = reply.ttl,
                    hit = reply.hit_target,
                    "LTR received"
                );
                Ok(Dispatched::LinktraceMatched { transaction_id, reply })
            }
            Opcode::Raps => {
                let pdu = match_raps(&frame)?;
                info!(
                    request = ?pdu.request(),
                    code = pdu.request_code,
                    node = %pdu.node_id,
                    "R-APS received"
                );
                Ok(Dispatched::Raps(pdu))
            }
        }
    }
}
