//! ERPS reaction engine
//!
//! Three activities share one [`SharedState`]:
//! - receive: blocking transport reads pushed onto an unbounded queue
//! - dispatch: drains the queue and routes frames by opcode
//! - scheduler: sends CCM/LBM each interval, sweeps for loss and raises
//!   R-APS Signal-Fail
//!
//! All three stop when the [`CancellationToken`] passed to [`Engine::run`]
//! is cancelled.

pub mod dispatch;
pub mod mep;
pub mod ring;
pub mod scheduler;

pub use self::dispatch::{Dispatched, Dispatcher};
pub use self::mep::{MepState, RemoteMepEntry, RemoteMepTable};
pub use self::ring::RingProtection;
pub use self::scheduler::{Scheduler, TickReport};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::core::{CcmInterval, Config, Error, MacAddress, MepId, Result};
use crate::network::{Transport, RECV_POLL_TIMEOUT};
use crate::protocol::linktrace::{build_ltm, LtrMatch, DEFAULT_LTM_TTL};
use crate::protocol::FrameCodec;
use crate::util::hex_dump;

/// An LTM this MEP originated and the replies collected for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLinktrace {
    pub transaction_id: u32,
    pub target: MacAddress,
    pub replies: Vec<LtrMatch>,
}

#[derive(Debug, Default)]
struct Outstanding {
    lbm: Option<u32>,
    loopback_replies: u64,
    linktrace: Option<PendingLinktrace>,
}

/// State shared by the receive, dispatch and scheduler activities
pub struct SharedState {
    meps: Mutex<RemoteMepTable>,
    outstanding: Mutex<Outstanding>,
    /// Source of LBM and LTM transaction ids
    rng: Mutex<StdRng>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // poisoning is ignored
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedState {
    pub fn new(interval: CcmInterval) -> Self {
        SharedState {
            meps: Mutex::new(RemoteMepTable::new(interval)),
            outstanding: Mutex::new(Outstanding::default()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Restarts the transaction id sequence from a fixed seed
    pub fn reseed(&self, seed: u64) {
        *lock(&self.rng) = StdRng::seed_from_u64(seed);
    }

    /// Draws a fresh transaction id
    pub fn random_transaction_id(&self) -> u32 {
        lock(&self.rng).gen()
    }

    /// Locks the remote MEP table
    pub fn meps(&self) -> MutexGuard<'_, RemoteMepTable> {
        lock(&self.meps)
    }

    /// Records the transaction id of the LBM just sent
    pub fn set_pending_lbm(&self, transaction_id: u32) {
        lock(&self.outstanding).lbm = Some(transaction_id);
    }

    pub fn pending_lbm(&self) -> Option<u32> {
        lock(&self.outstanding).lbm
    }

    pub fn record_loopback_reply(&self) {
        lock(&self.outstanding).loopback_replies += 1;
    }

    /// Number of LBRs matched so far
    pub fn loopback_replies(&self) -> u64 {
        lock(&self.outstanding).loopback_replies
    }

    /// Replaces any outstanding linktrace
    pub fn start_linktrace(&self, transaction_id: u32, target: MacAddress) {
        lock(&self.outstanding).linktrace = Some(PendingLinktrace {
            transaction_id,
            target,
            replies: Vec::new(),
        });
    }

    pub fn pending_linktrace(&self) -> Option<PendingLinktrace> {
        lock(&self.outstanding).linktrace.clone()
    }

    pub fn record_linktrace_reply(&self, transaction_id: u32, reply: LtrMatch) {
        if let Some(pending) = lock(&self.outstanding).linktrace.as_mut() {
            if pending.transaction_id == transaction_id {
                pending.replies.push(reply);
            }
        }
    }
}

/// Read access and operator requests against a running engine
#[derive(Clone)]
pub struct EngineHandle {
    config: Arc<Config>,
    local: MacAddress,
    transport: Arc<dyn Transport>,
    shared: Arc<SharedState>,
}

impl EngineHandle {
    pub fn local_address(&self) -> MacAddress {
        self.local
    }

    /// Copy of one remote MEP entry
    pub fn remote_mep(&self, mep_id: MepId) -> Option<RemoteMepEntry> {
        self.shared.meps().get(mep_id).cloned()
    }

    /// Copies of all active remote MEP entries, in MEP ID order
    pub fn remote_meps(&self) -> Vec<(MepId, RemoteMepEntry)> {
        self.shared
            .meps()
            .active()
            .map(|(id, entry)| (id, entry.clone()))
            .collect()
    }

    pub fn loopback_replies(&self) -> u64 {
        self.shared.loopback_replies()
    }

    /// Sends an LTM toward `target` and returns its transaction id.
    ///
    /// Replies are collected in [`EngineHandle::linktrace_result`] until
    /// the next linktrace replaces it.
    pub fn linktrace(&self, target: MacAddress, ttl: Option<u8>) -> Result<u32> {
        let transaction_id = self.shared.random_transaction_id();
        let ltm = build_ltm(
            &self.config,
            self.local,
            target,
            transaction_id,
            ttl.unwrap_or(DEFAULT_LTM_TTL),
        )?;
        self.shared.start_linktrace(transaction_id, target);
        info!(transaction_id, %target, "sending LTM");
        self.transport.send_frame(ltm)?;
        Ok(transaction_id)
    }

    pub fn linktrace_result(&self) -> Option<PendingLinktrace> {
        self.shared.pending_linktrace()
    }
}

/// The CFM/ERPS engine bound to one transport
pub struct Engine {
    config: Arc<Config>,
    local: MacAddress,
    transport: Arc<dyn Transport>,
    shared: Arc<SharedState>,
    scheduler: Scheduler,
}

impl Engine {
    /// Validates the configuration, resolves the local MAC address
    /// (configured value first, then the transport's) and builds the
    /// frame templates
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let local = config.local_mac.unwrap_or_else(|| transport.local_address());
        if local == MacAddress::ZERO || local.is_multicast() {
            return Err(Error::config(format!("{} is not a usable local MAC address", local)));
        }
        let shared = Arc::new(SharedState::new(config.ccm_interval));
        let config = Arc::new(config);
        let scheduler = Scheduler::new(
            config.clone(),
            local,
            transport.clone(),
            shared.clone(),
            Instant::now(),
        )?;

        Ok(Engine {
            config,
            local,
            transport,
            shared,
            scheduler,
        })
    }

    /// Makes LBM and LTM transaction ids reproducible
    pub fn with_seed(self, seed: u64) -> Self {
        let scheduler = self.scheduler.with_seed(seed);
        Engine { scheduler, ..self }
    }

    pub fn local_address(&self) -> MacAddress {
        self.local
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            config: self.config.clone(),
            local: self.local,
            transport: self.transport.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Runs until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let dispatcher = Dispatcher::new(
            self.config.clone(),
            self.local,
            self.transport.clone(),
            self.shared.clone(),
        );
        info!(
            mac = %self.local,
            level = self.config.md_level,
            vlan = self.config.vlan,
            mep_id = ?self.config.mep_id,
            "engine started"
        );

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let transport = self.transport.clone();
        let receive_cancel = cancel.clone();
        let receive = tokio::task::spawn_blocking(move || {
            receive_loop(transport.as_ref(), inbound_tx, receive_cancel)
        });
        let dispatch = tokio::spawn(dispatch_loop(dispatcher, inbound_rx, cancel.clone()));
        let schedule = tokio::spawn(self.scheduler.run(cancel.clone()));

        let (receive, dispatch, schedule) = tokio::join!(
            supervise("receive", receive, cancel.clone()),
            supervise("dispatch", dispatch, cancel.clone()),
            supervise("scheduler", schedule, cancel.clone()),
        );
        dispatch?;
        schedule?;
        receive?;

        info!("engine stopped");
        Ok(())
    }
}

/// Awaits one activity; if it panicked or was aborted the others are
/// cancelled too
async fn supervise(name: &'static str, task: JoinHandle<()>, cancel: CancellationToken) -> Result<()> {
    task.await.map_err(|e| {
        warn!(task = name, "task failed: {}", e);
        cancel.cancel();
        Error::task(format!("{} task failed: {}", name, e))
    })
}

/// Pulls frames off the transport until cancelled or the queue closes.
/// Receive errors are logged and retried after one poll period.
fn receive_loop(
    transport: &dyn Transport,
    inbound: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        match transport.recv() {
            Ok(Some(data)) => {
                trace!(len = data.len(), "queueing frame\n{}", hex_dump(&data));
                if inbound.send(data).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to receive frame: {}", e);
                std::thread::sleep(RECV_POLL_TIMEOUT);
            }
        }
    }
    debug!("receive loop stopped");
}

/// Waits for at least one frame, then drains everything queued
async fn dispatch_loop(
    dispatcher: Dispatcher,
    mut inbound: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
) {
    let mut codec = FrameCodec::new();
    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            next = inbound.recv() => match next {
                Some(data) => data,
                None => break,
            },
        };

        let mut batch = vec![first];
        while let Ok(data) = inbound.try_recv() {
            batch.push(data);
        }

        let now = Instant::now();
        for data in batch {
            let mut buf = BytesMut::from(&data[..]);
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => dispatcher.handle(frame, now),
                Ok(None) => {}
                Err(e) => debug!("dropping frame: {}", e),
            }
        }
    }
    debug!("dispatch loop stopped");
}
