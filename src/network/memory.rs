use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

use crate::core::{Error, MacAddress, Result};
use super::{Transport, RECV_POLL_TIMEOUT};

/// In-process transport.
///
/// Every frame sent is recorded; when the transport is one half of a
/// [`MemoryTransport::pair`] it is also delivered to the other half.
pub struct MemoryTransport {
    /// Local MAC address
    local: MacAddress,
    /// Inbox of the connected endpoint
    peer: Mutex<Option<Sender<Bytes>>>,
    /// Sender side of our own inbox, used by `inject`
    inbox_tx: Mutex<Sender<Bytes>>,
    /// Our inbox
    inbox_rx: Mutex<Receiver<Bytes>>,
    /// Everything sent through this endpoint
    sent: Mutex<Vec<Bytes>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::transport("memory transport lock poisoned"))
}

impl MemoryTransport {
    /// Creates an unconnected endpoint
    pub fn new(local: MacAddress) -> Self {
        let (tx, rx) = mpsc::channel();
        MemoryTransport {
            local,
            peer: Mutex::new(None),
            inbox_tx: Mutex::new(tx),
            inbox_rx: Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Creates two endpoints wired to each other
    pub fn pair(a: MacAddress, b: MacAddress) -> (Self, Self) {
        let first = MemoryTransport::new(a);
        let second = MemoryTransport::new(b);
        first.connect(&second);
        second.connect(&first);
        (first, second)
    }

    fn connect(&self, other: &MemoryTransport) {
        if let (Ok(mut peer), Ok(tx)) = (lock(&self.peer), lock(&other.inbox_tx)) {
            *peer = Some(tx.clone());
        }
    }

    /// Queues a frame as if it had been received
    pub fn inject(&self, frame: impl Into<Bytes>) -> Result<()> {
        lock(&self.inbox_tx)?
            .send(frame.into())
            .map_err(|_| Error::transport("memory transport inbox closed"))
    }

    /// Frames sent so far
    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.sent).map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Drains the record of sent frames
    pub fn take_sent(&self) -> Vec<Bytes> {
        lock(&self.sent)
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        let frame = Bytes::copy_from_slice(frame);
        lock(&self.sent)?.push(frame.clone());
        if let Some(peer) = lock(&self.peer)?.as_ref() {
            peer.send(frame)
                .map_err(|_| Error::transport("peer endpoint dropped"))?;
        }
        Ok(())
    }

    fn recv(&self) -> Result<Option<Bytes>> {
        match lock(&self.inbox_rx)?.recv_timeout(RECV_POLL_TIMEOUT) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::transport("memory transport inbox closed")),
        }
    }

    fn local_address(&self) -> MacAddress {
        self.local
    }
}
