//! Link-layer transport
//!
//! The engine only needs to send and receive opaque frames and to know its
//! own MAC address. [`RawSocketTransport`] does this on a Linux interface;
//! [`MemoryTransport`] connects endpoints inside one process.

mod memory;
#[cfg(target_os = "linux")]
mod raw;

pub use self::memory::MemoryTransport;
#[cfg(target_os = "linux")]
pub use self::raw::RawSocketTransport;

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::core::{MacAddress, Result};
use crate::protocol::{Frame, FrameCodec};

/// How long a `recv` call may block before reporting "nothing yet"
pub const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Sends and receives raw Ethernet frames
pub trait Transport: Send + Sync {
    /// Sends one frame
    fn send(&self, frame: &[u8]) -> Result<()>;

    /// Blocks for at most [`RECV_POLL_TIMEOUT`]; `None` means no frame arrived
    fn recv(&self) -> Result<Option<Bytes>>;

    /// MAC address of the local interface
    fn local_address(&self) -> MacAddress;

    /// Encodes (padding to the Ethernet minimum) and sends a frame
    fn send_frame(&self, frame: Frame) -> Result<()> {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(frame, &mut buf)?;
        self.send(&buf)
    }
}
