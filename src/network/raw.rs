use std::io::{self, Read};
use std::mem;
use std::os::unix::io::AsRawFd;

use bytes::Bytes;
use nix::net::if_::if_nametoindex;
use nix::unistd::geteuid;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace};

use crate::core::{Error, MacAddress, Result, MAX_FRAME_SIZE};
use crate::protocol::Frame;
use super::{Transport, RECV_POLL_TIMEOUT};

/// Receive buffer; anything larger than a CFM frame is dropped
const RECV_BUFFER_SIZE: usize = 2048;

/// AF_PACKET transport bound to one Linux interface.
///
/// The socket joins all-multicast on the interface so CFM and R-APS group
/// addresses are delivered. Frames sourced from the local MAC and frames
/// that are not CFM (after an optional 802.1Q tag) are dropped in `recv`.
pub struct RawSocketTransport {
    socket: Socket,
    ifname: String,
    local: MacAddress,
}

fn eth_p_all() -> u16 {
    (libc::ETH_P_ALL as u16).to_be()
}

impl RawSocketTransport {
    /// Opens a raw socket on `ifname`.
    ///
    /// `local` overrides the interface MAC address read from sysfs.
    pub fn open(ifname: &str, local: Option<MacAddress>) -> Result<Self> {
        if !geteuid().is_root() {
            return Err(Error::transport("Execution requires superuser privilege"));
        }

        let ifindex = if_nametoindex(ifname)
            .map_err(|e| Error::transport(format!("Unknown interface {}: {}", ifname, e)))?;

        let socket = Socket::new(
            Domain::PACKET,
            Type::RAW,
            Some(Protocol::from(i32::from(eth_p_all()))),
        )
        .map_err(|e| Error::transport(format!("Failed to open raw socket: {}", e)))?;

        bind_to_interface(&socket, ifindex)?;
        join_all_multicast(&socket, ifindex)?;
        socket.set_read_timeout(Some(RECV_POLL_TIMEOUT))?;

        let local = match local {
            Some(mac) => mac,
            None => read_hw_address(ifname)?,
        };
        info!(interface = ifname, ifindex, mac = %local, "raw socket open");

        Ok(RawSocketTransport {
            socket,
            ifname: ifname.to_string(),
            local,
        })
    }

    /// Name of the bound interface
    pub fn interface(&self) -> &str {
        &self.ifname
    }
}

fn bind_to_interface(socket: &Socket, ifindex: u32) -> Result<()> {
    // SAFETY: sockaddr_ll is plain old data; all-zero is a valid value
    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as u16;
    addr.sll_protocol = eth_p_all();
    addr.sll_ifindex = ifindex as i32;

    // SAFETY: addr outlives the call and the length matches its type
    let rc = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(Error::transport(format!(
            "Failed to bind to ifindex {}: {}",
            ifindex,
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn join_all_multicast(socket: &Socket, ifindex: u32) -> Result<()> {
    let mreq = libc::packet_mreq {
        mr_ifindex: ifindex as i32,
        mr_type: libc::PACKET_MR_ALLMULTI as u16,
        mr_alen: 0,
        mr_address: [0; 8],
    };

    // SAFETY: mreq outlives the call and the length matches its type
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_PACKET,
            libc::PACKET_ADD_MEMBERSHIP,
            &mreq as *const libc::packet_mreq as *const libc::c_void,
            mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(Error::transport(format!(
            "Failed to enable all-multicast: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn read_hw_address(ifname: &str) -> Result<MacAddress> {
    let path = format!("/sys/class/net/{}/address", ifname);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| Error::transport(format!("Failed to read {}: {}", path, e)))?;
    text.trim().parse()
}

impl Transport for RawSocketTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        let sent = self.socket.send(frame)?;
        if sent != frame.len() {
            return Err(Error::transport(format!(
                "short write on {}: {} of {} octets",
                self.ifname,
                sent,
                frame.len()
            )));
        }
        Ok(())
    }

    fn recv(&self) -> Result<Option<Bytes>> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let len = match (&self.socket).read(&mut buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len > MAX_FRAME_SIZE {
            debug!(len, "dropping oversized frame");
            return Ok(None);
        }

        let data = &buf[..len];
        let frame = match Frame::from_bytes(data) {
            Ok(frame) => frame,
            Err(_) => return Ok(None),
        };
        if frame.src_mac().map_or(true, |src| src == self.local) || !frame.is_cfm() {
            return Ok(None);
        }

        trace!(len, interface = %self.ifname, "frame received");
        Ok(Some(Bytes::copy_from_slice(data)))
    }

    fn local_address(&self) -> MacAddress {
        self.local
    }
}
