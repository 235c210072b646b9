// NFLOG packet source — netfilter userspace logging over a raw netlink
// socket.
//
// Kernel rules log packets to a numeric group; this source binds the group
// in copy-packet mode and extracts the raw L3 payload from every logged
// packet. The wire format must stay bit-exact so existing nftables/iptables
// rules keep working; see the unit tests for the byte layout.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::shutdown_requested;
use crate::error::WgwatchError;
use crate::packet::{self, PacketSummary};

// Constants from include/uapi/linux/netfilter/nfnetlink_log.h and
// nfnetlink.h that libc does not carry.
const NFNL_SUBSYS_ULOG: u16 = 4;
const NFNETLINK_V0: u8 = 0;

// nfulnl_msg_types
const NFULNL_MSG_PACKET: u16 = 0;
const NFULNL_MSG_CONFIG: u16 = 1;

// nfulnl_msg_config_cmds
const NFULNL_CFG_CMD_BIND: u8 = 1;

// nfulnl_copy_mode
const NFULNL_COPY_PACKET: u8 = 0x02;

// nfulnl_attr_config
const NFULA_CFG_CMD: u16 = 1;
const NFULA_CFG_MODE: u16 = 2;

// nfulnl_attr_type
const NFULA_PAYLOAD: u16 = 9;

// Netlink framing
const NLMSG_HDRLEN: usize = 16;
const NLA_HDRLEN: usize = 4;
const NLA_TYPE_MASK: u16 = 0x3FFF;
const NFGENMSG_LEN: usize = 4;

const RECV_BUF_LEN: usize = 65536;
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// NFLOG consumer on a netfilter log group.
pub struct NflogSource {
    group: u16,
    netns: Option<String>,
    fd: Option<OwnedFd>,
    seq: u32,
    buf: Vec<u8>,
}

impl NflogSource {
    pub fn new(group: u16, netns: Option<String>) -> Self {
        Self {
            group,
            netns,
            fd: None,
            seq: 0,
            buf: vec![0u8; RECV_BUF_LEN],
        }
    }

    /// Bind the netlink socket and configure the log group.
    pub fn open(&mut self) -> Result<(), WgwatchError> {
        let fd = socket_in_netns(self.netns.as_deref())?;

        // group bind
        self.seq += 1;
        send_and_ack(
            &fd,
            &marshal_config_request(self.group, self.seq, NFULA_CFG_CMD, &[NFULNL_CFG_CMD_BIND]),
        )
        .map_err(|e| WgwatchError::Netlink(format!("failed to bind group {}: {e}", self.group)))?;

        // group copy packets, no range limit
        self.seq += 1;
        send_and_ack(
            &fd,
            &marshal_config_request(
                self.group,
                self.seq,
                NFULA_CFG_MODE,
                &[0x00, 0x00, 0x00, 0x00, NFULNL_COPY_PACKET, 0x00],
            ),
        )
        .map_err(|e| {
            WgwatchError::Netlink(format!(
                "failed to set copy mode on group {}: {e}",
                self.group
            ))
        })?;

        log::info!("nflog capture bound to group {}", self.group);
        self.fd = Some(fd);
        Ok(())
    }

    /// Receive loop: unmarshal logged packets and send their summaries.
    ///
    /// Transient receive or unmarshal failures are logged and skipped; the
    /// loop only exits on shutdown or when the receiver goes away.
    pub fn watch(&mut self, tx: &Sender<PacketSummary>, shutdown: &Receiver<()>) {
        loop {
            if shutdown_requested(shutdown) {
                return;
            }
            let Some(fd) = self.fd.as_ref() else {
                return;
            };

            let n = unsafe {
                libc::recv(
                    fd.as_raw_fd(),
                    self.buf.as_mut_ptr() as *mut libc::c_void,
                    self.buf.len(),
                    0,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EAGAIN) | Some(libc::EINTR) => continue,
                    _ => {
                        log::warn!("netlink receive failed: {err}");
                        thread::sleep(Duration::from_millis(100));
                        continue;
                    }
                }
            }

            for payload in packet_payloads(&self.buf[..n as usize]) {
                if let Some(summary) = packet::parse_raw_frame(payload) {
                    if tx.send(summary).is_err() {
                        return; // receiver dropped
                    }
                }
            }
        }
    }

    /// Release the netlink socket.
    pub fn close(&mut self) {
        self.fd = None;
    }
}

// ---------------------------------------------------------------------------
// Socket setup
// ---------------------------------------------------------------------------

fn socket_in_netns(netns: Option<&str>) -> Result<OwnedFd, WgwatchError> {
    let Some(name) = netns else {
        return netlink_socket();
    };

    let current = File::open("/proc/self/ns/net")
        .map_err(|e| WgwatchError::Netlink(format!("cannot read current netns: {e}")))?;
    let target = File::open(format!("/run/netns/{name}"))
        .map_err(|e| WgwatchError::Netlink(format!("cannot open netns {name:?}: {e}")))?;

    if unsafe { libc::setns(target.as_raw_fd(), libc::CLONE_NEWNET) } < 0 {
        return Err(WgwatchError::Netlink(format!(
            "setns({name:?}) failed: {}",
            io::Error::last_os_error()
        )));
    }
    let result = netlink_socket();
    if unsafe { libc::setns(current.as_raw_fd(), libc::CLONE_NEWNET) } < 0 {
        return Err(WgwatchError::Netlink(format!(
            "failed to restore netns: {}",
            io::Error::last_os_error()
        )));
    }
    result
}

fn netlink_socket() -> Result<OwnedFd, WgwatchError> {
    let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW, libc::NETLINK_NETFILTER) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        if matches!(err.raw_os_error(), Some(libc::EPERM) | Some(libc::EACCES)) {
            return Err(WgwatchError::InsufficientPermission(
                "wgwatch requires a netfilter netlink socket; \
                 run as root or grant CAP_NET_ADMIN"
                    .to_string(),
            ));
        }
        return Err(WgwatchError::Netlink(format!(
            "socket(AF_NETLINK, NETLINK_NETFILTER) failed: {err}"
        )));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(WgwatchError::Netlink(format!(
            "bind(AF_NETLINK) failed: {}",
            io::Error::last_os_error()
        )));
    }

    // Receive timeout so the watch loop can poll the shutdown channel.
    let timeout = libc::timeval {
        tv_sec: 0,
        tv_usec: RECV_TIMEOUT.subsec_micros() as libc::suseconds_t,
    };
    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &timeout as *const libc::timeval as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        log::warn!(
            "SO_RCVTIMEO on netlink socket failed: {}",
            io::Error::last_os_error()
        );
    }

    Ok(fd)
}

fn send_and_ack(fd: &OwnedFd, msg: &[u8]) -> Result<(), WgwatchError> {
    let ret = unsafe {
        libc::send(
            fd.as_raw_fd(),
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
            0,
        )
    };
    if ret < 0 {
        return Err(WgwatchError::Netlink(format!(
            "netlink send failed: {}",
            io::Error::last_os_error()
        )));
    }

    let mut buf = [0u8; 4096];
    loop {
        let n = unsafe {
            libc::recv(
                fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(WgwatchError::Netlink(format!(
                "netlink ack receive failed: {err}"
            )));
        }
        return parse_ack(&buf[..n as usize]);
    }
}

// ---------------------------------------------------------------------------
// Message (un)marshalling
// ---------------------------------------------------------------------------

fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Marshal one netlink attribute: native-endian length and type, payload,
/// zero padding to a 4-byte boundary.
fn marshal_attr(attr_type: u16, data: &[u8]) -> Vec<u8> {
    let len = NLA_HDRLEN + data.len();
    let mut out = Vec::with_capacity(align4(len));
    out.extend_from_slice(&(len as u16).to_ne_bytes());
    out.extend_from_slice(&attr_type.to_ne_bytes());
    out.extend_from_slice(data);
    out.resize(align4(len), 0);
    out
}

/// Marshal a complete `NFULNL_MSG_CONFIG` request carrying one attribute.
///
/// Body layout after the 16-byte netlink header is the nfgenmsg
/// (`AF_UNSPEC, NFNETLINK_V0, group_hi, group_lo`) followed by the
/// marshalled attribute.
fn marshal_config_request(group: u16, seq: u32, attr_type: u16, attr_data: &[u8]) -> Vec<u8> {
    let attr = marshal_attr(attr_type, attr_data);
    let len = NLMSG_HDRLEN + NFGENMSG_LEN + attr.len();

    let group_be = group.to_be_bytes();
    let mut msg = Vec::with_capacity(len);
    msg.extend_from_slice(&(len as u32).to_ne_bytes());
    msg.extend_from_slice(&((NFNL_SUBSYS_ULOG << 8) | NFULNL_MSG_CONFIG).to_ne_bytes());
    msg.extend_from_slice(&((libc::NLM_F_REQUEST | libc::NLM_F_ACK) as u16).to_ne_bytes());
    msg.extend_from_slice(&seq.to_ne_bytes());
    msg.extend_from_slice(&0u32.to_ne_bytes()); // pid: kernel assigns
    msg.extend_from_slice(&[libc::AF_UNSPEC as u8, NFNETLINK_V0, group_be[0], group_be[1]]);
    msg.extend_from_slice(&attr);
    msg
}

/// Parse a netlink reply expected to be a single ACK.
fn parse_ack(buf: &[u8]) -> Result<(), WgwatchError> {
    if buf.len() < NLMSG_HDRLEN {
        return Err(WgwatchError::Netlink("short netlink reply".to_string()));
    }
    let msg_type = u16::from_ne_bytes([buf[4], buf[5]]);
    if msg_type != libc::NLMSG_ERROR as u16 {
        return Err(WgwatchError::Netlink(format!(
            "unexpected netlink reply type {msg_type}"
        )));
    }
    if buf.len() < NLMSG_HDRLEN + 4 {
        return Err(WgwatchError::Netlink("truncated netlink error".to_string()));
    }
    let code = i32::from_ne_bytes([
        buf[NLMSG_HDRLEN],
        buf[NLMSG_HDRLEN + 1],
        buf[NLMSG_HDRLEN + 2],
        buf[NLMSG_HDRLEN + 3],
    ]);
    if code != 0 {
        let err = io::Error::from_raw_os_error(-code);
        return Err(WgwatchError::Netlink(format!("kernel refused request: {err}")));
    }
    Ok(())
}

/// Extract the raw L3 payloads of every `NFULNL_MSG_PACKET` in a receive
/// buffer. The 4-byte nfgenmsg after each header is skipped before the
/// attributes are walked.
fn packet_payloads(buf: &[u8]) -> Vec<&[u8]> {
    let mut payloads = Vec::new();
    let mut offset = 0;

    while offset + NLMSG_HDRLEN <= buf.len() {
        let msg_len = u32::from_ne_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]) as usize;
        if msg_len < NLMSG_HDRLEN || offset + msg_len > buf.len() {
            log::warn!("unmarshal failed: bad netlink message length {msg_len}");
            break;
        }
        let msg_type = u16::from_ne_bytes([buf[offset + 4], buf[offset + 5]]);

        if msg_type == (NFNL_SUBSYS_ULOG << 8) | NFULNL_MSG_PACKET {
            let body = &buf[offset + NLMSG_HDRLEN..offset + msg_len];
            if body.len() >= NFGENMSG_LEN {
                if let Some(payload) = find_attr(&body[NFGENMSG_LEN..], NFULA_PAYLOAD) {
                    payloads.push(payload);
                }
            }
        }

        offset += align4(msg_len);
    }

    payloads
}

/// Walk a marshalled attribute list looking for `want`.
fn find_attr(data: &[u8], want: u16) -> Option<&[u8]> {
    let mut offset = 0;
    while offset + NLA_HDRLEN <= data.len() {
        let len = u16::from_ne_bytes([data[offset], data[offset + 1]]) as usize;
        let attr_type = u16::from_ne_bytes([data[offset + 2], data[offset + 3]]) & NLA_TYPE_MASK;
        if len < NLA_HDRLEN || offset + len > data.len() {
            return None;
        }
        if attr_type == want {
            return Some(&data[offset + NLA_HDRLEN..offset + len]);
        }
        offset += align4(len);
    }
    None
}
