//! Virtual network
//!
//! Simulated TCP/UDP sockets with scripted responders keyed by exact
//! address and port. This module is time-free: the interpreter schedules
//! the connect completion and reply delivery on its own timer queue.

use crate::devices::{Responder, reference_responders};
use std::collections::HashMap;

/// Upper bound on live sockets
const MAX_SOCKETS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Closed,
    Connecting,
    Connected,
    Error,
}

impl SocketStatus {
    /// Numeric form read by `SocketGetStatus` and `sock.SocketStatus`
    pub fn code(self) -> i64 {
        match self {
            SocketStatus::Closed => 0,
            SocketStatus::Connecting => 1,
            SocketStatus::Connected => 2,
            SocketStatus::Error => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    pub id: i64,
    pub protocol: Protocol,
    pub role: SocketRole,
    pub remote_address: String,
    pub remote_port: u16,
    pub local_port: u16,
    pub status: SocketStatus,
    pub tx_log: Vec<String>,
    pub rx_log: Vec<String>,
}

// Socket registry with ID reuse via free list
#[derive(Debug, Default)]
struct SocketRegistry {
    sockets: Vec<Option<Socket>>,
    free_ids: Vec<usize>,
}

impl SocketRegistry {
    fn allocate(&mut self, protocol: Protocol, role: SocketRole) -> Option<i64> {
        let id = match self.free_ids.pop() {
            Some(id) => id,
            None => {
                if self.sockets.len() >= MAX_SOCKETS {
                    return None;
                }
                self.sockets.push(None);
                self.sockets.len() - 1
            }
        };
        self.sockets[id] = Some(Socket {
            id: id as i64,
            protocol,
            role,
            remote_address: String::new(),
            remote_port: 0,
            local_port: 0,
            status: SocketStatus::Closed,
            tx_log: Vec::new(),
            rx_log: Vec::new(),
        });
        Some(id as i64)
    }

    fn get(&self, id: i64) -> Option<&Socket> {
        self.sockets.get(usize::try_from(id).ok()?)?.as_ref()
    }

    fn get_mut(&mut self, id: i64) -> Option<&mut Socket> {
        self.sockets.get_mut(usize::try_from(id).ok()?)?.as_mut()
    }

    fn free(&mut self, id: i64) {
        if let Ok(idx) = usize::try_from(id)
            && let Some(slot) = self.sockets.get_mut(idx)
            && slot.is_some()
        {
            *slot = None;
            self.free_ids.push(idx);
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Socket> {
        self.sockets.iter().flatten()
    }
}

type ChangeListener = Box<dyn FnMut()>;

pub struct VirtualNetwork {
    sockets: SocketRegistry,
    responders: HashMap<(String, u16), Responder>,
    listener: Option<ChangeListener>,
}

impl Default for VirtualNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VirtualNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualNetwork")
            .field("sockets", &self.sockets)
            .field("responders", &self.responders.len())
            .finish()
    }
}

fn port_of(port: i64) -> Option<u16> {
    u16::try_from(port).ok()
}

impl VirtualNetwork {
    pub fn new() -> Self {
        let mut net = VirtualNetwork {
            sockets: SocketRegistry::default(),
            responders: HashMap::new(),
            listener: None,
        };
        for (address, port, responder) in reference_responders() {
            net.register_responder(address, port, responder);
        }
        net
    }

    pub fn register_responder(&mut self, address: &str, port: u16, responder: Responder) {
        self.responders.insert((address.to_string(), port), responder);
    }

    pub fn set_change_listener(&mut self, listener: impl FnMut() + 'static) {
        self.listener = Some(Box::new(listener));
    }

    fn changed(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener();
        }
    }

    /// New closed socket, -1 when the table is full
    pub fn create(&mut self, protocol: Protocol, role: SocketRole) -> i64 {
        let id = self.sockets.allocate(protocol, role).unwrap_or(-1);
        if id >= 0 {
            self.changed();
        }
        id
    }

    pub fn release(&mut self, id: i64) {
        self.sockets.free(id);
        self.changed();
    }

    /// Start a client connection: 0 ok, -1 bad socket or port,
    /// -2 already connecting or connected
    pub fn connect(&mut self, id: i64, address: &str, port: i64) -> i64 {
        let Some(port) = port_of(port) else {
            return -1;
        };
        let Some(socket) = self.sockets.get_mut(id) else {
            return -1;
        };
        if matches!(
            socket.status,
            SocketStatus::Connecting | SocketStatus::Connected
        ) {
            return -2;
        }
        socket.remote_address = address.to_string();
        socket.remote_port = port;
        socket.status = SocketStatus::Connecting;
        self.changed();
        0
    }

    /// Finish a pending connect; false if it was cancelled meanwhile
    pub fn complete_connect(&mut self, id: i64) -> bool {
        let Some(socket) = self.sockets.get_mut(id) else {
            return false;
        };
        if socket.status != SocketStatus::Connecting {
            return false;
        }
        socket.status = SocketStatus::Connected;
        self.changed();
        true
    }

    /// 0 if the socket was open, -1 otherwise
    pub fn disconnect(&mut self, id: i64) -> i64 {
        let Some(socket) = self.sockets.get_mut(id) else {
            return -1;
        };
        if socket.status == SocketStatus::Closed {
            return -1;
        }
        socket.status = SocketStatus::Closed;
        self.changed();
        0
    }

    /// Fabricate a connected server-role socket on `port`
    pub fn listen(&mut self, id: i64, port: i64) -> i64 {
        let Some(port) = port_of(port) else {
            return -1;
        };
        let Some(socket) = self.sockets.get_mut(id) else {
            return -1;
        };
        socket.role = SocketRole::Server;
        socket.local_port = port;
        socket.remote_address = "0.0.0.0".to_string();
        socket.status = SocketStatus::Connected;
        self.changed();
        0
    }

    /// UDP sockets are usable immediately
    pub fn enable_udp(&mut self, id: i64, address: &str, port: i64) -> i64 {
        let Some(port) = port_of(port) else {
            return -1;
        };
        let Some(socket) = self.sockets.get_mut(id) else {
            return -1;
        };
        socket.protocol = Protocol::Udp;
        socket.remote_address = address.to_string();
        socket.remote_port = port;
        socket.local_port = port;
        socket.status = SocketStatus::Connected;
        self.changed();
        0
    }

    /// Bytes accepted (or -1) and the responder's reply, if any
    pub fn send(&mut self, id: i64, data: &str) -> (i64, Option<String>) {
        let Some(socket) = self.sockets.get_mut(id) else {
            return (-1, None);
        };
        if socket.status != SocketStatus::Connected {
            return (-1, None);
        }
        socket.tx_log.push(data.to_string());
        let key = (socket.remote_address.clone(), socket.remote_port);
        let reply = self
            .responders
            .get(&key)
            .map(|respond| respond(data))
            .filter(|r| !r.is_empty());
        let sent = data.chars().count() as i64;
        self.changed();
        (sent, reply)
    }

    /// Record an inbound message; false if the socket closed meanwhile
    pub fn deliver(&mut self, id: i64, data: &str) -> bool {
        let Some(socket) = self.sockets.get_mut(id) else {
            return false;
        };
        if socket.status != SocketStatus::Connected {
            return false;
        }
        socket.rx_log.push(data.to_string());
        self.changed();
        true
    }

    pub fn status(&self, id: i64) -> SocketStatus {
        self.sockets
            .get(id)
            .map_or(SocketStatus::Error, |s| s.status)
    }

    pub fn socket(&self, id: i64) -> Option<&Socket> {
        self.sockets.get(id)
    }

    pub fn sockets(&self) -> impl Iterator<Item = &Socket> {
        self.sockets.iter()
    }

    /// Drop every socket; responders and the listener are kept
    pub fn clear(&mut self) {
        self.sockets = SocketRegistry::default();
        self.changed();
    }
}
