// Dispatches inbound datagrams to the right session by local channel id,
// and spawns sessions on handshake (client: the one session the caller
// asked to start; server: a fresh session per inbound INIT).

use crate::fail::Fail;
use crate::options::LedbatConfig;
use crate::session::{Outbound, Role, TestSession};
use crate::wire::Message;
use log::warn;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct SessionRegistry {
    role: Role,
    config: LedbatConfig,
    sessions: HashMap<u32, TestSession>,
    rng: SmallRng,
}

impl SessionRegistry {
    pub fn new(role: Role, config: LedbatConfig) -> Self {
        SessionRegistry {
            role,
            config,
            sessions: HashMap::new(),
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, local_channel: u32) -> Option<&TestSession> {
        self.sessions.get(&local_channel)
    }

    /// All live sessions keyed by local channel id; used by the driver for
    /// progress reporting and CSV sampling.
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &TestSession)> {
        self.sessions.iter()
    }

    /// Client only: starts a new measurement session and returns the INIT
    /// datagram to send.
    pub fn start_client_session(&mut self, now: Instant, duration: Option<Duration>) -> Outbound {
        assert_eq!(self.role, Role::Client, "start_client_session called on a server registry");
        let local_channel = self.fresh_channel();
        let mut session = TestSession::new_client(local_channel, self.config, now, duration);
        let outbound = session.start_init(now);
        self.sessions.insert(local_channel, session);
        outbound
    }

    fn fresh_channel(&mut self) -> u32 {
        loop {
            let candidate = self.rng.gen_range(1, 65535);
            if !self.sessions.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Routes one inbound datagram, returning any datagrams that must be
    /// sent in response (an INIT-ACK, a DATA ACK, or retransmissions).
    pub fn dispatch(&mut self, data: &[u8], now: Instant) -> Result<Vec<Outbound>, Fail> {
        let message = Message::decode(data)?;

        match (&self.role, &message) {
            (Role::Server, Message::Init(header)) if header.remote_channel == 0 => {
                let local_channel = self.fresh_channel();
                let mut session = TestSession::new_server(local_channel, header.local_channel, self.config, now);
                let outbound = session.start_init_ack(now);
                self.sessions.insert(local_channel, session);
                return Ok(vec![outbound]);
            }
            (Role::Client, Message::Init(_)) => {
                warn!("client received an INIT message, discarding");
                return Ok(Vec::new());
            }
            (Role::Server, Message::Ack { .. }) => {
                warn!("server received an ACK message, discarding");
                return Ok(Vec::new());
            }
            (Role::Client, Message::Data { .. }) => {
                warn!("client received a DATA message, discarding");
                return Ok(Vec::new());
            }
            _ => {}
        }

        let local_channel = message.header().remote_channel;
        let session = match self.sessions.get_mut(&local_channel) {
            Some(s) => s,
            None => {
                warn!("discarding datagram for unknown channel {}", local_channel);
                return Err(Fail::Misdelivered {});
            }
        };

        match message {
            Message::InitAck(header) => {
                session.init_ack_received(header.local_channel, now);
                Ok(Vec::new())
            }
            Message::Data {
                seq, timestamp_us, ..
            } => Ok(vec![session.data_received(seq, timestamp_us, now)]),
            Message::Ack {
                ack_from,
                ack_to,
                delays_us,
                ..
            } => Ok(session.ack_received(ack_from, ack_to, &delays_us, now)),
            Message::Init(_) => unreachable!("handled above"),
        }
    }

    /// Polls every live session's timers, collecting outbound datagrams and
    /// dropping sessions that disposed themselves this tick. Returns
    /// `stopped = true` once the client has no sessions left, signalling
    /// the caller should shut down.
    pub fn poll(&mut self, now: Instant) -> (Vec<Outbound>, bool) {
        let mut outbound = Vec::new();
        let mut disposed = Vec::new();

        for (&channel, session) in self.sessions.iter_mut() {
            match session.poll(now) {
                Ok(Some(out)) => outbound.push(out),
                Ok(None) => {}
                Err(_) => disposed.push(channel),
            }
            if session.is_disposed() {
                disposed.push(channel);
            }
        }

        for channel in disposed {
            self.sessions.remove(&channel);
        }

        let stopped = self.role == Role::Client && self.sessions.is_empty();
        (outbound, stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_registry_starts_session() {
        let now = Instant::now();
        let mut registry = SessionRegistry::new(Role::Client, LedbatConfig::default());
        let out = registry.start_client_session(now, None);
        matches!(out.message, Message::Init(_));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn server_spawns_session_on_init() {
        let now = Instant::now();
        let mut registry = SessionRegistry::new(Role::Server, LedbatConfig::default());
        let init = Message::Init(crate::wire::Header {
            remote_channel: 0,
            local_channel: 42,
        })
        .encode();
        let responses = registry.dispatch(&init, now).unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let now = Instant::now();
        let mut registry = SessionRegistry::new(Role::Client, LedbatConfig::default());
        let ack = Message::InitAck(crate::wire::Header {
            remote_channel: 999,
            local_channel: 1,
        })
        .encode();
        assert!(registry.dispatch(&ack, now).is_err());
    }

    #[test]
    fn client_shutdown_signalled_on_last_session_disposed() {
        let config = LedbatConfig::default().t_init_ack(Duration::from_millis(1)).t_idle(Duration::from_secs(300));
        let now = Instant::now();
        let mut registry = SessionRegistry::new(Role::Client, config);
        registry.start_client_session(now, None);
        let (_, stopped) = registry.poll(now);
        assert!(!stopped);
        // exhaust the 3 handshake attempts
        let mut t = now;
        for _ in 0..4 {
            t += config.t_init_ack + Duration::from_millis(1);
            registry.poll(t);
        }
        let (_, stopped) = registry.poll(t);
        assert!(stopped);
    }
}
