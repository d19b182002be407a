// CLI driver binary: owns the UDP socket, the session registry, the CSV
// log, and the top-level event loop. Everything the `ledbat` crate needs
// from "the transport" and "the driver" (spec.md section 6) is supplied
// here; the loop itself follows the same "construct, then loop { recv,
// dispatch, poll, check deadline }" shape as the reference drivers in
// catnip_mininet/alice and catnip_mininet/bob, minus their async-future
// polling (this crate has no futures to drive, just timers).

mod cli;
mod csv_log;

use cli::Args;
use csv_log::CsvLog;
use ledbat::options::LedbatConfig;
use ledbat::registry::SessionRegistry;
use ledbat::session::Role;
use log::{debug, info, warn};
use std::net::{SocketAddr, UdpSocket};
use std::process;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const UDP_PORT: u16 = 6888;
const RECV_BUF_LEN: usize = 64 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    let args = Args::parse(std::env::args().skip(1));

    let level = if args.debug { "debug" } else { "info" };
    flexi_logger::Logger::with_str(level)
        .start()
        .expect("failed to start logger");

    if let Err(fail) = run(args) {
        warn!("ledbat-driver exiting on error: {}", fail);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    let role = match args.role.as_str() {
        "client" => Role::Client,
        "server" => Role::Server,
        other => return Err(format!("unknown --role '{}', expected client or server", other)),
    };

    if role == Role::Client && args.remote.is_none() {
        return Err("--role client requires --remote <ip>".to_string());
    }

    let mut config = LedbatConfig::default();
    for (name, value) in &args.ledbat_overrides {
        config
            .set_named(name, *value)
            .map_err(|e| format!("--ledbat-{}: {}", name, e))?;
    }

    let socket = UdpSocket::bind(("0.0.0.0", UDP_PORT)).map_err(|e| format!("bind 0.0.0.0:{}: {}", UDP_PORT, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| format!("set_nonblocking: {}", e))?;

    let remote_addr: Option<SocketAddr> = match &args.remote {
        Some(ip) => Some(
            format!("{}:{}", ip, UDP_PORT)
                .parse()
                .map_err(|e| format!("invalid --remote address: {}", e))?,
        ),
        None => None,
    };

    info!("ledbat-driver starting as {:?} on UDP port {}", role, UDP_PORT);

    let now = Instant::now();
    let mut registry = SessionRegistry::new(role, config);
    let duration = args.time.map(Duration::from_secs);

    let mut csv_log = if args.makelog {
        Some(CsvLog::create(args.remote.as_deref().unwrap_or("unknown"), UDP_PORT, start_unixtime())?)
    } else {
        None
    };

    let mut buf = vec![0u8; RECV_BUF_LEN];
    let mut last_sample = now;

    if role == Role::Client {
        let remote = remote_addr.expect("checked above");
        let outbound = registry.start_client_session(now, duration);
        send_to(&socket, remote, &outbound.message)?;
    }

    loop {
        let now = Instant::now();

        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                let remote = remote_addr.unwrap_or(peer);
                match registry.dispatch(&buf[..len], now) {
                    Ok(responses) => {
                        for out in responses {
                            send_to(&socket, remote, &out.message)?;
                        }
                    }
                    Err(fail) => debug!("dropped datagram from {}: {}", peer, fail),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(format!("recv_from: {}", e)),
        }

        let (outbound, stopped) = registry.poll(now);
        if let Some(remote) = remote_addr {
            for out in outbound {
                send_to(&socket, remote, &out.message)?;
            }
        }

        if let Some(log) = csv_log.as_mut() {
            if now.saturating_duration_since(last_sample) >= SAMPLE_INTERVAL {
                last_sample = now;
                if role == Role::Client {
                    if let Some((_, session)) = registry_first_session(&registry) {
                        log.record(session.snapshot(now))?;
                    }
                }
            }
        }

        if stopped {
            info!("all sessions disposed, shutting down");
            break;
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    Ok(())
}

fn registry_first_session(registry: &SessionRegistry) -> Option<(&u32, &ledbat::session::TestSession)> {
    // The registry owns an unordered map; the driver only ever starts one
    // client session per process, so "the session that exists" is enough.
    registry.iter().next()
}

fn send_to(socket: &UdpSocket, addr: SocketAddr, message: &ledbat::wire::Message) -> Result<(), String> {
    let bytes = message.encode();
    socket
        .send_to(&bytes, addr)
        .map(|_| ())
        .map_err(|e| format!("send_to {}: {}", addr, e))
}

fn start_unixtime() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
