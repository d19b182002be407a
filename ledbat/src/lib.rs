// LEDBAT (RFC 6817) congestion controller and measurement-session state
// machine. See SPEC_FULL.md / DESIGN.md at the workspace root for the
// module-by-module rationale; this crate implements C1-C7 only. The
// datagram transport, CLI, CSV log, and top-level event loop live in the
// `ledbat-driver` binary crate alongside this one.

pub mod controller;
pub mod delay;
pub mod fail;
pub mod inflight;
pub mod options;
pub mod registry;
pub mod rto;
pub mod sendgate;
pub mod session;
pub mod wire;

pub use controller::Controller;
pub use fail::Fail;
pub use options::LedbatConfig;
pub use registry::SessionRegistry;
pub use session::{Role, SessionSnapshot, SessionState, TestSession};
