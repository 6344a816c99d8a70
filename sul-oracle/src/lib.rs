//! A membership oracle for active automata learning that answers queries by talking to a
//! black-box, possibly noisy system under learning (SUL) through a line based protocol.
//!
//! The pieces, from the bottom up:
//! - [`session`] holds the [`Session`] abstraction and the [`ProcessSession`] that drives an
//!   external process, using the line format from [`protocol`].
//! - [`engine`] runs queries repeatedly and takes a majority vote to cope with noise.
//! - [`oracle`] decides between combined and stepwise execution and caches answers.
//! - [`service`] puts an oracle on its own worker thread so it can be shared.
//! - [`config`] builds all of the above from a TOML file.

pub mod config;
pub mod engine;
pub mod log;
pub mod oracle;
pub mod protocol;
pub mod service;
pub mod session;

pub use config::{Config, ConfigError};
pub use engine::{NoiseTolerantEngine, Tally, TiePolicy, Verdict};
pub use log::{FileLog, MemoryLog, QueryLog, QueryTrace, TracingLog};
pub use oracle::{MembershipOracle, OracleError, Query, SulOracle};
pub use protocol::{LineCodec, ProtocolError};
pub use service::{OracleHandle, OracleService};
pub use session::{
    CancelToken, FnSession, ProcessConfig, ProcessSession, Session, SessionError, SessionStats,
};

pub mod prelude {
    pub use super::{MembershipOracle, Query, Session};
    pub use sul_core::prelude::*;
}
