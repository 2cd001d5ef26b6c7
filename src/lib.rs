//! Connection lifecycle manager for Oracle databases
//!
//! A [`ConnectionManager`] owns one logical connection and moves it between
//! connected and disconnected any number of times. The native layer sits
//! behind the [`Backend`] trait: [`TnsBackend`] speaks TNS to a listener,
//! [`LoopbackBackend`] keeps everything in memory.
//!
//! [`LeakMonitor`] and [`run_reconnect_cycles`] check that repeated
//! connect/disconnect does not grow memory.
//!
//! # Example
//!
//! ```no_run
//! use oracle_session_rs::{
//!     run_reconnect_cycles, ConnectionManager, Credentials, CountingAllocator, LeakMonitor,
//!     Result, SessionConfig, StressConfig, TnsBackend,
//! };
//!
//! #[global_allocator]
//! static ALLOC: CountingAllocator = CountingAllocator::system();
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SessionConfig::from_env()?;
//!     let credentials = Credentials::from_env()?;
//!     let mut manager = ConnectionManager::new(TnsBackend::from_config(&config), credentials);
//!     let mut monitor = LeakMonitor::new(&ALLOC);
//!
//!     let stress = StressConfig::from_env()?;
//!     let report = run_reconnect_cycles(&mut manager, &mut monitor, &stress).await?;
//!     println!("{:?} bytes/cycle", report.alloc_growth_per_cycle());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod dsn;
pub mod error;
pub mod executor;
pub mod leak;
pub mod loopback;
pub mod protocol;
pub mod stress;
pub mod tns;

// Re-export main types
pub use backend::{Backend, Session};
pub use config::{FailurePolicy, SessionConfig, StressConfig};
pub use connection::{
    client_version, ClientVersion, ConnectOutcome, ConnectionManager, ConnectionState, Credentials,
};
pub use dsn::{make_dsn, split_dsn, ConnectParams, ConnectTarget, DsnParts};
pub use error::{Error, ErrorKind, Result};
pub use executor::{Executor, ExecutorStreamExt, Row, Value};
pub use leak::{
    AllocationSource, CountingAllocator, LeakMonitor, MemorySample, ProcessInspector, PsInspector,
    Untracked,
};
pub use loopback::{LoopbackBackend, LoopbackSession};
pub use stress::{run_reconnect_cycles, CycleSample, StressReport};
pub use tns::{TnsBackend, TnsSession};
