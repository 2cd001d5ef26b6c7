//! Session and stress-loop configuration.
//!
//! Both structs follow the builder style: construct with `new()` (or
//! `Default`), then adjust with `with_*` methods. `from_env()` reads the
//! `ORACLE_*` variables, honouring a `.env` file in the working directory.

use crate::error::{Error, Result};
use crate::protocol::constants::TNS_SDU_DEFAULT;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What a caller does when a connect attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and terminate by panicking.
    Fatal,
    /// Hand the error back to the caller.
    #[default]
    Report,
}

impl FailurePolicy {
    /// Apply the policy to `err`. Returns the error when it should be reported.
    pub fn escalate(self, err: Error) -> Error {
        match self {
            FailurePolicy::Report => err,
            FailurePolicy::Fatal => {
                tracing::error!(error = %err, "unrecoverable connection failure");
                panic!("unrecoverable connection failure: {err}");
            }
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" | "panic" => Ok(FailurePolicy::Fatal),
            "report" | "error" => Ok(FailurePolicy::Report),
            other => Err(Error::config(
                "failure policy",
                format!("expected 'fatal' or 'report', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Fatal => write!(f, "fatal"),
            FailurePolicy::Report => write!(f, "report"),
        }
    }
}

/// Settings for establishing a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on DNS resolution and TCP connect (default: 20 seconds).
    pub connect_timeout: Duration,
    /// SDU requested in the CONNECT packet.
    pub sdu: u32,
    /// Policy applied when the initial connect fails.
    pub setup_failure: FailurePolicy,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            sdu: TNS_SDU_DEFAULT,
            setup_failure: FailurePolicy::Report,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_sdu(mut self, sdu: u32) -> Self {
        self.sdu = sdu;
        self
    }

    pub fn with_setup_failure(mut self, policy: FailurePolicy) -> Self {
        self.setup_failure = policy;
        self
    }

    /// Load overrides from `ORACLE_CONNECT_TIMEOUT_MS`, `ORACLE_SDU` and
    /// `ORACLE_SETUP_FAILURE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();
        if let Some(ms) = env_parse::<u64>("ORACLE_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(sdu) = env_parse::<u32>("ORACLE_SDU")? {
            config.sdu = sdu;
        }
        if let Some(policy) = env_parse::<FailurePolicy>("ORACLE_SETUP_FAILURE")? {
            config.setup_failure = policy;
        }
        Ok(config)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for a repeated connect/disconnect run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of connect/disconnect cycles.
    pub cycles: usize,
    /// Tick between cycles.
    pub cycle_interval: Duration,
    /// Take a memory sample every this many cycles (0 disables periodic sampling).
    pub sample_every: usize,
    /// Check `is_connected` and `ping` after every connect.
    pub verify_each_cycle: bool,
    /// Policy applied when a cycle fails.
    pub cycle_failure: FailurePolicy,
}

impl StressConfig {
    pub fn new() -> Self {
        Self {
            cycles: 300,
            cycle_interval: Duration::from_millis(100),
            sample_every: 10,
            verify_each_cycle: true,
            cycle_failure: FailurePolicy::Report,
        }
    }

    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.cycles = cycles;
        self
    }

    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    pub fn with_sample_every(mut self, every: usize) -> Self {
        self.sample_every = every;
        self
    }

    pub fn with_verify_each_cycle(mut self, verify: bool) -> Self {
        self.verify_each_cycle = verify;
        self
    }

    pub fn with_cycle_failure(mut self, policy: FailurePolicy) -> Self {
        self.cycle_failure = policy;
        self
    }

    /// Load overrides from `ORACLE_STRESS_CYCLES`, `ORACLE_STRESS_INTERVAL_MS`,
    /// `ORACLE_STRESS_SAMPLE_EVERY` and `ORACLE_CYCLE_FAILURE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();
        if let Some(cycles) = env_parse::<usize>("ORACLE_STRESS_CYCLES")? {
            config.cycles = cycles;
        }
        if let Some(ms) = env_parse::<u64>("ORACLE_STRESS_INTERVAL_MS")? {
            config.cycle_interval = Duration::from_millis(ms);
        }
        if let Some(every) = env_parse::<usize>("ORACLE_STRESS_SAMPLE_EVERY")? {
            config.sample_every = every;
        }
        if let Some(policy) = env_parse::<FailurePolicy>("ORACLE_CYCLE_FAILURE")? {
            config.cycle_failure = policy;
        }
        Ok(config)
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a variable through dotenvy. Unset or empty means `None`.
pub(crate) fn env_var(key: &str) -> Option<String> {
    dotenvy::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::config(key, e.to_string()))
        })
        .transpose()
}
