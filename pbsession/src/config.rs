// Session parameters.  These are fixed for the lifetime of a session.

use crate::error::{Result, SessionError};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SAMPLE_LENGTH: u64 = 20;

/// The redis server of an existing tool meister, in non-local mode.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for CoordinatorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for CoordinatorEndpoint {
    type Err = SessionError;

    // host:port
    fn from_str(s: &str) -> Result<CoordinatorEndpoint> {
        let bad = || {
            SessionError::Config(format!(
                "Invalid coordinator endpoint '{s}', expected host:port"
            ))
        };
        let (host, port) = s.rsplit_once(':').ok_or_else(bad)?;
        if host.is_empty() {
            return Err(bad());
        }
        let port = u16::from_str(port).map_err(|_| bad())?;
        Ok(CoordinatorEndpoint {
            host: host.to_string(),
            port,
        })
    }
}

/// Where sample directories go.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `iter-<i>/sample-<s>`
    Iterations,

    /// `collected-samples/sample-<s>`, for a single collector started and stopped from outside.
    Collected,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub iterations: usize,
    pub samples_per_iteration: usize,
    pub sample_length_seconds: u64,
    pub local_mode: bool,

    /// Required iff !local_mode.
    pub coordinator: Option<CoordinatorEndpoint>,

    /// Defaults to the coordinator host.
    pub tool_data_sink: Option<String>,

    /// Where `upload` sends the results.
    pub web_server: Option<String>,

    pub layout: Layout,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            iterations: 1,
            samples_per_iteration: 1,
            sample_length_seconds: DEFAULT_SAMPLE_LENGTH,
            local_mode: false,
            coordinator: None,
            tool_data_sink: None,
            web_server: None,
            layout: Layout::Iterations,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(SessionError::Config("iterations must be positive".to_string()));
        }
        if self.samples_per_iteration == 0 {
            return Err(SessionError::Config("samples must be positive".to_string()));
        }
        if !self.local_mode && self.coordinator.is_none() {
            return Err(SessionError::Config(
                "The coordinator host and port are required unless local mode is selected"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn sample_length(&self) -> Duration {
        Duration::from_secs(self.sample_length_seconds)
    }

    pub fn tool_data_sink(&self) -> Option<&str> {
        self.tool_data_sink
            .as_deref()
            .or(self.coordinator.as_ref().map(|c| c.host.as_str()))
    }
}

#[test]
fn test_validate() {
    let mut c = SessionConfig::default();
    assert!(matches!(c.validate(), Err(SessionError::Config(_))));
    c.local_mode = true;
    assert!(c.validate().is_ok());
    c.iterations = 0;
    assert!(c.validate().is_err());
    c.iterations = 2;
    c.samples_per_iteration = 0;
    assert!(c.validate().is_err());

    let c = SessionConfig {
        coordinator: Some("redis.example.com:17001".parse().unwrap()),
        ..Default::default()
    };
    assert!(c.validate().is_ok());
    assert_eq!(c.tool_data_sink(), Some("redis.example.com"));
    assert_eq!(c.sample_length(), Duration::from_secs(20));
}

#[test]
fn test_endpoint() {
    let e = CoordinatorEndpoint::from_str("ml8:17001").unwrap();
    assert_eq!(e.host, "ml8");
    assert_eq!(e.port, 17001);
    assert_eq!(e.to_string(), "ml8:17001");
    assert!(CoordinatorEndpoint::from_str("ml8").is_err());
    assert!(CoordinatorEndpoint::from_str(":17001").is_err());
    assert!(CoordinatorEndpoint::from_str("ml8:http").is_err());
}
