// Every failure in a session is fatal.  The only recovery is the tool deregistration performed by
// `Session::cleanup`, which the session driver runs once before the error reaches the caller.

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Missing or invalid option or input file.  Raised before any tool is registered.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registration failed: {reason}")]
    Registration { reason: RegistrationReason },

    /// The target directory already exists.  Never overwritten, never merged.
    #[error("{purpose} '{}' already exists", .path.display())]
    DirectoryConflict { path: PathBuf, purpose: String },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// An external program could not be run or returned non-success.
    #[error("Failure to run process: {program} ({status}){}", stderr_suffix(.stderr))]
    ExternalInvocation {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Could not create {purpose} '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        purpose: String,
        source: io::Error,
    },
}

#[derive(Debug)]
pub enum RegistrationReason {
    /// Local mode was requested but the map names a host that is neither the local host nor
    /// `localhost`.
    RemoteHostInLocalMode { host: String, local: String },

    /// `pbench-register-tool` failed for this host and tool.
    InvocationFailed {
        host: String,
        tool: String,
        source: Box<SessionError>,
    },
}

impl fmt::Display for RegistrationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationReason::RemoteHostInLocalMode { host, local } => write!(
                f,
                "'Create local' mode selected, but remote host '{host}' specified \
                 (only '{local}' or 'localhost' allowed)"
            ),
            RegistrationReason::InvocationFailed { host, tool, source } => {
                write!(f, "tool '{tool}' on host '{host}': {source}")
            }
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let s = stderr.trim();
    if s.is_empty() {
        "".to_string()
    } else {
        format!(": {s}")
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[test]
fn test_error_messages() {
    let e = SessionError::DirectoryConflict {
        path: PathBuf::from("/tmp/x/iter-1"),
        purpose: "iteration dir".to_string(),
    };
    assert_eq!(e.to_string(), "iteration dir '/tmp/x/iter-1' already exists");

    let e = SessionError::ExternalInvocation {
        program: "pbench-start-tools".to_string(),
        status: "exit status: 2".to_string(),
        stderr: "no such group\n".to_string(),
    };
    assert_eq!(
        e.to_string(),
        "Failure to run process: pbench-start-tools (exit status: 2): no such group"
    );

    let e = SessionError::Registration {
        reason: RegistrationReason::RemoteHostInLocalMode {
            host: "remote1".to_string(),
            local: "ml8".to_string(),
        },
    };
    assert!(e.to_string().contains("remote host 'remote1'"));
}
