// This library drives a pbench data collection session: it registers the collection tools on the
// hosts that run them, lays out the session's directory tree, starts and stops the tools around
// each sample, and clears the tools again when the session ends or fails.
//
// The collection itself is done by the external pbench agent programs (pbench-register-tool,
// pbench-start-tools, and so on).  All of those are run through a `ToolRunner`, so that the
// session logic can be exercised without pbench installed.

mod config;
mod context;
mod cycle;
mod dirs;
mod error;
mod hosts;
mod runner;
mod session;
mod tooldict;

// Session parameters, and the per-session values handed to the tool meister in its environment.

pub use config::{CoordinatorEndpoint, Layout, SessionConfig, DEFAULT_SAMPLE_LENGTH};
pub use context::{
    SessionContext, DEFAULT_CONFIG, DEFAULT_INSTALL_DIR, DEFAULT_PBENCH_RUN, DEFAULT_SCRIPT,
};

// Every failure is a `SessionError`, and every failure is fatal to the session.

pub use error::{RegistrationReason, Result, SessionError};

// The host/tool mapping, and reading it from a json file.

pub use hosts::{is_local, local_hostname, HostToolMap, LOCALHOST};
pub use tooldict::read_from_json;

// Directory naming and creation.

pub use dirs::{collected_dir, create_dir, iteration_dir, run_dir_name, sample_dir};

// Running the external programs.

pub use runner::{Invocation, Outcome, ProcessRunner, ToolRunner};

// The controller, its state, and the sample sequence.

pub use cycle::{SampleCycle, SampleResult};
pub use session::{clear_tools, upload_results, Session, SessionState, TOOL_GROUP};
