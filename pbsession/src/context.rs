// Where the session lives and what the pbench tools are told about it.
//
// The pbench agent scripts read their parameters from environment variables.  We don't set those in
// our own process; a `SessionContext` is built once at session start and its `env()` is handed to
// the child processes that need it.

use crate::dirs;
use chrono::{DateTime, Local};
use std::path::PathBuf;

pub const DEFAULT_PBENCH_RUN: &str = "/var/lib/pbench-agent";
pub const DEFAULT_INSTALL_DIR: &str = "/opt/pbench-agent";
pub const DEFAULT_SCRIPT: &str = "pbench";
pub const DEFAULT_CONFIG: &str = "wrapper-run";

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub pbench_run: PathBuf,
    pub install_dir: PathBuf,
    pub script: String,
    pub config: String,
    pub hostname: String,
    pub started: DateTime<Local>,
}

impl SessionContext {
    pub fn new(pbench_run: PathBuf, hostname: &str) -> SessionContext {
        SessionContext {
            pbench_run,
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            script: DEFAULT_SCRIPT.to_string(),
            config: DEFAULT_CONFIG.to_string(),
            hostname: hostname.to_string(),
            started: Local::now(),
        }
    }

    /// The session root, `<pbench_run>/<script>_<config>_<timestamp>`.
    pub fn benchmark_run_dir(&self) -> PathBuf {
        self.pbench_run
            .join(dirs::run_dir_name(&self.script, &self.config, &self.started))
    }

    pub fn pbench_log(&self) -> PathBuf {
        self.pbench_run.join("pbench.log")
    }

    pub fn pbench_tmp(&self) -> PathBuf {
        self.pbench_run.join("tmp")
    }

    /// Environment for the tool meister start and stop programs.  `pbench_tmp` is only passed when
    /// the tool meister is created locally.
    pub fn env(&self, local_mode: bool) -> Vec<(String, String)> {
        let s = |p: PathBuf| p.to_string_lossy().to_string();
        let mut env = vec![
            ("script".to_string(), self.script.clone()),
            ("config".to_string(), self.config.clone()),
            ("pbench_run".to_string(), s(self.pbench_run.clone())),
            ("pbench_log".to_string(), s(self.pbench_log())),
            ("_pbench_hostname".to_string(), self.hostname.clone()),
            ("_pbench_full_hostname".to_string(), self.hostname.clone()),
            ("pbench_install_dir".to_string(), s(self.install_dir.clone())),
            ("benchmark_run_dir".to_string(), s(self.benchmark_run_dir())),
        ];
        if local_mode {
            env.push(("pbench_tmp".to_string(), s(self.pbench_tmp())));
        }
        env
    }
}

#[test]
fn test_env() {
    let ctx = SessionContext::new(PathBuf::from("/r"), "ml8");
    let env = ctx.env(true);
    let get = |k: &str| {
        env.iter()
            .find(|(key, _)| key == k)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(get("pbench_run").as_deref(), Some("/r"));
    assert_eq!(get("pbench_log").as_deref(), Some("/r/pbench.log"));
    assert_eq!(get("pbench_tmp").as_deref(), Some("/r/tmp"));
    assert_eq!(get("_pbench_full_hostname").as_deref(), Some("ml8"));
    let run_dir = get("benchmark_run_dir").unwrap();
    assert!(run_dir.starts_with("/r/pbench_wrapper-run_"));

    assert!(ctx.env(false).iter().all(|(k, _)| k != "pbench_tmp"));
}
