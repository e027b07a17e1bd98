// Running the external pbench programs.
//
// The session never talks to the collection tools directly; every effect goes through a
// `ToolRunner`, one synchronous call per program invocation.  `ProcessRunner` is the real thing,
// tests substitute a runner that records invocations.

use crate::error::{Result, SessionError};
use log::info;
use std::process::Command;

/// One external program invocation.  The environment is passed explicitly and is added to the
/// inherited environment of the child.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: &str) -> Invocation {
        Invocation {
            program: program.to_string(),
            args: vec![],
            env: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Invocation {
        self.args.push(arg.into());
        self
    }

    pub fn envs(mut self, env: Vec<(String, String)>) -> Invocation {
        self.env = env;
        self
    }

    /// The command line as it would be typed, for logging.
    pub fn command_line(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

/// Captured output of a successful invocation.

#[derive(Debug, Default, Clone)]
pub struct Outcome {
    pub stdout: String,
    pub stderr: String,
}

pub trait ToolRunner {
    /// Run the program to completion.  Non-success (including failure to start) is an
    /// `ExternalInvocation` error.
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome>;
}

#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|e| SessionError::ExternalInvocation {
                program: invocation.program.clone(),
                status: "could not start".to_string(),
                stderr: e.to_string(),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(SessionError::ExternalInvocation {
                program: invocation.program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(Outcome { stdout, stderr })
    }
}

/// Log each non-empty line of `text` at info level.

pub fn log_lines(text: &str) {
    for line in text.lines() {
        let l = line.trim();
        if !l.is_empty() {
            info!("{l}");
        }
    }
}


#[test]
fn test_command_line() {
    let inv = Invocation::new("pbench-start-tools")
        .arg("--group=default")
        .arg("--dir=/a/b");
    assert_eq!(
        inv.command_line(),
        "pbench-start-tools --group=default --dir=/a/b"
    );
    assert!(inv.env.is_empty());
}

#[cfg(unix)]
#[test]
fn test_process_runner_status() {
    let mut r = ProcessRunner;
    let out = r.run(&Invocation::new("sh").arg("-c").arg("echo hello")).unwrap();
    assert_eq!(out.stdout.trim(), "hello");

    let err = r.run(&Invocation::new("sh").arg("-c").arg("exit 3")).unwrap_err();
    assert!(matches!(err, SessionError::ExternalInvocation { .. }));

    let err = r
        .run(&Invocation::new("/nonexistent/pbench-frobnicate"))
        .unwrap_err();
    assert!(err.to_string().contains("could not start"));
}

#[cfg(unix)]
#[test]
fn test_process_runner_env() {
    let mut r = ProcessRunner;
    let inv = Invocation::new("sh")
        .arg("-c")
        .arg("echo $pbench_run")
        .envs(vec![("pbench_run".to_string(), "/x/y".to_string())]);
    assert_eq!(r.run(&inv).unwrap().stdout.trim(), "/x/y");
}
