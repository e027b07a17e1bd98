// The session controller.
//
// A session is: register the tools, create the session root, start the tool meister, run the
// samples, stop the tool meister, clear the tools.  Every step is a call to an external pbench
// program, made through the session's `ToolRunner`.  Any failure is fatal to the session, and
// `run` is the one place where errors are caught, the tools are cleared, and the error is passed
// on.
//
// Collector mode uses the same controller but lets the caller drive the samples: `startup`,
// then `start_sample` / `stop_sample` as often as desired, then `shutdown`.

use crate::config::{Layout, SessionConfig};
use crate::context::SessionContext;
use crate::cycle::{SampleCycle, SampleResult};
use crate::dirs;
use crate::error::{RegistrationReason, Result, SessionError};
use crate::hosts::{self, HostToolMap};
use crate::runner::{log_lines, Invocation, ToolRunner};
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use std::thread;

pub const TOOL_GROUP: &str = "default";

/// Mutable state of a session, owned by the controller.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// All tools were registered and have not been cleared.
    pub registered: bool,

    /// A sample has been started and not stopped.
    pub running_sample: bool,

    /// The tool meister was started and has not been stopped.
    pub coordinator_running: bool,

    pub session_root: Option<PathBuf>,

    /// The parent of the sample directories: the current `iter-<i>`, or `collected-samples`.
    pub current_iteration_dir: Option<PathBuf>,

    pub current_sample_dir: Option<PathBuf>,

    /// The samples have been run, the cycle cannot be run again.
    pub cycled: bool,

    pub cleaned_up: bool,
}

pub struct Session<R: ToolRunner> {
    pub(crate) config: SessionConfig,
    pub(crate) context: SessionContext,
    pub(crate) tools: HostToolMap,
    pub(crate) runner: R,
    pub(crate) state: SessionState,
}

impl<R: ToolRunner> Session<R> {
    pub fn new(
        config: SessionConfig,
        context: SessionContext,
        tools: HostToolMap,
        runner: R,
    ) -> Session<R> {
        Session {
            config,
            context,
            tools,
            runner,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run a complete session and return the samples taken.  The tools are cleared exactly once,
    /// whether the session succeeds or not.  If clearing fails then that error is returned in
    /// preference to the error that caused the cleanup.

    pub fn run(&mut self) -> Result<Vec<SampleResult>> {
        match self.run_samples() {
            Ok(results) => {
                self.cleanup(None)?;
                Ok(results)
            }
            Err(e) => {
                self.cleanup(Some(&e.to_string()))?;
                Err(e)
            }
        }
    }

    fn run_samples(&mut self) -> Result<Vec<SampleResult>> {
        self.startup()?;
        let results = self.cycle().collect::<Result<Vec<SampleResult>>>()?;
        self.stop_coordinator()?;
        Ok(results)
    }

    /// Validate the configuration, register the tools, create the session root and start the tool
    /// meister.  In the collected-samples layout this also creates the directory for the samples.
    /// On error the caller must run `cleanup`.

    pub fn startup(&mut self) -> Result<()> {
        if self.state.session_root.is_some() || self.state.cleaned_up {
            return Err(SessionError::InvalidTransition(
                "The session has already been started".to_string(),
            ));
        }
        self.config.validate()?;
        self.register()?;

        let root = dirs::create_dir(&self.context.benchmark_run_dir(), "benchmark-run-dir")?;
        info!("Session directory {}", root.display());
        self.state.session_root = Some(root.clone());

        self.start_coordinator()?;

        if self.config.layout == Layout::Collected {
            let dir = dirs::create_dir(&dirs::collected_dir(&root), "iteration dir")?;
            self.state.current_iteration_dir = Some(dir);
        }
        Ok(())
    }

    /// Issue one `pbench-register-tool` per (host, tool).  In local mode every host must be local,
    /// and this is checked before anything is registered.

    pub fn register(&mut self) -> Result<()> {
        let local = self.context.hostname.clone();
        if self.config.local_mode {
            if let Some(host) = self.tools.first_remote(&local) {
                error!("Please only use host '{local}' or 'localhost' with create_local option");
                return Err(SessionError::Registration {
                    reason: RegistrationReason::RemoteHostInLocalMode {
                        host: host.to_string(),
                        local,
                    },
                });
            }
        }

        let invocations = self
            .tools
            .pairs()
            .map(|(host, tool)| {
                let mut inv = Invocation::new("pbench-register-tool").arg(format!("--name={tool}"));
                if !hosts::is_local(host, &local) {
                    inv = inv.arg(format!("--remote={host}"));
                }
                (host.to_string(), tool.to_string(), inv)
            })
            .collect::<Vec<_>>();
        for (host, tool, inv) in invocations {
            if let Err(e) = self.invoke(&inv) {
                return Err(SessionError::Registration {
                    reason: RegistrationReason::InvocationFailed {
                        host,
                        tool,
                        source: Box::new(e),
                    },
                });
            }
        }
        self.state.registered = true;
        Ok(())
    }

    pub fn start_coordinator(&mut self) -> Result<()> {
        let mut inv = Invocation::new("pbench-tool-meister-start");
        if self.config.local_mode {
            inv = inv.arg("--orchestrate=create");
        } else {
            let Some(ref redis) = self.config.coordinator else {
                return Err(SessionError::Config(
                    "No coordinator endpoint for non-local mode".to_string(),
                ));
            };
            let sink = self.config.tool_data_sink().unwrap_or(&redis.host).to_string();
            inv = inv
                .arg("--orchestrate=existing")
                .arg(format!("--redis-server={redis}"))
                .arg(format!("--tool-data-sink={sink}"));
        }
        let inv = inv.arg(TOOL_GROUP).envs(self.context.env(self.config.local_mode));
        self.invoke(&inv)?;
        self.state.coordinator_running = true;
        Ok(())
    }

    pub fn stop_coordinator(&mut self) -> Result<()> {
        if !self.state.coordinator_running {
            return Ok(());
        }
        let inv = Invocation::new("pbench-tool-meister-stop")
            .arg(format!("--sysinfo={TOOL_GROUP}"))
            .arg(TOOL_GROUP)
            .envs(self.context.env(self.config.local_mode));
        self.invoke(&inv)?;
        self.state.coordinator_running = false;
        Ok(())
    }

    /// Start collecting into `dir`.

    pub fn start(&mut self, dir: &Path) -> Result<()> {
        if self.state.running_sample {
            return Err(SessionError::InvalidTransition(
                "There is still a running sample, stop it before starting another".to_string(),
            ));
        }
        self.signal_tools("start", dir)?;
        self.state.running_sample = true;
        self.state.current_sample_dir = Some(dir.to_path_buf());
        Ok(())
    }

    /// Stop collecting and send the data out of the sample directory.

    pub fn stop(&mut self) -> Result<()> {
        if !self.state.running_sample {
            return Err(SessionError::InvalidTransition(
                "No sample currently running, start a sample first".to_string(),
            ));
        }
        let Some(dir) = self.state.current_sample_dir.clone() else {
            return Err(SessionError::InvalidTransition(
                "Running sample has no directory".to_string(),
            ));
        };
        self.signal_tools("stop", &dir)?;
        info!("Sample stopped, sending data for {}", dir.display());
        self.signal_tools("send", &dir)?;
        self.state.running_sample = false;
        Ok(())
    }

    /// Block for the sample length while the tools collect.  There is no way to cut this short.

    pub fn hold(&self) {
        thread::sleep(self.config.sample_length());
    }

    /// The samples of the session as a lazy sequence.  Requires `startup`; can be run once.

    pub fn cycle(&mut self) -> SampleCycle<'_, R> {
        SampleCycle::new(self)
    }

    /// Collector mode: create `collected-samples/sample-<nsample>` and start collecting into it.

    pub fn start_sample(&mut self, nsample: usize) -> Result<PathBuf> {
        let Some(parent) = self.state.current_iteration_dir.clone() else {
            return Err(SessionError::InvalidTransition(
                "The collector has not been started, cannot start sample".to_string(),
            ));
        };
        if self.state.running_sample {
            return Err(SessionError::InvalidTransition(
                "There is still a running sample, stop it before starting another".to_string(),
            ));
        }
        let dir = dirs::create_dir(&dirs::sample_dir(&parent, nsample), "sample dir")?;
        info!("Beginning pbench sample {nsample}");
        self.start(&dir)?;
        Ok(dir)
    }

    pub fn stop_sample(&mut self) -> Result<()> {
        self.stop()
    }

    /// Collector mode: stop the tool meister and clear the tools.

    pub fn shutdown(&mut self) -> Result<()> {
        self.stop_coordinator()?;
        self.cleanup(None)
    }

    /// Log `reason`, if any, and clear the tools if they were registered.  Only the first call
    /// does anything.  A failure to clear the tools cannot be recovered from and is returned.

    pub fn cleanup(&mut self, reason: Option<&str>) -> Result<()> {
        if self.state.cleaned_up {
            return Ok(());
        }
        self.state.cleaned_up = true;
        if let Some(msg) = reason {
            error!("{msg}");
        }
        if self.state.registered {
            if let Err(e) = clear_tools(&mut self.runner) {
                error!("When attempting to clear tools, process failed");
                return Err(e);
            }
            self.state.registered = false;
        }
        self.state.running_sample = false;
        self.state.current_sample_dir = None;
        Ok(())
    }

    /// Upload the results of the finished session to the configured web server.

    pub fn upload(&mut self) -> Result<()> {
        if !self.state.cleaned_up {
            return Err(SessionError::InvalidTransition(
                "The session must finish before its results are uploaded".to_string(),
            ));
        }
        upload_results(&mut self.runner, self.config.web_server.as_deref())
    }

    fn signal_tools(&mut self, method: &str, dir: &Path) -> Result<()> {
        let inv = Invocation::new(&format!("pbench-{method}-tools"))
            .arg(format!("--group={TOOL_GROUP}"))
            .arg(format!("--dir={}", dir.display()));
        self.invoke(&inv)
    }

    fn invoke(&mut self, inv: &Invocation) -> Result<()> {
        debug!("Running {}", inv.command_line());
        let outcome = self.runner.run(inv)?;
        log_lines(&outcome.stdout);
        Ok(())
    }
}

/// Issue `pbench-clear-tools`, logging its diagnostics.

pub fn clear_tools<R: ToolRunner>(runner: &mut R) -> Result<()> {
    let outcome = runner.run(&Invocation::new("pbench-clear-tools"))?;
    log_lines(&outcome.stderr);
    Ok(())
}

/// Move the results of finished sessions to the web server with `pbench-move-results`.

pub fn upload_results<R: ToolRunner>(runner: &mut R, web_server: Option<&str>) -> Result<()> {
    let Some(server) = web_server else {
        return Err(SessionError::Config("No web server specified for upload".to_string()));
    };
    info!("Uploading pbench archives to {server}...");
    let inv = Invocation::new("pbench-move-results")
        .envs(vec![("pbench_web_server".to_string(), server.to_string())]);
    let outcome = runner.run(&inv)?;
    log_lines(&outcome.stdout);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorEndpoint;
    use crate::runner::testing::RecordingRunner;
    use tempfile::TempDir;

    fn tools(hosts: &[(&str, &[&str])]) -> HostToolMap {
        let mut m = HostToolMap::new();
        for (h, ts) in hosts {
            m.insert(h, ts.iter().map(|t| t.to_string()).collect());
        }
        m
    }

    fn local_config(iterations: usize, samples: usize) -> SessionConfig {
        SessionConfig {
            iterations,
            samples_per_iteration: samples,
            sample_length_seconds: 0,
            local_mode: true,
            ..Default::default()
        }
    }

    fn session(
        tmp: &TempDir,
        config: SessionConfig,
        map: HostToolMap,
        runner: RecordingRunner,
    ) -> Session<RecordingRunner> {
        let ctx = SessionContext::new(tmp.path().to_path_buf(), "ml8");
        Session::new(config, ctx, map, runner)
    }

    #[test]
    fn test_register_local_and_remote() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            local_mode: false,
            coordinator: Some(CoordinatorEndpoint {
                host: "redis1".to_string(),
                port: 17001,
            }),
            ..local_config(1, 1)
        };
        let map = tools(&[("localhost", &["sar"]), ("ml8", &["iostat"]), ("ml3", &["mpstat"])]);
        let mut s = session(&tmp, config, map, RecordingRunner::default());
        s.register().unwrap();
        assert!(s.state().registered);
        let args = s
            .runner()
            .invocations
            .iter()
            .map(|i| i.args.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            args,
            vec![
                vec!["--name=sar".to_string()],
                vec!["--name=iostat".to_string()],
                vec!["--name=mpstat".to_string(), "--remote=ml3".to_string()],
            ]
        );
    }

    #[test]
    fn test_register_remote_in_local_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"]), ("ml3", &["mpstat"])]);
        let mut s = session(&tmp, local_config(1, 1), map, RecordingRunner::default());
        match s.register() {
            Err(SessionError::Registration {
                reason: RegistrationReason::RemoteHostInLocalMode { host, .. },
            }) => assert_eq!(host, "ml3"),
            other => panic!("unexpected {:?}", other),
        }
        // Checked before anything is registered
        assert!(s.runner().invocations.is_empty());
        assert!(!s.state().registered);
    }

    #[test]
    fn test_register_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar", "iostat"])]);
        let mut s = session(
            &tmp,
            local_config(1, 1),
            map,
            RecordingRunner::failing_on("pbench-register-tool"),
        );
        assert!(matches!(
            s.register(),
            Err(SessionError::Registration {
                reason: RegistrationReason::InvocationFailed { .. }
            })
        ));
        // No retry, no second tool
        assert_eq!(s.runner().count("pbench-register-tool"), 1);
        assert!(!s.state().registered);
    }

    #[test]
    fn test_start_while_running() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, local_config(1, 1), map, RecordingRunner::default());
        s.start(tmp.path()).unwrap();
        assert!(s.state().running_sample);
        assert!(matches!(
            s.start(tmp.path()),
            Err(SessionError::InvalidTransition(_))
        ));
        assert_eq!(s.runner().count("pbench-start-tools"), 1);
    }

    #[test]
    fn test_stop_without_start() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, local_config(1, 1), map, RecordingRunner::default());
        assert!(matches!(s.stop(), Err(SessionError::InvalidTransition(_))));
        assert!(s.runner().invocations.is_empty());

        s.start(tmp.path()).unwrap();
        s.stop().unwrap();
        assert!(!s.state().running_sample);
        assert_eq!(
            s.runner().programs(),
            vec!["pbench-start-tools", "pbench-stop-tools", "pbench-send-tools"]
        );
        assert!(matches!(s.stop(), Err(SessionError::InvalidTransition(_))));
        assert_eq!(s.runner().invocations.len(), 3);
    }

    #[test]
    fn test_cleanup_only_once() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, local_config(1, 1), map, RecordingRunner::default());
        s.register().unwrap();
        s.cleanup(Some("test")).unwrap();
        s.cleanup(None).unwrap();
        assert_eq!(s.runner().count("pbench-clear-tools"), 1);
        assert!(s.state().cleaned_up);
        assert!(!s.state().registered);
    }

    #[test]
    fn test_run_empty_tool_map() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session(
            &tmp,
            local_config(1, 2),
            HostToolMap::new(),
            RecordingRunner::default(),
        );
        let results = s.run().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(s.runner().count("pbench-register-tool"), 0);
        assert_eq!(s.runner().count("pbench-start-tools"), 2);
        // Registration of nothing still succeeded, so the tools are cleared
        assert_eq!(s.runner().count("pbench-clear-tools"), 1);
        assert!(s.state().cleaned_up);
    }

    #[test]
    fn test_cleanup_unregistered() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, local_config(1, 1), map, RecordingRunner::default());
        s.cleanup(Some("nothing registered")).unwrap();
        assert!(s.runner().invocations.is_empty());
    }

    #[test]
    fn test_cleanup_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(
            &tmp,
            local_config(1, 1),
            map,
            RecordingRunner::failing_on("pbench-clear-tools"),
        );
        s.register().unwrap();
        assert!(matches!(
            s.cleanup(None),
            Err(SessionError::ExternalInvocation { .. })
        ));
        // Not retried
        s.cleanup(None).unwrap();
        assert_eq!(s.runner().count("pbench-clear-tools"), 1);
    }

    #[test]
    fn test_run_missing_coordinator() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            local_mode: false,
            ..local_config(1, 1)
        };
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, config, map, RecordingRunner::default());
        assert!(matches!(s.run(), Err(SessionError::Config(_))));
        assert!(s.runner().invocations.is_empty());
        assert!(s.state().cleaned_up);
    }

    #[test]
    fn test_run_existing_coordinator() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            local_mode: false,
            coordinator: Some("redis1:17001".parse().unwrap()),
            tool_data_sink: Some("tds1".to_string()),
            ..local_config(1, 1)
        };
        let map = tools(&[("ml3", &["sar"])]);
        let mut s = session(&tmp, config, map, RecordingRunner::default());
        s.run().unwrap();
        let start = s
            .runner()
            .invocations
            .iter()
            .find(|i| i.program == "pbench-tool-meister-start")
            .unwrap();
        assert_eq!(
            start.args,
            vec![
                "--orchestrate=existing",
                "--redis-server=redis1:17001",
                "--tool-data-sink=tds1",
                "default"
            ]
        );
        assert!(start.env.iter().any(|(k, _)| k == "benchmark_run_dir"));
        assert!(start.env.iter().all(|(k, _)| k != "pbench_tmp"));
    }

    #[test]
    fn test_local_coordinator_env() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, local_config(1, 1), map, RecordingRunner::default());
        s.run().unwrap();
        let tmpdir = tmp.path().join("tmp").to_string_lossy().to_string();
        for program in ["pbench-tool-meister-start", "pbench-tool-meister-stop"] {
            let inv = s
                .runner()
                .invocations
                .iter()
                .find(|i| i.program == program)
                .unwrap();
            assert!(inv
                .env
                .iter()
                .any(|(k, v)| k == "pbench_tmp" && *v == tmpdir));
        }
    }

    #[test]
    fn test_failed_signal_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(
            &tmp,
            local_config(3, 2),
            map,
            RecordingRunner::failing_on("pbench-send-tools"),
        );
        assert!(matches!(
            s.run(),
            Err(SessionError::ExternalInvocation { .. })
        ));
        // Stopped at the first sample
        assert_eq!(s.runner().count("pbench-start-tools"), 1);
        assert_eq!(s.runner().count("pbench-clear-tools"), 1);
        assert_eq!(s.runner().programs().last(), Some(&"pbench-clear-tools"));
    }

    #[test]
    fn test_directory_conflict_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, local_config(1, 1), map, RecordingRunner::default());
        std::fs::create_dir(s.context().benchmark_run_dir()).unwrap();
        assert!(matches!(
            s.run(),
            Err(SessionError::DirectoryConflict { .. })
        ));
        assert_eq!(
            s.runner().programs(),
            vec!["pbench-register-tool", "pbench-clear-tools"]
        );
    }

    #[test]
    fn test_collector_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            layout: Layout::Collected,
            ..local_config(1, 1)
        };
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, config, map, RecordingRunner::default());

        // Not started
        assert!(matches!(
            s.start_sample(1),
            Err(SessionError::InvalidTransition(_))
        ));

        s.startup().unwrap();
        let d1 = s.start_sample(1).unwrap();
        assert!(d1.ends_with("collected-samples/sample-1"));
        assert!(d1.is_dir());
        assert!(matches!(
            s.start_sample(2),
            Err(SessionError::InvalidTransition(_))
        ));
        s.stop_sample().unwrap();
        s.start_sample(2).unwrap();
        s.stop_sample().unwrap();
        s.shutdown().unwrap();

        assert_eq!(s.runner().count("pbench-start-tools"), 2);
        assert_eq!(s.runner().count("pbench-send-tools"), 2);
        assert_eq!(s.runner().count("pbench-tool-meister-stop"), 1);
        assert_eq!(s.runner().count("pbench-clear-tools"), 1);
    }

    #[test]
    fn test_session_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            web_server: Some("http://results.example.com".to_string()),
            ..local_config(1, 1)
        };
        let map = tools(&[("localhost", &["sar"])]);
        let mut s = session(&tmp, config, map, RecordingRunner::default());
        assert!(matches!(
            s.upload(),
            Err(SessionError::InvalidTransition(_))
        ));
        s.run().unwrap();
        s.upload().unwrap();
        assert_eq!(s.runner().programs().last(), Some(&"pbench-move-results"));
    }

    #[test]
    fn test_upload() {
        let mut r = RecordingRunner::default();
        assert!(matches!(
            upload_results(&mut r, None),
            Err(SessionError::Config(_))
        ));
        assert!(r.invocations.is_empty());
        upload_results(&mut r, Some("http://results.example.com")).unwrap();
        assert_eq!(r.invocations[0].program, "pbench-move-results");
        assert_eq!(
            r.invocations[0].env,
            vec![(
                "pbench_web_server".to_string(),
                "http://results.example.com".to_string()
            )]
        );
    }
}
