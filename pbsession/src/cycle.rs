// Iterations x samples, as a lazy sequence.
//
// For each iteration i in 1..=iterations and within it each sample s in 1..=samples, in ascending
// order: create the sample directory (and the iteration directory, for the first sample), start the
// tools, wait out the sample length, stop the tools and send the data.  One sample at a time.
//
// The sequence yields one `SampleResult` per sample.  It ends after the last sample or after the
// first error, whichever comes first, and it cannot be restarted.

use crate::config::Layout;
use crate::dirs;
use crate::error::{Result, SessionError};
use crate::runner::ToolRunner;
use crate::session::Session;
use chrono::{DateTime, Local};
use log::info;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleResult {
    /// 1-based
    pub iteration: usize,

    /// 1-based, within the iteration
    pub sample: usize,

    pub dir: PathBuf,
    pub started: DateTime<Local>,
    pub stopped: DateTime<Local>,
}

pub struct SampleCycle<'a, R: ToolRunner> {
    session: &'a mut Session<R>,
    iteration: usize,
    sample: usize,
    done: bool,
}

impl<'a, R: ToolRunner> SampleCycle<'a, R> {
    pub(crate) fn new(session: &'a mut Session<R>) -> SampleCycle<'a, R> {
        SampleCycle {
            session,
            iteration: 1,
            sample: 1,
            done: false,
        }
    }

    fn check_ready(&mut self) -> Result<()> {
        if self.session.state.cycled {
            return Err(SessionError::InvalidTransition(
                "The samples of this session have already been run".to_string(),
            ));
        }
        if self.session.state.session_root.is_none() {
            return Err(SessionError::InvalidTransition(
                "The session has not been started, cannot run samples".to_string(),
            ));
        }
        self.session.state.cycled = true;
        Ok(())
    }

    // The directory for the current sample, creating the iteration directory if needed.
    fn sample_dir(&mut self) -> Result<PathBuf> {
        let state = &mut self.session.state;
        let parent = match self.session.config.layout {
            Layout::Iterations => {
                if self.sample == 1 {
                    let Some(ref root) = state.session_root else {
                        return Err(SessionError::InvalidTransition(
                            "No session directory".to_string(),
                        ));
                    };
                    let dir = dirs::create_dir(
                        &dirs::iteration_dir(root, self.iteration),
                        "iteration dir",
                    )?;
                    state.current_iteration_dir = Some(dir);
                }
                state.current_iteration_dir.clone()
            }
            Layout::Collected => state.current_iteration_dir.clone(),
        };
        let Some(parent) = parent else {
            return Err(SessionError::InvalidTransition(
                "No directory for samples".to_string(),
            ));
        };
        // Samples are numbered across iterations when they all go into the same directory.
        let n = match self.session.config.layout {
            Layout::Iterations => self.sample,
            Layout::Collected => {
                (self.iteration - 1) * self.session.config.samples_per_iteration + self.sample
            }
        };
        dirs::create_dir(&dirs::sample_dir(&parent, n), "sample dir")
    }

    fn run_sample(&mut self) -> Result<SampleResult> {
        let (i, s) = (self.iteration, self.sample);
        let dir = self.sample_dir()?;
        info!(
            "Beginning {}s sample {s} of iteration {i}",
            self.session.config.sample_length_seconds
        );
        self.session.start(&dir)?;
        let started = Local::now();
        self.session.hold();
        let stopped = Local::now();
        self.session.stop()?;
        Ok(SampleResult {
            iteration: i,
            sample: s,
            dir,
            started,
            stopped,
        })
    }

    fn advance(&mut self) {
        if self.sample < self.session.config.samples_per_iteration {
            self.sample += 1;
        } else if self.iteration < self.session.config.iterations {
            self.iteration += 1;
            self.sample = 1;
        } else {
            self.done = true;
        }
    }
}

impl<'a, R: ToolRunner> Iterator for SampleCycle<'a, R> {
    type Item = Result<SampleResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.iteration == 1 && self.sample == 1 {
            if let Err(e) = self.check_ready() {
                self.done = true;
                return Some(Err(e));
            }
        }
        match self.run_sample() {
            Ok(r) => {
                self.advance();
                Some(Ok(r))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
