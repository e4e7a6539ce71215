//! End-to-end scenarios.
//!
//! A scenario drives the orchestrator through a complete workflow and
//! reports what it saw. Infrastructure problems (object creation, verifier
//! plumbing) surface as errors; assertion failures are collected in the
//! [`ScenarioReport`] so one run yields as much diagnostic signal as
//! possible instead of stopping at the first deviation.

pub mod kaniko;

pub use kaniko::KanikoBuildScenario;

use std::fmt;

use crate::resources::ResourceResult;

/// Outcome of one scenario run.
#[derive(Debug)]
pub struct ScenarioReport {
    /// Namespace the scenario ran in.
    pub namespace: String,
    /// Name of the task run that was submitted.
    pub task_run: String,
    /// Raw result entries reported by the run.
    pub results: Vec<ResourceResult>,
    /// Assertion failures, in the order they were found.
    pub failures: Vec<CheckFailure>,
    /// Whether and how the remote registry was consulted.
    pub remote: RemoteVerification,
}

impl ScenarioReport {
    /// True when every check held.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scenario in {} (task run {}): {}",
            self.namespace,
            self.task_run,
            if self.passed() { "passed" } else { "FAILED" }
        )?;
        match &self.remote {
            RemoteVerification::Compared { remote } => {
                writeln!(f, "  remote digest: {remote}")?;
            }
            RemoteVerification::Skipped { reason } => {
                writeln!(f, "  remote verification skipped: {reason}")?;
            }
        }
        for failure in &self.failures {
            writeln!(f, "  check failed: {failure}")?;
        }
        Ok(())
    }
}

/// One assertion that did not hold.
///
/// These are diagnostics, not errors; the scenario keeps going after
/// recording one wherever later checks can still produce signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    /// The run did not reach a terminal state within the budget, or
    /// polling itself failed.
    WaitFailed { detail: String },
    /// The final fetch of the run failed after the wait.
    FetchFailed { detail: String },
    /// The run finished with `Succeeded=False`.
    RunFailed {
        reason: String,
        message: String,
    },
    /// A required result key was absent or empty.
    MissingResult { key: &'static str },
    /// A result entry arrived without its producing resource's name.
    UnnamedResult { key: String },
    /// The reported commit differs from the requested revision.
    CommitMismatch { expected: String, actual: String },
    /// The reported digest is not a parseable digest.
    MalformedDigest { value: String },
    /// Local and remote digests disagree.
    DigestMismatch { reported: String, remote: String },
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckFailure::WaitFailed { detail } => {
                write!(f, "waiting for the task run failed: {detail}")
            }
            CheckFailure::FetchFailed { detail } => {
                write!(f, "fetching the final task run failed: {detail}")
            }
            CheckFailure::RunFailed { reason, message } => {
                write!(f, "task run failed (reason {reason:?}): {message}")
            }
            CheckFailure::MissingResult { key } => {
                write!(f, "result key {key:?} missing or empty")
            }
            CheckFailure::UnnamedResult { key } => {
                write!(f, "result entry {key:?} has no resource name")
            }
            CheckFailure::CommitMismatch { expected, actual } => {
                write!(f, "commit {actual:?} does not match requested revision {expected:?}")
            }
            CheckFailure::MalformedDigest { value } => {
                write!(f, "reported digest {value:?} is not a valid digest")
            }
            CheckFailure::DigestMismatch { reported, remote } => {
                write!(
                    f,
                    "reported digest {reported} does not match remote digest {remote}"
                )
            }
        }
    }
}

/// How the remote registry check concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteVerification {
    /// The registry was queried; its digest is recorded here.
    Compared { remote: String },
    /// The query was not attempted.
    Skipped { reason: String },
}
