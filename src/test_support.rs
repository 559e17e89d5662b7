//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future;
use std::io;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::compute::{
    Compute, ComputeFuture, HostIdentity, InstanceRequest, ResourceKind, TemplateRequest,
};
use crate::jobs::{JobError, JobFuture, JobNumber, JobRequest, JobService, JobStatus};

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Compute operations [`ScriptedCompute`] can be told to fail.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ComputeStep {
    /// `create_template`.
    CreateTemplate,
    /// `create_reservation`.
    CreateReservation,
    /// `create_instance`.
    CreateInstance,
    /// `delete_instance`.
    DeleteInstance,
    /// `delete_reservation`.
    DeleteReservation,
    /// `delete_template`.
    DeleteTemplate,
    /// `instance_exists`.
    InstanceExists,
    /// `has_license`.
    HasLicense,
}

/// Records a single call made through [`ScriptedCompute`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ComputeCall {
    /// A template was requested.
    CreateTemplate(TemplateRequest),
    /// A reservation was requested for `name` from `template`.
    CreateReservation {
        /// Reservation name.
        name: String,
        /// Source template.
        template: String,
    },
    /// An instance was requested.
    CreateInstance(InstanceRequest),
    /// A delete was issued.
    Delete {
        /// Kind of resource.
        kind: ResourceKind,
        /// Resource name.
        name: String,
        /// Whether the caller waited for completion.
        wait: bool,
    },
    /// An existence check was made.
    InstanceExists(String),
    /// A license lookup was made.
    HasLicense(String),
}

/// Failure injected into [`ScriptedCompute`].
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("scripted {step:?} failure")]
pub struct ScriptedFailure {
    /// Step that failed.
    pub step: ComputeStep,
}

#[derive(Debug)]
struct ComputeState {
    calls: Vec<ComputeCall>,
    stamps: Vec<Instant>,
    failing: BTreeSet<ComputeStep>,
    instance_exists: bool,
    licenses: Vec<String>,
}

/// Compute double that records calls and fails on request.
///
/// Clones share state, so a test can keep a clone for inspection after
/// handing the original to the code under test.
#[derive(Clone, Debug)]
pub struct ScriptedCompute {
    identity: HostIdentity,
    state: Arc<StdMutex<ComputeState>>,
}

impl Default for ScriptedCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompute {
    /// Creates a double for host `controller` in `test-project`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_identity(HostIdentity {
            project: String::from("test-project"),
            zone: String::from("us-central1-a"),
            network: String::from("default"),
            name: String::from("controller"),
            id: String::from("1234567890"),
        })
    }

    /// Creates a double for an explicit host identity.
    #[must_use]
    pub fn with_identity(identity: HostIdentity) -> Self {
        Self {
            identity,
            state: Arc::new(StdMutex::new(ComputeState {
                calls: Vec::new(),
                stamps: Vec::new(),
                failing: BTreeSet::new(),
                instance_exists: true,
                licenses: Vec::new(),
            })),
        }
    }

    /// Makes every future call of `step` fail.
    pub fn fail(&self, step: ComputeStep) {
        lock(&self.state).failing.insert(step);
    }

    /// Sets the answer of `instance_exists`.
    pub fn set_instance_exists(&self, exists: bool) {
        lock(&self.state).instance_exists = exists;
    }

    /// Attaches a license id to the host.
    pub fn add_license(&self, license_id: &str) {
        lock(&self.state).licenses.push(license_id.to_owned());
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ComputeCall> {
        lock(&self.state).calls.clone()
    }

    /// Returns every call with its offset from the first one on the tokio
    /// clock, so paused-clock tests can check when a call happened.
    #[must_use]
    pub fn timed_calls(&self) -> Vec<(Duration, ComputeCall)> {
        let state = lock(&self.state);
        let Some(first) = state.stamps.first().copied() else {
            return Vec::new();
        };
        state
            .stamps
            .iter()
            .map(|stamp| stamp.duration_since(first))
            .zip(state.calls.iter().cloned())
            .collect()
    }

    /// Returns the deletes recorded so far as `(kind, name)` pairs.
    #[must_use]
    pub fn deletes(&self) -> Vec<(ResourceKind, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ComputeCall::Delete { kind, name, .. } => Some((kind, name)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, step: ComputeStep, call: ComputeCall) -> Result<(), ScriptedFailure> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        state.stamps.push(Instant::now());
        if state.failing.contains(&step) {
            return Err(ScriptedFailure { step });
        }
        Ok(())
    }

    fn delete(
        &self,
        step: ComputeStep,
        kind: ResourceKind,
        name: &str,
        wait: bool,
    ) -> ComputeFuture<'_, (), ScriptedFailure> {
        let call = ComputeCall::Delete {
            kind,
            name: name.to_owned(),
            wait,
        };
        Box::pin(future::ready(self.record(step, call)))
    }
}

impl Compute for ScriptedCompute {
    type Error = ScriptedFailure;

    fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    fn create_template<'a>(
        &'a self,
        request: &'a TemplateRequest,
    ) -> ComputeFuture<'a, (), Self::Error> {
        let call = ComputeCall::CreateTemplate(request.clone());
        Box::pin(future::ready(self.record(ComputeStep::CreateTemplate, call)))
    }

    fn create_reservation<'a>(
        &'a self,
        name: &'a str,
        template: &'a str,
    ) -> ComputeFuture<'a, (), Self::Error> {
        let call = ComputeCall::CreateReservation {
            name: name.to_owned(),
            template: template.to_owned(),
        };
        Box::pin(future::ready(
            self.record(ComputeStep::CreateReservation, call),
        ))
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> ComputeFuture<'a, (), Self::Error> {
        let call = ComputeCall::CreateInstance(request.clone());
        Box::pin(future::ready(self.record(ComputeStep::CreateInstance, call)))
    }

    fn delete_instance<'a>(
        &'a self,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        self.delete(ComputeStep::DeleteInstance, ResourceKind::Instance, name, wait)
    }

    fn delete_reservation<'a>(
        &'a self,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        self.delete(
            ComputeStep::DeleteReservation,
            ResourceKind::Reservation,
            name,
            wait,
        )
    }

    fn delete_template<'a>(
        &'a self,
        name: &'a str,
        wait: bool,
    ) -> ComputeFuture<'a, (), Self::Error> {
        self.delete(ComputeStep::DeleteTemplate, ResourceKind::Template, name, wait)
    }

    fn instance_exists<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, bool, Self::Error> {
        let outcome = self
            .record(
                ComputeStep::InstanceExists,
                ComputeCall::InstanceExists(name.to_owned()),
            )
            .map(|()| lock(&self.state).instance_exists);
        Box::pin(future::ready(outcome))
    }

    fn has_license<'a>(&'a self, license_id: &'a str) -> ComputeFuture<'a, bool, Self::Error> {
        let outcome = self
            .record(
                ComputeStep::HasLicense,
                ComputeCall::HasLicense(license_id.to_owned()),
            )
            .map(|()| {
                lock(&self.state)
                    .licenses
                    .iter()
                    .any(|id| id == license_id)
            });
        Box::pin(future::ready(outcome))
    }
}

#[derive(Debug)]
struct JobState {
    number: JobNumber,
    auth: Result<(), JobError>,
    submit_error: Option<JobError>,
    submissions: Vec<JobRequest>,
    statuses: VecDeque<Result<JobStatus, JobError>>,
    status_calls: usize,
    tails: VecDeque<String>,
    terminations: Vec<JobNumber>,
}

/// Job-control double with scripted status and tail answers.
///
/// Queued answers are consumed in order; the last one repeats once the queue
/// is down to a single entry. An empty status queue answers
/// [`JobStatus::NotFound`] and an empty tail queue answers an empty body.
#[derive(Clone, Debug)]
pub struct ScriptedJobService {
    state: Arc<StdMutex<JobState>>,
}

impl Default for ScriptedJobService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedJobService {
    /// Creates a double that assigns job number `4711`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(StdMutex::new(JobState {
                number: JobNumber::from("4711"),
                auth: Ok(()),
                submit_error: None,
                submissions: Vec::new(),
                statuses: VecDeque::new(),
                status_calls: 0,
                tails: VecDeque::new(),
                terminations: Vec::new(),
            })),
        }
    }

    /// Queues a status answer.
    pub fn push_status(&self, status: JobStatus) {
        lock(&self.state).statuses.push_back(Ok(status));
    }

    /// Queues a failing status answer.
    pub fn push_status_error(&self, error: JobError) {
        lock(&self.state).statuses.push_back(Err(error));
    }

    /// Queues a tail body.
    pub fn push_tail(&self, text: &str) {
        lock(&self.state).tails.push_back(text.to_owned());
    }

    /// Makes `check_auth` fail with `error`.
    pub fn fail_auth(&self, error: JobError) {
        lock(&self.state).auth = Err(error);
    }

    /// Makes `submit` fail with `error`.
    pub fn fail_submit(&self, error: JobError) {
        lock(&self.state).submit_error = Some(error);
    }

    /// Returns every submitted request.
    #[must_use]
    pub fn submissions(&self) -> Vec<JobRequest> {
        lock(&self.state).submissions.clone()
    }

    /// Returns every job number terminate was called for.
    #[must_use]
    pub fn terminations(&self) -> Vec<JobNumber> {
        lock(&self.state).terminations.clone()
    }

    /// Returns how many status calls were made.
    #[must_use]
    pub fn status_calls(&self) -> usize {
        lock(&self.state).status_calls
    }
}

fn next_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl JobService for ScriptedJobService {
    fn check_auth(&self) -> JobFuture<'_, ()> {
        Box::pin(future::ready(lock(&self.state).auth.clone()))
    }

    fn submit<'a>(&'a self, request: &'a JobRequest) -> JobFuture<'a, JobNumber> {
        let mut state = lock(&self.state);
        state.submissions.push(request.clone());
        let outcome = match state.submit_error.clone() {
            Some(error) => Err(error),
            None => Ok(state.number.clone()),
        };
        Box::pin(future::ready(outcome))
    }

    fn status<'a>(&'a self, _number: &'a JobNumber) -> JobFuture<'a, JobStatus> {
        let mut state = lock(&self.state);
        state.status_calls += 1;
        let outcome = next_sticky(&mut state.statuses).unwrap_or(Ok(JobStatus::NotFound));
        Box::pin(future::ready(outcome))
    }

    fn tail<'a>(&'a self, _number: &'a JobNumber) -> JobFuture<'a, String> {
        let text = next_sticky(&mut lock(&self.state).tails).unwrap_or_default();
        Box::pin(future::ready(Ok(text)))
    }

    fn terminate<'a>(&'a self, number: &'a JobNumber) -> JobFuture<'a, ()> {
        lock(&self.state).terminations.push(number.clone());
        Box::pin(future::ready(Ok(())))
    }

    fn shutdown_script(&self, number: &JobNumber) -> String {
        format!("#!/bin/bash\ncurl 'https://jobs.test/jarvice/terminate?number={number}'\n")
    }
}

/// In-memory writer whose clones share one buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    bytes: Arc<StdMutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer contents as text.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.bytes)).into_owned()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.bytes).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// A `None` value removes the variable for the lifetime of the guard.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
