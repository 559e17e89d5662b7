//! Provision-and-watch unit driven by the monitor.

use std::fmt;
use std::io::{self, Write};

use tracing::{debug, error, info, warn};

use super::Provisioner;
use crate::compute::Compute;
use crate::jobs::{JobHandle, JobService, TailWindow};
use crate::monitor::{WatchFuture, Watchable};

/// Provisions a run in `init`, streams its output and tears it down.
pub struct BatchService<C, J> {
    provisioner: Provisioner<C, J>,
    handle: Option<JobHandle<J>>,
    tail: TailWindow,
    sink: Box<dyn Write + Send>,
}

impl<C, J> fmt::Debug for BatchService<C, J>
where
    C: fmt::Debug,
    J: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchService")
            .field("provisioner", &self.provisioner)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<C, J> BatchService<C, J>
where
    C: Compute,
    J: JobService + Clone,
{
    /// Wraps `provisioner`, writing job output to stdout.
    #[must_use]
    pub fn new(provisioner: Provisioner<C, J>) -> Self {
        Self::with_sink(provisioner, Box::new(io::stdout()))
    }

    /// Wraps `provisioner`, writing job output to `sink`.
    #[must_use]
    pub fn with_sink(provisioner: Provisioner<C, J>, sink: Box<dyn Write + Send>) -> Self {
        Self {
            provisioner,
            handle: None,
            tail: TailWindow::new(),
            sink,
        }
    }

    /// The wrapped provisioner.
    #[must_use]
    pub const fn provisioner(&self) -> &Provisioner<C, J> {
        &self.provisioner
    }

    async fn init_inner(&mut self) -> bool {
        match self.provisioner.provision().await {
            Ok(handle) => {
                info!(job = %handle.number(), "batch processing starting");
                self.handle = Some(handle);
                true
            }
            Err(err) => {
                error!(label = %self.provisioner.label(), error = %err, "provisioning failed");
                false
            }
        }
    }

    async fn running_inner(&mut self) -> bool {
        match &self.handle {
            Some(handle) => handle.running().await,
            None => false,
        }
    }

    async fn output_inner(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        let text = match handle.service().tail(handle.number()).await {
            Ok(text) => text,
            Err(err) => {
                debug!(error = %err, "tail unavailable; skipping");
                return;
            }
        };
        for line in self.tail.advance(&text) {
            if let Err(err) = writeln!(self.sink, "{line}") {
                warn!(error = %err, "failed to write job output");
                return;
            }
        }
        if let Err(err) = self.sink.flush() {
            warn!(error = %err, "failed to flush job output");
        }
    }

    async fn exit_success_inner(&mut self) -> bool {
        match &self.handle {
            Some(handle) => handle.exit_success().await,
            None => false,
        }
    }

    async fn cleanup_inner(&mut self) {
        info!(label = %self.provisioner.label(), "running cleanup");
        let report = self.provisioner.teardown().await;
        if !report.is_clean() {
            warn!(
                label = %self.provisioner.label(),
                failed = report.failed.len(),
                "cleanup left resources behind; run `batchwatch cleanup --label {}`",
                self.provisioner.label()
            );
        }
    }
}

impl<C, J> Watchable for BatchService<C, J>
where
    C: Compute,
    J: JobService + Clone,
{
    fn init(&mut self) -> WatchFuture<'_, bool> {
        Box::pin(self.init_inner())
    }

    fn running(&mut self) -> WatchFuture<'_, bool> {
        Box::pin(self.running_inner())
    }

    fn output(&mut self) -> WatchFuture<'_, ()> {
        Box::pin(self.output_inner())
    }

    fn exit_success(&mut self) -> WatchFuture<'_, bool> {
        Box::pin(self.exit_success_inner())
    }

    fn cleanup(&mut self) -> WatchFuture<'_, ()> {
        Box::pin(self.cleanup_inner())
    }
}
