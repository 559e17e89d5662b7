//! Poll loop driving one watched unit from initialisation to cleanup.
//!
//! The [`Monitor`] calls [`Watchable::init`], then polls
//! [`Watchable::running`] on a fixed interval, pulling output after every
//! positive poll. The loop ends when the unit stops running or a termination
//! signal arrives; success is then decided once by
//! [`Watchable::exit_success`] and [`Watchable::cleanup`] always runs.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Future returned by [`Watchable`] operations.
pub type WatchFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unit of work the monitor can drive.
///
/// Implementations report failures through their return values and logs;
/// none of the operations may panic. `cleanup` may run more than once and
/// must be idempotent.
pub trait Watchable: Send {
    /// Prepares the unit. Returning `false` aborts the run after cleanup.
    fn init(&mut self) -> WatchFuture<'_, bool>;

    /// Reports whether the unit is still working.
    fn running(&mut self) -> WatchFuture<'_, bool>;

    /// Emits any output produced since the previous call.
    fn output(&mut self) -> WatchFuture<'_, ()>;

    /// Reports whether the unit finished successfully.
    fn exit_success(&mut self) -> WatchFuture<'_, bool>;

    /// Releases everything the unit holds.
    fn cleanup(&mut self) -> WatchFuture<'_, ()>;
}

/// Errors returned by [`Monitor::run`].
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Raised when the termination signal handlers cannot be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] io::Error),
    /// Raised when [`Watchable::init`] fails.
    #[error("monitor init failed")]
    Init,
    /// Raised when the unit did not finish successfully.
    #[error("job processing failed")]
    JobFailed,
}

/// Subscription to SIGINT and SIGTERM, released when dropped.
#[derive(Debug)]
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignal {
    /// Subscribes to SIGINT and SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when a handler cannot be registered.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves once either signal has been delivered, returning its name.
    ///
    /// Signals delivered before the first call are buffered.
    pub async fn received(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

/// The poll loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Monitor {
    poll_interval: Duration,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    /// Creates a monitor polling every [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval. A zero interval keeps the default.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    /// Returns the configured poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Drives `watchable` until it stops or SIGINT/SIGTERM arrives.
    ///
    /// The signal subscription is installed before initialisation, so a
    /// signal received while `init` runs ends the loop on its first
    /// iteration.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Signal`] before touching `watchable` when the
    /// handlers cannot be installed, otherwise see [`Monitor::run_until`].
    pub async fn run<W>(&self, watchable: &mut W) -> Result<(), MonitorError>
    where
        W: Watchable + ?Sized,
    {
        let mut shutdown = ShutdownSignal::install().map_err(MonitorError::Signal)?;
        let cancel = async {
            let name = shutdown.received().await;
            info!(signal = name, "termination signal received");
        };
        self.run_until(watchable, cancel).await
    }

    /// Drives `watchable` until it stops or `cancel` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Init`] when initialisation fails and
    /// [`MonitorError::JobFailed`] when the unit did not succeed. Cleanup has
    /// run in both cases.
    pub async fn run_until<W, F>(&self, watchable: &mut W, cancel: F) -> Result<(), MonitorError>
    where
        W: Watchable + ?Sized,
        F: Future<Output = ()>,
    {
        if !watchable.init().await {
            warn!("initialisation failed; cleaning up");
            watchable.cleanup().await;
            return Err(MonitorError::Init);
        }

        info!(poll_interval_secs = self.poll_interval.as_secs(), "watching job");
        tokio::pin!(cancel);
        let mut ticks = time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = &mut cancel => break,
                _ = ticks.tick() => {
                    if !watchable.running().await {
                        info!("job is no longer running");
                        break;
                    }
                    watchable.output().await;
                }
            }
        }

        let succeeded = watchable.exit_success().await;
        watchable.cleanup().await;
        if succeeded {
            info!("job completed successfully");
            Ok(())
        } else {
            warn!("job did not complete successfully");
            Err(MonitorError::JobFailed)
        }
    }
}
