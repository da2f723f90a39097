//! Checkpointed execution with rollback and retry policies.

use crate::error::{ErrorList, MigrationError, Result};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What `execute` does when the unit of work fails.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecoveryStrategy {
    /// Return the first error.
    #[default]
    FailFast,
    /// Log the error and report success.
    ContinueOnError,
    /// Re-run recoverable failures with exponentially growing delays.
    RetryWithBackoff {
        max_attempts: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    },
}

impl RecoveryStrategy {
    /// Retry policy with a doubling delay capped at ten seconds.
    pub fn retry(max_attempts: u32, initial_delay: Duration) -> Self {
        RecoveryStrategy::RetryWithBackoff {
            max_attempts,
            initial_delay,
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Recoverer settings.
#[derive(Debug, Clone, Default)]
pub struct RecoveryConfig {
    pub strategy: RecoveryStrategy,
    /// Deadline for each `execute` call.
    pub timeout: Option<Duration>,
}

impl RecoveryConfig {
    pub fn with_strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Lifecycle of a [`Recoverer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStatus {
    /// Nothing executed yet.
    Idle,
    /// A unit of work is executing.
    Running,
    /// The last unit of work succeeded.
    Succeeded,
    /// The last unit of work failed.
    Failed,
    /// Checkpoints were restored.
    RolledBack,
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStatus::Idle => write!(f, "idle"),
            RecoveryStatus::Running => write!(f, "running"),
            RecoveryStatus::Succeeded => write!(f, "succeeded"),
            RecoveryStatus::Failed => write!(f, "failed"),
            RecoveryStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// A deadline a unit of work can poll.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| Instant::now() >= at)
    }

    /// Time left, or `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail with a non-recoverable error once expired.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_expired() {
            return Err(MigrationError::file("deadline exceeded")
                .with_operation(operation)
                .with_recoverable(false));
        }
        Ok(())
    }
}

type Action = Box<dyn FnMut() -> Result<()> + Send>;

/// A named checkpoint with actions to save, restore and clean up.
pub struct RecoveryPoint {
    pub name: String,
    save: Option<Action>,
    restore: Option<Action>,
    cleanup: Option<Action>,
}

impl RecoveryPoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            save: None,
            restore: None,
            cleanup: None,
        }
    }

    pub fn on_save(mut self, f: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        self.save = Some(Box::new(f));
        self
    }

    pub fn on_restore(mut self, f: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        self.restore = Some(Box::new(f));
        self
    }

    pub fn on_cleanup(mut self, f: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for RecoveryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPoint")
            .field("name", &self.name)
            .field("save", &self.save.is_some())
            .field("restore", &self.restore.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Runs units of work under a recovery strategy and keeps the checkpoints
/// needed to undo them.
#[derive(Debug)]
pub struct Recoverer {
    config: RecoveryConfig,
    points: Vec<RecoveryPoint>,
    status: RecoveryStatus,
}

impl Recoverer {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            points: Vec::new(),
            status: RecoveryStatus::Idle,
        }
    }

    pub fn status(&self) -> RecoveryStatus {
        self.status
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(|p| p.name.as_str())
    }

    /// Run the checkpoint's save action and record it.
    ///
    /// A failed save leaves the checkpoint unrecorded.
    pub fn checkpoint(&mut self, mut point: RecoveryPoint) -> Result<()> {
        if let Some(save) = point.save.as_mut() {
            save().map_err(|e| {
                if e.operation.is_none() {
                    e.with_operation(format!("checkpoint {}", point.name))
                } else {
                    e
                }
            })?;
        }
        debug!(checkpoint = %point.name, "recorded checkpoint");
        self.points.push(point);
        Ok(())
    }

    /// Execute a unit of work under the configured strategy.
    pub fn execute<F>(&mut self, operation: &str, mut work: F) -> Result<()>
    where
        F: FnMut(&Deadline) -> Result<()>,
    {
        let deadline = self
            .config
            .timeout
            .map(Deadline::after)
            .unwrap_or_else(Deadline::none);
        self.status = RecoveryStatus::Running;

        let result = match self.config.strategy.clone() {
            RecoveryStrategy::FailFast => work(&deadline),
            RecoveryStrategy::ContinueOnError => {
                if let Err(err) = work(&deadline) {
                    warn!(operation, error = %err, "continuing after error");
                }
                Ok(())
            }
            RecoveryStrategy::RetryWithBackoff {
                max_attempts,
                initial_delay,
                multiplier,
                max_delay,
            } => {
                let mut delay = initial_delay;
                let mut attempt = 1;
                loop {
                    match work(&deadline) {
                        Ok(()) => break Ok(()),
                        Err(err) if !err.is_recoverable() => break Err(err),
                        Err(err) if attempt >= max_attempts.max(1) => break Err(err),
                        Err(err) => {
                            if deadline.remaining().map_or(false, |left| left <= delay) {
                                warn!(operation, attempt, "deadline reached, not retrying");
                                break Err(err);
                            }
                            warn!(
                                operation,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "retrying after error"
                            );
                            thread::sleep(delay);
                            delay = delay.mul_f64(multiplier.max(1.0)).min(max_delay);
                            attempt += 1;
                        }
                    }
                }
            }
        };

        self.status = if result.is_ok() {
            RecoveryStatus::Succeeded
        } else {
            RecoveryStatus::Failed
        };
        result
    }

    /// Restore every checkpoint in reverse order.
    ///
    /// Every restore runs even if an earlier one fails; the failures are
    /// returned together.
    pub fn rollback(&mut self) -> std::result::Result<(), ErrorList> {
        let mut errors = ErrorList::default();
        for point in self.points.iter_mut().rev() {
            if let Some(restore) = point.restore.as_mut() {
                match restore() {
                    Ok(()) => debug!(checkpoint = %point.name, "restored checkpoint"),
                    Err(err) => {
                        warn!(checkpoint = %point.name, error = %err, "restore failed");
                        errors.push(err.with_context("checkpoint", &point.name));
                    }
                }
            }
        }
        self.status = RecoveryStatus::RolledBack;
        info!(checkpoints = self.points.len(), failures = errors.len(), "rolled back");
        errors.into_result(())
    }

    /// Run every cleanup action and forget the checkpoints.
    pub fn cleanup(&mut self) -> std::result::Result<(), ErrorList> {
        let mut errors = ErrorList::default();
        for mut point in self.points.drain(..) {
            if let Some(cleanup) = point.cleanup.as_mut() {
                if let Err(err) = cleanup() {
                    warn!(checkpoint = %point.name, error = %err, "cleanup failed");
                    errors.push(err.with_context("checkpoint", &point.name));
                }
            }
        }
        errors.into_result(())
    }
}

impl Default for Recoverer {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}
