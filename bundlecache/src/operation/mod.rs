//! Pollable long-running operations.
//!
//! Every operation is a step function advanced once per tick by the
//! scheduling thread. Callers either poll it from their own loop, block on
//! [`wait_for_completion`], or await [`drive_to_completion`].

mod driver;

pub use driver::{drive_to_completion, wait_for_completion, DEFAULT_TICK_INTERVAL};

use crate::fs::CacheFileSystem;

/// Externally visible state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    None,
    Processing,
    Succeed,
    Failed,
}

impl OperationStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, OperationStatus::Succeed | OperationStatus::Failed)
    }
}

/// A step function driven by the file system's tick.
pub trait Operation {
    /// Advance by one step.
    fn update(&mut self, fs: &mut CacheFileSystem);

    fn status(&self) -> OperationStatus;

    /// Failure reason once the status is `Failed`.
    fn error(&self) -> Option<&str>;

    /// Completion ratio in `0.0..=1.0`.
    fn progress(&self) -> f32 {
        if self.status() == OperationStatus::Succeed {
            1.0
        } else {
            0.0
        }
    }

    fn is_done(&self) -> bool {
        self.status().is_done()
    }

    /// Stop the operation, releasing anything it holds.
    fn abort(&mut self, fs: &mut CacheFileSystem);
}

/// Status and error shared by the concrete operations.
#[derive(Debug, Clone, Default)]
pub(crate) struct OperationState {
    pub status: OperationStatus,
    pub error: Option<String>,
}

impl OperationState {
    pub fn processing(&mut self) {
        if self.status == OperationStatus::None {
            self.status = OperationStatus::Processing;
        }
    }

    pub fn succeed(&mut self) {
        self.status = OperationStatus::Succeed;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = OperationStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
