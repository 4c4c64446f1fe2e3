//! Blocking and async drivers for operations.

use std::thread;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Operation, OperationStatus};
use crate::fs::CacheFileSystem;

/// Default interval between ticks of the async driver.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Pause between ticks of the blocking driver.
const BUSY_WAIT_SLEEP: Duration = Duration::from_millis(1);

/// Tick the file system and the operation until it finishes.
///
/// Blocks the calling thread, sleeping 1ms between ticks.
pub fn wait_for_completion<O>(fs: &mut CacheFileSystem, op: &mut O) -> OperationStatus
where
    O: Operation + ?Sized,
{
    loop {
        fs.update();
        op.update(fs);
        if op.is_done() {
            return op.status();
        }
        thread::sleep(BUSY_WAIT_SLEEP);
    }
}

/// Async counterpart of [`wait_for_completion`].
///
/// Ticks on a tokio interval; when `cancel` fires the operation is aborted
/// and its final status returned.
pub async fn drive_to_completion<O>(
    fs: &mut CacheFileSystem,
    op: &mut O,
    tick: Duration,
    cancel: &CancellationToken,
) -> OperationStatus
where
    O: Operation + ?Sized,
{
    let mut ticker = time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        fs.update();
        op.update(fs);
        if op.is_done() {
            return op.status();
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                op.abort(fs);
                return op.status();
            }
            _ = ticker.tick() => {}
        }
    }
}
