//! Waiting for an uploaded asset to leave the `Processing` state.
//!
//! The wait is bounded three ways: a poll-count cap, an overall deadline,
//! and a caller-held [`CancellationToken`]. Running out of polls or time is
//! reported as [`TutorError::AssetWaitTimeout`], which callers can tell apart
//! from [`TutorError::AssetProcessingFailed`] (the store gave up on the file).

use super::{AssetState, RemoteAsset, VisionModel};
use crate::config::PollPolicy;
use crate::error::TutorError;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poll the file store until `asset` is active.
///
/// Returns the refreshed, active asset.
pub async fn wait_for_active(
    model: &dyn VisionModel,
    asset: RemoteAsset,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<RemoteAsset, TutorError> {
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut current = asset;
    let mut attempts: u32 = 0;

    if current.state == AssetState::Processing {
        info!(name = %current.name, "Waiting for file processing");
    }

    loop {
        match current.state.clone() {
            AssetState::Active => {
                debug!(name = %current.name, attempts, "Asset active");
                return Ok(current);
            }
            AssetState::Failed(state) => {
                warn!(name = %current.name, state = %state, "Asset processing failed");
                return Err(TutorError::AssetProcessingFailed {
                    name: current.name,
                    state,
                });
            }
            AssetState::Processing => {}
        }

        if attempts >= policy.max_attempts {
            return Err(timeout_error(current.name, attempts, start));
        }

        let delay = policy.delay_for(attempts);
        let now = Instant::now();
        if now + delay > deadline {
            return Err(timeout_error(current.name, attempts, start));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(TutorError::AssetWaitCancelled { name: current.name });
            }
            _ = sleep(delay) => {}
        }

        attempts += 1;
        current = model.get_asset(&current.name).await?;
    }
}

fn timeout_error(name: String, attempts: u32, start: Instant) -> TutorError {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    warn!(name = %name, attempts, elapsed_ms, "Gave up waiting for asset");
    TutorError::AssetWaitTimeout {
        name,
        attempts,
        elapsed_ms,
    }
}
