use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error};

use crate::maven_errors::MavenError;

/// Wait until `probe` answers `true`, checking every `interval`, for at most `timeout`.
///
/// The probe is called once immediately, then after each interval. It is not called again
/// once the deadline has passed.
///
/// Arguments
/// ---------
/// * `probe`: readiness test, typically "can the transform be computed for this instant"
/// * `timeout`: maximum time spent waiting, measured from the first probe
/// * `interval`: delay between two probes
///
/// Return
/// ------
/// * `Ok(())` once ready, [`MavenError::FrameTransformTimeout`] otherwise
pub async fn wait_until_ready<F>(
    mut probe: F,
    timeout: Duration,
    interval: Duration,
) -> Result<(), MavenError>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempts = 0_usize;

    loop {
        attempts += 1;
        if probe() {
            debug!(attempts, elapsed = ?start.elapsed(), "frame transform ready");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            let elapsed_sec = (now - start).as_secs_f64();
            error!(attempts, elapsed_sec, "frame transform data never became ready");
            return Err(MavenError::FrameTransformTimeout { elapsed_sec });
        }
        sleep(interval.min(deadline - now)).await;
    }
}
