//! Bounded retry for provider writes.
//!
//! Only add/remove calls go through this; index reads degrade to empty
//! snapshots instead (see [`crate::snapshot::build_snapshot`]).

use std::time::Duration;

use crate::error::EngineError;

const ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Run `op` up to three times with exponential backoff (500ms, 1s). The last
/// error is returned as-is.
pub fn with_retry<T, F>(what: &str, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Result<T, EngineError>,
{
    let mut last = None;
    for attempt in 0..ATTEMPTS {
        if attempt > 0 {
            let delay = BASE_DELAY * 2u32.pow(attempt - 1);
            log::debug!("retrying {what} (attempt {}) after {delay:?}", attempt + 1);
            std::thread::sleep(delay);
        }
        match op() {
            Ok(v) => return Ok(v),
            Err(e) => {
                log::warn!("{what} failed on attempt {}: {e}", attempt + 1);
                last = Some(e);
            }
        }
    }
    // Loop always ran at least once, so `last` is populated here.
    Err(last.unwrap_or_else(|| unreachable!()))
}
