use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use super::AccountService;

/// Default period between magnitude-order rebuilds.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Rebuild the magnitude ordering every `every`, starting immediately.
///
/// Failures are logged and the previous ordering stays in place until the
/// next tick. Abort the returned handle to stop.
pub fn spawn(service: Arc<AccountService>, every: Duration) -> JoinHandle<()> {
    let every = every.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = service.refresh_magnitude_order().await {
                warn!(error = %err, "magnitude refresh failed, keeping previous order");
            }
        }
    })
}
