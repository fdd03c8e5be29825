use std::time::Duration;

use rlimit::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Descriptors a single validation may hold: the HEAD socket and three probe pipes
const FDS_PER_VALIDATION: u64 = 4;

/// Warns when parallel probes could run into the open file limit
pub fn warn_ulimit(parallelism: usize) {
    let Ok((limit, _)) = rlimit::getrlimit(Resource::NOFILE) else {
        return;
    };

    let needed = (parallelism as u64).saturating_mul(FDS_PER_VALIDATION) + 64;
    if limit < needed {
        warn!(
            "Your file limit ({limit}) is very low for {parallelism} parallel validations. Consider lowering parallelism or raising your file limit via `ulimit -n {needed}`"
        );
    }
}

/// Spawn a task that watches for CTRL + C signal and cancels a [`CancellationToken`] when caught
pub fn spawn_ct_watcher(ct: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Caught CTRL+C signal!");
                ct.cancel();
            }
            () = ct.cancelled() => {}
        }
    });
}

/// Spawn a task that cancels a [`CancellationToken`] once `after` has elapsed
pub fn spawn_deadline(ct: CancellationToken, after: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(after) => {
                info!("Run timeout of {after:?} reached!");
                ct.cancel();
            }
            () = ct.cancelled() => {}
        }
    });
}
