use std::future::Future;

use chrono::{Duration as ChronoDuration, Utc};
use log::{error, info};
use tokio::time::{sleep, Duration};

/// Cooperative single-task scheduler: sleep a short tick, and when the wall
/// clock passes `next_run`, advance it by the interval and run exactly one
/// cycle to completion. Cycles never overlap; a slow cycle delays but is
/// neither skipped nor doubled. A failed cycle is logged with its error
/// chain and the loop keeps going — cycles are idempotent, so the next
/// overlapping run recovers.
pub async fn run_every<F, Fut>(label: &str, every_minutes: i64, mut cycle: F)
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let every = ChronoDuration::minutes(every_minutes);
    let mut next_run = Utc::now();
    let mut cycle_id: u64 = 0;

    info!("{} scheduled every {} minutes", label, every_minutes);

    loop {
        sleep(Duration::from_secs(1)).await;
        let now = Utc::now();
        if now <= next_run {
            continue;
        }
        next_run = now + every;
        cycle_id += 1;

        info!("{} cycle={} starting", label, cycle_id);
        match cycle(cycle_id).await {
            Ok(()) => info!("{} cycle={} finished", label, cycle_id),
            Err(e) => error!("{} cycle={} failed: {:#}", label, cycle_id, e),
        }
    }
}
