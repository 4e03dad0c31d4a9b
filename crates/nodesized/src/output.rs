//! Demand and health output: one JSON object per line on stdout.

use std::io::Write;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use nodesize_core::DemandSnapshot;
use nodesize_poll::{PollHealth, PollStatus, Subscription};

#[derive(Serialize)]
struct DemandLine<'a> {
    queue: &'a str,
    sizes: &'a DemandSnapshot,
}

#[derive(Serialize)]
struct HealthLine<'a> {
    queue: &'a str,
    health: PollHealth,
    consecutive_failures: u32,
}

/// Print every snapshot the subscription receives until it closes.
pub async fn emit_demand(queue: String, mut subscription: Subscription<DemandSnapshot>) {
    while let Some(snapshot) = subscription.recv().await {
        info!(
            %queue,
            slots = snapshot.len(),
            sizes = ?snapshot.counts(),
            "demand updated"
        );
        write_line(&DemandLine {
            queue: &queue,
            sizes: &snapshot,
        });
    }
}

/// Print health transitions until the supervisor goes away.
pub async fn emit_health(queue: String, mut status: watch::Receiver<PollStatus>) {
    let mut last = status.borrow_and_update().health;

    while status.changed().await.is_ok() {
        let (health, consecutive_failures) = {
            let s = status.borrow_and_update();
            (s.health, s.consecutive_failures)
        };
        if health == last {
            continue;
        }
        last = health;
        write_line(&HealthLine {
            queue: &queue,
            health,
            consecutive_failures,
        });
    }
}

fn write_line<T: Serialize>(line: &T) {
    let mut stdout = std::io::stdout().lock();
    let result = serde_json::to_writer(&mut stdout, line)
        .map_err(std::io::Error::from)
        .and_then(|()| writeln!(stdout))
        .and_then(|()| stdout.flush());
    if let Err(e) = result {
        warn!(error = %e, "failed to write output line");
    }
}
