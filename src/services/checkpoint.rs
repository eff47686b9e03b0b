/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */


//! Background checkpointer
//!
//! Takes a checkpoint when the interval elapses or when the coordinator asks
//! for one after `checkpoint_every_inserts` inserts, whichever comes first.
//! Ticks that find no new inserts and a healthy backing store are skipped.
//! The disk work runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::services::search_coordinator::SearchCoordinator;

/// Handle to the running checkpoint task.
pub struct Checkpointer {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Checkpointer {
    /// Spawn the task. A zero `interval` disables the timer; insert-count
    /// requests are still honored.
    pub fn spawn(coordinator: Arc<SearchCoordinator>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let ticker = (!interval.is_zero()).then(|| {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!("Checkpointer started (interval {:?})", interval);
        let task = tokio::spawn(run(coordinator, ticker, stop_rx));
        Self {
            stop: Some(stop_tx),
            task,
        }
    }

    /// Stop the task and wait for an in-flight checkpoint to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("Checkpointer task ended abnormally: {}", e);
        }
        info!("Checkpointer stopped");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run(
    coordinator: Arc<SearchCoordinator>,
    mut ticker: Option<Interval>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let reason = tokio::select! {
            _ = &mut stop => break,
            _ = next_tick(&mut ticker) => "interval",
            _ = coordinator.checkpoint_requested() => "insert threshold",
        };

        debug!("Checkpoint triggered by {}", reason);
        let engine = Arc::clone(&coordinator);
        match tokio::task::spawn_blocking(move || engine.checkpoint_if_dirty()).await {
            Ok(Ok(Some(written))) => debug!("Checkpoint ({}) wrote {} items", reason, written),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => error!("Checkpoint ({}) failed: {}", reason, e),
            Err(e) => error!("Checkpoint task panicked: {}", e),
        }
    }
}
