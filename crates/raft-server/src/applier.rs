//! # applier
//!
//! why: hand committed entries to the application in log order
//! relations: drains raft-core's ConsensusState through node.rs, feeds a StateMachine
//! what: StateMachine trait, LoggingStateMachine, LogApplier background task

use std::time::Duration;

use raft_core::LogEntry;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// The application fed by the log. Its interpretation of entry bytes is opaque to raft.
pub trait StateMachine: Send + 'static {
    fn apply(&mut self, index: u64, entry: &LogEntry);
}

/// Logs each entry it is handed and does nothing else
#[derive(Debug, Default)]
pub struct LoggingStateMachine;

impl StateMachine for LoggingStateMachine {
    fn apply(&mut self, index: u64, entry: &LogEntry) {
        info!(
            index,
            term = entry.term,
            data = %String::from_utf8_lossy(&entry.data),
            "consuming entry"
        );
    }
}

/// Forwards applied entries to a channel, for embedding applications and tests
impl StateMachine for mpsc::UnboundedSender<(u64, LogEntry)> {
    fn apply(&mut self, index: u64, entry: &LogEntry) {
        if self.send((index, entry.clone())).is_err() {
            debug!(index, "applied entry dropped, receiver is gone");
        }
    }
}

/// Background loop moving last_applied toward commit_index.
///
/// Each tick it asks `drain` for newly committed entries (the caller takes the
/// state lock there) and applies them outside that lock.
pub struct LogApplier {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl LogApplier {
    pub fn start<D, M>(interval: Duration, drain: D, machine: M) -> Self
    where
        D: FnMut() -> Vec<(u64, LogEntry)> + Send + 'static,
        M: StateMachine,
    {
        let (shutdown, stop) = oneshot::channel();
        let task = tokio::spawn(run(interval, drain, machine, stop));
        Self { shutdown, task }
    }

    /// Stop polling and wait for the loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            debug!(error = %err, "log applier task ended abnormally");
        }
    }
}

async fn run<D, M>(interval: Duration, mut drain: D, mut machine: M, mut stop: oneshot::Receiver<()>)
where
    D: FnMut() -> Vec<(u64, LogEntry)>,
    M: StateMachine,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?interval, "log applier ready");

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                for (index, entry) in drain() {
                    machine.apply(index, &entry);
                }
            }
        }
    }
    debug!("log applier stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn applies_batches_in_order() {
        let pending = Arc::new(Mutex::new(vec![
            (1, LogEntry::new(1, "a")),
            (2, LogEntry::new(1, "b")),
        ]));
        let source = Arc::clone(&pending);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let applier = LogApplier::start(
            Duration::from_millis(10),
            move || std::mem::take(&mut *source.lock().unwrap()),
            tx,
        );

        assert_eq!(rx.recv().await, Some((1, LogEntry::new(1, "a"))));
        assert_eq!(rx.recv().await, Some((2, LogEntry::new(1, "b"))));

        pending.lock().unwrap().push((3, LogEntry::new(2, "c")));
        assert_eq!(rx.recv().await, Some((3, LogEntry::new(2, "c"))));

        applier.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_polling() {
        let polls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&polls);
        let applier = LogApplier::start(
            Duration::from_millis(10),
            move || {
                *counter.lock().unwrap() += 1;
                Vec::new()
            },
            LoggingStateMachine,
        );

        time::sleep(Duration::from_millis(35)).await;
        applier.stop().await;
        let seen = *polls.lock().unwrap();
        assert!(seen >= 3);

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*polls.lock().unwrap(), seen);
    }
}
