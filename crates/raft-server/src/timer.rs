//! # timer
//!
//! why: notice when no leader or candidate has been heard from for too long
//! relations: reset by node.rs after granted votes and accepted appends, fires into state.rs's timeout hook
//! what: ElectionTimer, a randomized alarm run as a small actor task

use std::time::Duration;

use rand::Rng;
use raft_core::RaftConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

enum Command {
    Reset,
    Stop,
}

/// Election alarm.
///
/// Reset, stop and expiry are all handled by a single task, so a reset can never
/// interleave with a firing callback. The duration is redrawn from
/// `[min, max]` on construction, on every reset and whenever the callback asks
/// to be re-armed by returning `true`; otherwise the timer stays disarmed until
/// the next reset.
pub struct ElectionTimer {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ElectionTimer {
    /// Arm a timer with a duration drawn from the configured range
    pub fn start<F>(config: &RaftConfig, on_expire: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let range = TimeoutRange {
            min: config.election_timeout_min,
            max: config.election_timeout_max,
        };
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(range, receiver, on_expire));
        Self { commands, task }
    }

    /// Cancel the pending alarm and schedule a fresh one
    pub fn reset(&self) {
        // a stopped timer has nothing left to reset
        let _ = self.commands.send(Command::Reset);
    }

    /// Cancel the pending alarm and wait for the timer task to finish
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop);
        if let Err(err) = self.task.await {
            debug!(error = %err, "election timer task ended abnormally");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TimeoutRange {
    min: u64,
    max: u64,
}

impl TimeoutRange {
    fn draw(&self) -> Duration {
        let millis = rand::thread_rng().gen_range(self.min..=self.max.max(self.min));
        Duration::from_millis(millis)
    }
}

async fn run<F>(range: TimeoutRange, mut commands: mpsc::UnboundedReceiver<Command>, mut on_expire: F)
where
    F: FnMut() -> bool,
{
    let mut deadline = Some(Instant::now() + range.draw());

    loop {
        let alarm = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Reset) => {
                    let timeout = range.draw();
                    trace!(?timeout, "election timer reset");
                    deadline = Some(Instant::now() + timeout);
                }
                Some(Command::Stop) | None => break,
            },
            _ = alarm => {
                deadline = if on_expire() {
                    let timeout = range.draw();
                    trace!(?timeout, "election timer re-armed after expiry");
                    Some(Instant::now() + timeout)
                } else {
                    None
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fixed(ms: u64) -> RaftConfig {
        RaftConfig {
            election_timeout_min: ms,
            election_timeout_max: ms,
            ..RaftConfig::default()
        }
    }

    fn counting_timer(config: &RaftConfig, rearm: bool) -> (ElectionTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = ElectionTimer::start(config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            rearm
        });
        (timer, fired)
    }

    #[test]
    fn draw_stays_in_range() {
        let range = TimeoutRange { min: 150, max: 300 };
        for _ in 0..200 {
            let d = range.draw();
            assert!(d >= Duration::from_millis(150) && d <= Duration::from_millis(300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_timeout() {
        let (timer, fired) = counting_timer(&fixed(100), false);

        time::sleep(Duration::from_millis(90)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // one-shot: stays quiet until reset
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        timer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_defers_expiry() {
        let (timer, fired) = counting_timer(&fixed(100), false);

        time::sleep(Duration::from_millis(60)).await;
        timer.reset();
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        timer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reset_rearms_after_firing() {
        let (timer, fired) = counting_timer(&fixed(50), false);

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        timer.reset();
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        timer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn callback_can_keep_the_alarm_armed() {
        let (timer, fired) = counting_timer(&fixed(50), true);

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // no reset in between
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        timer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_alarm() {
        let (timer, fired) = counting_timer(&fixed(100), false);

        timer.stop().await;
        time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
