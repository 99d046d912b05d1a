use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{NaiveDateTime, TimeZone, Utc};
use tracing::{debug, trace};

/// Reference cadence for re-sampling "now".
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

/// Wall-clock reader for `zone`.
pub fn zone_clock<Z>(zone: Z) -> impl Fn() -> NaiveDateTime + Send + 'static
where
    Z: TimeZone + Send + 'static,
{
    move || Utc::now().with_timezone(&zone).naive_local()
}

/// Background timer that re-samples the clock on a fixed period.
///
/// The callback runs once right away and then every `period` on the
/// ticker's own thread. Stopping (or dropping) the ticker ends the
/// thread and waits for it.
pub struct IndicatorTicker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl IndicatorTicker {
    pub fn spawn<C, F>(period: Duration, clock: C, mut on_tick: F) -> Self
    where
        C: Fn() -> NaiveDateTime + Send + 'static,
        F: FnMut(NaiveDateTime) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            debug!(period_ms = period.as_millis() as u64, "indicator ticker started");
            on_tick(clock());
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        let now = clock();
                        trace!(%now, "indicator tick");
                        on_tick(now);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("indicator ticker stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("indicator ticker thread panicked");
        }
    }
}

impl Drop for IndicatorTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use chrono::{NaiveDate, NaiveDateTime};

    use super::{IndicatorTicker, zone_clock};

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .expect("valid date")
            .and_hms_opt(14, 30, 0)
            .expect("valid time")
    }

    #[test]
    fn ticks_immediately_then_periodically() {
        let (tx, rx) = mpsc::channel();
        let ticker = IndicatorTicker::spawn(Duration::from_millis(5), fixed_now, move |now| {
            let _ = tx.send(now);
        });

        for _ in 0..3 {
            let sampled = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("tick delivered");
            assert_eq!(sampled, fixed_now());
        }
        ticker.stop();
    }

    #[test]
    fn dropping_stops_the_thread() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let ticker = IndicatorTicker::spawn(Duration::from_secs(3600), fixed_now, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        drop(ticker);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&count), 1);
    }

    #[test]
    fn zone_clock_reads_wall_time() {
        let clock = zone_clock(chrono_tz::UTC);
        let now = chrono::Utc::now().naive_utc();
        let sampled = clock();
        assert!((sampled - now).num_seconds().abs() < 5);
    }
}
