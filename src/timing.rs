//! Job timing and date/time formatting.

use std::time::{Duration, Instant};

use chrono::Local;

/// A cumulative wall-clock timer for the controller's job accounting.
///
/// Time accumulates across start/stop cycles until [`reset`](JobTimer::reset);
/// the total can be read while the timer is running.
#[derive(Debug)]
pub struct JobTimer {
    running: bool,
    total: Duration,
    interval_start: Option<Instant>,
    interval: Duration,
}

impl JobTimer {
    pub fn new(start_now: bool) -> Self {
        let mut timer = Self {
            running: false,
            total: Duration::ZERO,
            interval_start: None,
            interval: Duration::ZERO,
        };
        if start_now {
            timer.start();
        }
        timer
    }

    /// Sets the accumulated time back to zero and stops the timer.
    pub fn reset(&mut self) {
        self.running = false;
        self.total = Duration::ZERO;
        self.interval_start = None;
        self.interval = Duration::ZERO;
    }

    pub fn start(&mut self) {
        if !self.running {
            self.interval_start = Some(Instant::now());
            self.running = true;
        }
    }

    /// Stops the timer and returns the accumulated total.
    pub fn stop(&mut self) -> Duration {
        if self.running {
            self.update();
            self.running = false;
        }
        self.total
    }

    /// Reads the accumulated total without stopping the timer.
    pub fn read(&mut self) -> Duration {
        self.update();
        self.total
    }

    /// Reads the time elapsed in the most recent interval.
    pub fn read_interval(&mut self) -> Duration {
        self.update();
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn update(&mut self) {
        if self.running {
            let now = Instant::now();
            if let Some(interval_start) = self.interval_start {
                self.interval = now - interval_start;
                self.total += self.interval;
            }
            self.interval_start = Some(now);
        }
    }
}

/// The local date as `YYYY/MM/DD`.
pub fn date_str() -> String {
    Local::now().format("%Y/%m/%d").to_string()
}

/// The local time as `HH:MM:SS` on a 24-hour clock.
pub fn time_str() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// A date-time stamp suitable for file names: `YYYY-MM-DD_HH-MM-SS`.
pub fn date_time_stamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// The stamp prefix carried by every log line: `YYYY-MM-DD_HH-MM-SS: `.
pub(crate) fn timestamp_prefix() -> String {
    let mut prefix = date_time_stamp();
    prefix.push_str(": ");
    prefix
}

/// The local date with `-` separators, for log file names.
pub(crate) fn date_stamp() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// The local time with `-` separators, for log file names.
pub(crate) fn time_stamp() -> String {
    Local::now().format("%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn timer_accumulates_across_intervals() {
        let mut timer = JobTimer::new(false);
        assert!(!timer.is_running());
        timer.start();
        thread::sleep(Duration::from_millis(10));
        let first = timer.stop();
        assert!(first >= Duration::from_millis(10));
        timer.start();
        thread::sleep(Duration::from_millis(10));
        let second = timer.stop();
        assert!(second > first);
        timer.reset();
        assert_eq!(timer.read(), Duration::ZERO);
    }

    #[test]
    fn stamp_shapes() {
        let stamp = date_time_stamp();
        assert_eq!(stamp.len(), 19);
        assert_eq!(&stamp[10..11], "_");
        let prefix = timestamp_prefix();
        assert!(prefix.ends_with(": "));
    }
}
