use std::{fmt, time};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Timestamp consisting of a seconds and a microseconds component
pub struct Timestamp {
    pub sec: libc::time_t,
    pub usec: libc::suseconds_t,
}

impl Timestamp {
    /// Returns a timestamp representation
    ///
    /// # Arguments
    ///
    /// * `sec` - Seconds
    /// * `usec` - Microseconds
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::Timestamp;
    /// let ts = Timestamp::new(5, 5);
    /// ```
    pub fn new(sec: libc::time_t, usec: libc::suseconds_t) -> Self {
        Timestamp { sec, usec }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let floating: f64 = self.sec as f64 + self.usec as f64 / 1_000_000.0;
        write!(f, "{} [s]", floating)
    }
}

impl From<libc::timeval> for Timestamp {
    fn from(tv: libc::timeval) -> Self {
        Timestamp {
            sec: tv.tv_sec,
            usec: tv.tv_usec,
        }
    }
}

impl From<Timestamp> for libc::timeval {
    fn from(ts: Timestamp) -> Self {
        libc::timeval {
            tv_sec: ts.sec,
            tv_usec: ts.usec,
        }
    }
}

impl From<Timestamp> for time::Duration {
    fn from(ts: Timestamp) -> Self {
        time::Duration::new(ts.sec.max(0) as u64, (ts.usec.max(0) as u32) * 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_duration() {
        let d: time::Duration = Timestamp::new(3, 250_000).into();
        assert_eq!(d, time::Duration::from_millis(3250));
    }
}
