//! Presence broadcasting for Duet.
//!
//! Every few seconds the server tells every connected client how many
//! people are around. This crate owns the two pieces of that:
//!
//! - [`PresenceFormula`] — what "how many people" means
//! - [`PresenceTicker`] — when to say it
//!
//! # Integration
//!
//! The ticker is meant to sit in its own task, taking only a read lock on
//! the matchmaker for each broadcast:
//!
//! ```ignore
//! loop {
//!     let tick = ticker.wait_for_tick().await;
//!     let count = formula.count(matchmaker.read().await.occupancy());
//!     directory.broadcast(ServerMessage::ActiveParticipantCount { count }).await;
//! }
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use duet_match::Occupancy;
use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

/// How the broadcast participant count is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceFormula {
    /// Everyone who is waiting or chatting: `waiting + 2 × rooms`.
    #[default]
    Engaged,
    /// Only the clients currently waiting for a partner.
    Waiting,
    /// Every open connection, including idle ones.
    Connected,
}

impl PresenceFormula {
    /// Applies the formula to a snapshot of the core.
    pub fn count(self, occupancy: Occupancy) -> usize {
        match self {
            Self::Engaged => occupancy.waiting + 2 * occupancy.rooms,
            Self::Waiting => occupancy.waiting,
            Self::Connected => occupancy.connected,
        }
    }
}

impl fmt::Display for PresenceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Engaged => "engaged",
            Self::Waiting => "waiting",
            Self::Connected => "connected",
        })
    }
}

/// Returned when parsing an unknown formula name.
#[derive(Debug, thiserror::Error)]
#[error("unknown presence formula `{0}` (expected engaged, waiting or connected)")]
pub struct ParseFormulaError(String);

impl FromStr for PresenceFormula {
    type Err = ParseFormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "engaged" => Ok(Self::Engaged),
            "waiting" => Ok(Self::Waiting),
            "connected" => Ok(Self::Connected),
            _ => Err(ParseFormulaError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Presence broadcast settings.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Time between broadcasts. Default: 10 s.
    pub interval: Duration,
    /// What gets counted.
    pub formula: PresenceFormula,
    /// Random delay (0..max) added to the first broadcast so several
    /// server processes started together don't broadcast in lockstep.
    pub initial_jitter: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            formula: PresenceFormula::default(),
            initial_jitter: Duration::from_millis(500),
        }
    }
}

impl PresenceConfig {
    /// Shortest interval accepted. Anything below is clamped up.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

    /// A config with the given interval and defaults otherwise.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`PresenceTicker::new`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "presence interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Returned by [`PresenceTicker::wait_for_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTick {
    /// Monotonically increasing broadcast number (starts at 1).
    pub tick: u64,
    /// Intervals that elapsed without a broadcast because the task woke up
    /// late. Always 0 on a healthy runtime.
    pub missed: u64,
}

/// Fixed-rate timer for presence broadcasts.
///
/// Deadlines sit on a fixed grid (`start + k * interval`), so time spent
/// handling a tick does not push later ticks back. Late wake-ups never
/// cause a burst: deadlines that already passed are skipped and reported
/// in [`PresenceTick::missed`].
pub struct PresenceTicker {
    interval: Duration,
    tick_count: u64,
    next_tick: Instant,
}

impl PresenceTicker {
    /// Creates a ticker whose first tick fires after one interval plus
    /// up to `initial_jitter`.
    pub fn new(config: PresenceConfig) -> Self {
        let config = config.validated();

        let jitter_us = config.initial_jitter.as_micros() as u64;
        let jitter = if jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..jitter_us))
        } else {
            Duration::ZERO
        };

        debug!(
            interval_ms = config.interval.as_millis() as u64,
            formula = %config.formula,
            "presence ticker created"
        );

        Self {
            interval: config.interval,
            tick_count: 0,
            next_tick: Instant::now() + config.interval + jitter,
        }
    }

    /// Waits until the next broadcast is due.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// schedule untouched, so it can sit in a `tokio::select!` branch.
    pub async fn wait_for_tick(&mut self) -> PresenceTick {
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(due);
        let missed = (late_by.as_nanos() / self.interval.as_nanos()) as u64;
        if missed > 0 {
            warn!(
                tick = self.tick_count,
                missed,
                late_ms = late_by.as_millis() as u64,
                "presence broadcast late, skipping ahead"
            );
        }
        let periods = u32::try_from(missed + 1).unwrap_or(u32::MAX);
        self.next_tick = due + self.interval.saturating_mul(periods);

        trace!(tick = self.tick_count, "presence tick");
        PresenceTick {
            tick: self.tick_count,
            missed,
        }
    }

    /// Broadcasts fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The effective (validated) interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
