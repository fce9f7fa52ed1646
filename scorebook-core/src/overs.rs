//! Over/ball clock.
//!
//! Cricket scorers write overs as `3.4`: three completed overs and four legal
//! balls into the fourth. That notation is not a decimal number (`3.4` overs is
//! 22 balls, not 20.4), so [`Overs`] keeps the exact pair of completed overs and
//! legal balls in the open over, and only renders the dotted form at the
//! display and serialization boundary.
//!
//! ```
//! use scorebook_core::overs::Overs;
//!
//! let mut clock = Overs::ZERO;
//! for _ in 0..6 {
//!     clock = clock.advance(true);
//! }
//! assert_eq!(clock.to_string(), "1.0");
//! assert_eq!(clock.advance(false), clock);
//! ```

use std::{fmt, ops::Add, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Legal deliveries in one over.
pub const BALLS_PER_OVER: u8 = 6;

/// Completed overs plus legal balls bowled in the open over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Overs {
    completed: u32,
    balls: u8,
}

impl Overs {
    pub const ZERO: Self = Self {
        completed: 0,
        balls: 0,
    };

    /// Build a clock reading. Returns `None` when `balls` is not in `0..=5`.
    #[must_use]
    pub const fn new(completed: u32, balls: u8) -> Option<Self> {
        if balls < BALLS_PER_OVER {
            Some(Self { completed, balls })
        } else {
            None
        }
    }

    /// Clock reading after `total` legal balls.
    #[must_use]
    pub const fn from_balls(total: u32) -> Self {
        Self {
            completed: total / BALLS_PER_OVER as u32,
            balls: (total % BALLS_PER_OVER as u32) as u8,
        }
    }

    #[must_use]
    pub const fn completed(self) -> u32 {
        self.completed
    }

    /// Legal balls bowled in the open over (`0..=5`).
    #[must_use]
    pub const fn legal_balls_in_current_over(self) -> u8 {
        self.balls
    }

    #[must_use]
    pub const fn total_balls(self) -> u32 {
        self.completed * BALLS_PER_OVER as u32 + self.balls as u32
    }

    /// Whether a delivery of the given legality would be the sixth legal ball
    /// of the open over.
    #[must_use]
    pub const fn completes_over(self, legal: bool) -> bool {
        legal && self.balls == BALLS_PER_OVER - 1
    }

    /// Clock reading after one more delivery.
    ///
    /// Illegal deliveries leave the clock unchanged. The sixth legal ball
    /// closes the over and resets the ball count.
    #[must_use]
    pub const fn advance(self, legal: bool) -> Self {
        if !legal {
            return self;
        }
        if self.completes_over(legal) {
            Self {
                completed: self.completed + 1,
                balls: 0,
            }
        } else {
            Self {
                completed: self.completed,
                balls: self.balls + 1,
            }
        }
    }

    /// True overs as a number (`3.4` is `3 + 4/6`), for rate arithmetic.
    #[must_use]
    pub fn as_fraction(self) -> f64 {
        f64::from(self.completed) + f64::from(self.balls) / f64::from(BALLS_PER_OVER)
    }

    /// The dotted notation as a number (`3.4` is `3.4`). Display only.
    #[must_use]
    pub fn as_decimal(self) -> f64 {
        f64::from(self.completed) + f64::from(self.balls) / 10.0
    }
}

impl Add for Overs {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_balls(self.total_balls() + rhs.total_balls())
    }
}

impl fmt::Display for Overs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.completed, self.balls)
    }
}

/// Error returned when parsing an overs string such as `"12.3"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid overs `{input}`: expected `<overs>.<balls>` with balls in 0..=5")]
pub struct OversParseError {
    input: String,
}

impl FromStr for Overs {
    type Err = OversParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || OversParseError {
            input: s.to_string(),
        };
        let (completed, balls) = s.split_once('.').unwrap_or((s, "0"));
        let completed = completed.parse::<u32>().map_err(|_| err())?;
        if balls.len() != 1 {
            return Err(err());
        }
        let balls = balls.parse::<u8>().map_err(|_| err())?;
        Self::new(completed, balls).ok_or_else(err)
    }
}

impl Serialize for Overs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Overs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
