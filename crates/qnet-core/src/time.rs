//! Simulated time
//!
//! The scheduler's clock is carried as integer picoseconds so that event
//! ordering is total and free of floating-point ties.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

const PICOS_PER_SEC: f64 = 1e12;

/// Point in simulated time, picoseconds since simulation start
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(pub i64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(i64::MAX);

    #[inline]
    pub fn from_picos(picos: i64) -> Self {
        SimTime(picos)
    }

    #[inline]
    pub fn from_nanos(nanos: i64) -> Self {
        SimTime(nanos.saturating_mul(1_000))
    }

    #[inline]
    pub fn from_micros(micros: i64) -> Self {
        SimTime(micros.saturating_mul(1_000_000))
    }

    #[inline]
    pub fn from_secs(secs: i64) -> Self {
        SimTime(secs.saturating_mul(1_000_000_000_000))
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        SimTime((secs * PICOS_PER_SEC).round() as i64)
    }

    #[inline]
    pub fn as_picos(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / PICOS_PER_SEC
    }

    #[inline]
    pub fn saturating_add(self, rhs: SimTime) -> Self {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    #[inline]
    fn add(self, rhs: SimTime) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    #[inline]
    fn sub(self, rhs: SimTime) -> Self::Output {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t({}s)", self.as_secs_f64())
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_secs_f64())
    }
}
