use std::{
    ops::{Add, Div, Sub},
    str::FromStr,
};

/// a count of kernel clock ticks.
///
/// `/proc/stat` reports cpu time in units of `USER_HZ`, usually 100Hz. only ratios between
/// counters matter here, so the tick frequency itself is never needed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UserHz(u64);

// === impl UserHz ===

impl UserHz {
    pub const ZERO: Self = Self(0);

    #[cfg(test)]
    pub(crate) const fn new(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl FromStr for UserHz {
    type Err = <u64 as FromStr>::Err;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Add for UserHz {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        let (Self(lhs), Self(rhs)) = (self, rhs);
        Self(lhs.saturating_add(rhs))
    }
}

/// NB: counters such as iowait may go backwards; a regression reads as zero ticks.
impl Sub for UserHz {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        let (Self(lhs), Self(rhs)) = (self, rhs);
        Self(lhs.saturating_sub(rhs))
    }
}

impl Div for UserHz {
    type Output = f64;
    fn div(self, rhs: Self) -> Self::Output {
        let to_float = |Self(hz)| -> f64 { hz as f64 };
        let (lhs, rhs) = (to_float(self), to_float(rhs));

        lhs / rhs
    }
}
