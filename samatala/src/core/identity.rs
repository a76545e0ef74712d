//! Run identity: the key every artifact path is derived from.
//!
//! A run is identified by the initial pile height and the push sequence label.
//! Pile heights are quantized to micrometres on construction, so two identities
//! compare equal exactly when their six-decimal path components are equal.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Micro-units per meter.
const MICROS_PER_METER: f64 = 1_000_000.0;

/// Largest accepted pile height magnitude (meters).
const MAX_PILE_HEIGHT: f64 = 1.0e9;

/// Pile height in meters, quantized to 1e-6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PileHeight {
    micros: i64,
}

impl PileHeight {
    /// Create from a value in meters.
    pub fn new(meters: f64) -> Result<Self> {
        if !meters.is_finite() || meters.abs() > MAX_PILE_HEIGHT {
            return Err(Error::Config(format!("invalid pile height: {}", meters)));
        }
        Ok(Self {
            micros: (meters * MICROS_PER_METER).round() as i64,
        })
    }

    /// Create directly from micro-units.
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }

    pub fn meters(&self) -> f64 {
        self.micros as f64 / MICROS_PER_METER
    }

    /// Shortest round-trip representation ("0.37", "1.0").
    ///
    /// Used where the surrounding tooling names files by the plain float,
    /// e.g. initial height maps and simulator arguments.
    pub fn repr(&self) -> String {
        format!("{:?}", self.meters())
    }
}

impl Default for PileHeight {
    fn default() -> Self {
        Self::from_micros(370_000)
    }
}

/// Six fixed decimals, computed on the integer value so it never rounds.
impl fmt::Display for PileHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.micros < 0 { "-" } else { "" };
        let abs = self.micros.unsigned_abs();
        write!(f, "{}{}.{:06}", sign, abs / 1_000_000, abs % 1_000_000)
    }
}

/// Parsing is exact: text with more than six decimals is rejected rather
/// than quantized, so `repr()` names the same value the user typed.
impl FromStr for PileHeight {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let meters: f64 = s
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid pile height: {:?}", s)))?;
        let height = Self::new(meters)?;
        if height.meters() != meters {
            return Err(Error::Config(format!(
                "pile height {:?} has more than 6 decimals",
                s.trim()
            )));
        }
        Ok(height)
    }
}

/// Push sequence label ("firstpush", "secondpush").
///
/// Labels are restricted to `[A-Za-z0-9_-]` so they can never introduce a
/// path separator into an artifact name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushSequence(String);

impl PushSequence {
    pub const FIRST: &'static str = "firstpush";
    pub const SECOND: &'static str = "secondpush";

    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let valid = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::Config(format!(
                "invalid push sequence label: {:?}",
                label
            )));
        }
        Ok(Self(label))
    }

    pub fn first() -> Self {
        Self(Self::FIRST.to_string())
    }

    pub fn second() -> Self {
        Self(Self::SECOND.to_string())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PushSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one pipeline stage: (pile height, push sequence).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunIdentity {
    pub pile_height: PileHeight,
    pub push: PushSequence,
}

impl RunIdentity {
    pub fn new(pile_height: PileHeight, push: PushSequence) -> Self {
        Self { pile_height, push }
    }

    /// Same pile, different push.
    pub fn with_push(&self, push: PushSequence) -> Self {
        Self {
            pile_height: self.pile_height,
            push,
        }
    }

    /// `<pile:.6>_<label>`, the stem shared by every artifact of this identity.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.pile_height, self.push)
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pile_height, self.push)
    }
}
