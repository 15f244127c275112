//! Historical price series types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PriceGateError, Result};

/// A price at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub price: f64,
}

/// Supported client-requested history ranges, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HistoryRange {
    Week,
    Month,
    Quarter,
    Year,
}

impl HistoryRange {
    /// All supported ranges, shortest first.
    pub const ALL: [HistoryRange; 4] = [Self::Week, Self::Month, Self::Quarter, Self::Year];

    pub fn days(self) -> u32 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
        }
    }

    pub fn from_days(days: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.days() == days)
            .ok_or_else(|| {
                PriceGateError::InvalidInput(format!(
                    "unsupported days value: {days} (supported: 7, 30, 90, 365)"
                ))
            })
    }
}

impl FromStr for HistoryRange {
    type Err = PriceGateError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PriceGateError::InvalidInput("days cannot be empty".into()));
        }
        let days: u32 = trimmed
            .parse()
            .map_err(|_| PriceGateError::InvalidInput(format!("unsupported days value: {trimmed}")))?;
        Self::from_days(days)
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.days())
    }
}

impl Serialize for HistoryRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.days())
    }
}

impl<'de> Deserialize<'de> for HistoryRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let days = u32::deserialize(deserializer)?;
        HistoryRange::from_days(days).map_err(serde::de::Error::custom)
    }
}

/// Point spacing of a history series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Hourly,
    Daily,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }

    /// Parse an optional client-supplied interval. Blank means "no preference".
    pub fn parse_optional(s: Option<&str>) -> Result<Option<Self>> {
        match s.map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some),
        }
    }
}

impl FromStr for Resolution {
    type Err = PriceGateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            other => Err(PriceGateError::InvalidInput(format!(
                "unsupported interval: {other}"
            ))),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A price history series for one identifier.
///
/// `prices` is ordered ascending by timestamp and replaced as a whole on
/// refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub id: String,
    pub days: HistoryRange,
    pub interval: Resolution,
    pub prices: Vec<HistoryPoint>,
    pub timestamp: i64,
    pub cached: bool,
}
