use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Trailing aggregation window.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum Window {
    #[serde(rename = "1m")]
    #[strum(serialize = "1m")]
    OneMinute,
    #[default]
    #[serde(rename = "5m")]
    #[strum(serialize = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    #[strum(serialize = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    OneHour,
}

impl Window {
    pub fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    pub fn seconds(self) -> u64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::OneHour => 3_600,
        }
    }

    pub fn millis(self) -> i64 {
        match self {
            Self::OneMinute => 60_000,
            Self::FiveMinutes => 300_000,
            Self::FifteenMinutes => 900_000,
            Self::OneHour => 3_600_000,
        }
    }
}

/// CIDR prefix length at which source addresses are grouped.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
pub enum SubnetLevel {
    #[serde(rename = "/8")]
    #[strum(serialize = "/8")]
    Slash8,
    #[default]
    #[serde(rename = "/16")]
    #[strum(serialize = "/16")]
    Slash16,
    #[serde(rename = "/24")]
    #[strum(serialize = "/24")]
    Slash24,
}

impl SubnetLevel {
    pub fn prefix_len(self) -> u8 {
        match self {
            Self::Slash8 => 8,
            Self::Slash16 => 16,
            Self::Slash24 => 24,
        }
    }

    /// The next coarser level, `None` at `/8`.
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Slash8 => None,
            Self::Slash16 => Some(Self::Slash8),
            Self::Slash24 => Some(Self::Slash16),
        }
    }

    pub fn from_prefix_len(len: u8) -> Option<Self> {
        match len {
            8 => Some(Self::Slash8),
            16 => Some(Self::Slash16),
            24 => Some(Self::Slash24),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn window_round_trips_through_strings() {
        assert_eq!(Window::from_str("15m").unwrap(), Window::FifteenMinutes);
        assert_eq!(Window::OneHour.to_string(), "1h");
        assert!(Window::from_str("2m").is_err());
        assert_eq!(Window::OneMinute.millis(), 60_000);
    }

    #[test]
    fn subnet_level_parents() {
        assert_eq!(SubnetLevel::Slash24.parent(), Some(SubnetLevel::Slash16));
        assert_eq!(SubnetLevel::Slash16.parent(), Some(SubnetLevel::Slash8));
        assert_eq!(SubnetLevel::Slash8.parent(), None);
        assert_eq!(SubnetLevel::from_str("/24").unwrap(), SubnetLevel::Slash24);
        assert!(SubnetLevel::from_str("/12").is_err());
    }

    #[test]
    fn defaults_are_five_minutes_and_slash16() {
        assert_eq!(Window::default(), Window::FiveMinutes);
        assert_eq!(SubnetLevel::default(), SubnetLevel::Slash16);
        assert_eq!(serde_json::to_string(&SubnetLevel::Slash16).unwrap(), "\"/16\"");
    }
}
