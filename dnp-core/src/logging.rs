//! Injectable logger handles on top of the `log` facade
//!
//! Every component receives a [`Logger`] at construction instead of reaching
//! for a global. A logger carries a hierarchical target such as
//! `port.west.router` and a filter mask, and forwards enabled records to the
//! `log` crate under that target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter levels, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum FilterLevel {
    Event = 0x01,
    Error = 0x02,
    Warning = 0x04,
    Info = 0x08,
    Interpret = 0x10,
    Comm = 0x20,
    Debug = 0x40,
}

impl FilterLevel {
    pub fn bit(&self) -> u8 {
        *self as u8
    }

    /// Matching `log` level
    pub fn to_log_level(&self) -> log::Level {
        match self {
            FilterLevel::Event | FilterLevel::Error => log::Level::Error,
            FilterLevel::Warning => log::Level::Warn,
            FilterLevel::Info => log::Level::Info,
            FilterLevel::Interpret | FilterLevel::Comm => log::Level::Debug,
            FilterLevel::Debug => log::Level::Trace,
        }
    }
}

/// Convert a filter level to a mask with that level and every more severe
/// level set
pub fn filter_level_to_mask(level: FilterLevel) -> u8 {
    // Levels are consecutive bits, so everything at or below the level's bit.
    let bit = level.bit();
    bit | (bit - 1)
}

/// Named logger handle
#[derive(Debug, Clone)]
pub struct Logger {
    target: String,
    mask: u8,
}

impl Logger {
    /// Create a root logger that lets through `level` and everything more severe
    pub fn new(target: impl Into<String>, level: FilterLevel) -> Self {
        Self {
            target: target.into(),
            mask: filter_level_to_mask(level),
        }
    }

    /// Derive a child logger with the same filter
    pub fn sub_logger(&self, name: &str) -> Self {
        Self {
            target: format!("{}.{}", self.target, name),
            mask: self.mask,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_level(&mut self, level: FilterLevel) {
        self.mask = filter_level_to_mask(level);
    }

    /// Check if records at `level` pass this logger's filter
    pub fn is_enabled(&self, level: FilterLevel) -> bool {
        self.mask & level.bit() != 0
    }

    pub fn log(&self, level: FilterLevel, args: fmt::Arguments<'_>) {
        if self.is_enabled(level) {
            log::log!(target: self.target.as_str(), level.to_log_level(), "{}", args);
        }
    }

    pub fn event(&self, args: fmt::Arguments<'_>) {
        self.log(FilterLevel::Event, args)
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(FilterLevel::Error, args)
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(FilterLevel::Warning, args)
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(FilterLevel::Info, args)
    }

    /// Raw traffic
    pub fn comm(&self, args: fmt::Arguments<'_>) {
        self.log(FilterLevel::Comm, args)
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(FilterLevel::Debug, args)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("dnp", FilterLevel::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_level_to_mask() {
        assert_eq!(filter_level_to_mask(FilterLevel::Event), 0x01);
        assert_eq!(filter_level_to_mask(FilterLevel::Warning), 0x07);
        assert_eq!(filter_level_to_mask(FilterLevel::Debug), 0x7F);
    }

    #[test]
    fn test_sub_logger_target_and_filter() {
        let root = Logger::new("port", FilterLevel::Info);
        let router = root.sub_logger("west").sub_logger("router");
        assert_eq!(router.target(), "port.west.router");
        assert!(router.is_enabled(FilterLevel::Error));
        assert!(router.is_enabled(FilterLevel::Info));
        assert!(!router.is_enabled(FilterLevel::Debug));
    }

    #[test]
    fn test_set_level() {
        let mut logger = Logger::default();
        logger.set_level(FilterLevel::Debug);
        assert!(logger.is_enabled(FilterLevel::Comm));
        logger.set_level(FilterLevel::Error);
        assert!(!logger.is_enabled(FilterLevel::Warning));
        assert!(logger.is_enabled(FilterLevel::Event));
    }
}
