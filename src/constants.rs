//! Configuration constants for the live test system
//!
//! This module contains the limits and constraints used throughout the
//! crate to ensure data integrity and provide consistent boundaries for
//! authored tests, join codes, student names and timers.

/// Test-level limits
pub mod quiz {
    /// Maximum length of a test title in characters
    pub const MAX_TITLE_LENGTH: usize = 200;
    /// Maximum number of questions in a single test
    pub const MAX_QUESTION_COUNT: usize = 200;
    /// Shortest allowed test duration in minutes
    pub const MIN_DURATION_MINUTES: u32 = 1;
    /// Longest allowed test duration in minutes (one day)
    pub const MAX_DURATION_MINUTES: u32 = 24 * 60;
}

/// Question-level limits
pub mod question {
    /// Maximum length of the question text
    pub const MAX_TEXT_LENGTH: usize = 500;
    /// Minimum number of options a question must offer
    pub const MIN_OPTION_COUNT: usize = 2;
    /// Maximum number of options a question may offer
    pub const MAX_OPTION_COUNT: usize = 20;
    /// Maximum length of a single option label
    pub const MAX_OPTION_LENGTH: usize = 200;
}

/// Join code limits
pub mod join_code {
    /// Smallest join code (the first 6-digit number)
    pub const MIN_VALUE: u32 = 100_000;
    /// One past the largest join code
    pub const MAX_VALUE: u32 = 1_000_000;
    /// Number of digits in a join code
    pub const DIGITS: usize = 6;
    /// Default number of attempts to find an unused code
    pub const DEFAULT_ATTEMPTS: usize = 16;
    /// Upper bound for configured attempts
    pub const MAX_ATTEMPTS: usize = 64;
}

/// Student limits
pub mod student {
    /// Maximum length of a display name
    pub const MAX_NAME_LENGTH: usize = 30;
}

/// Countdown polling limits, in milliseconds
pub mod timer {
    /// Default interval between countdown ticks
    pub const DEFAULT_TICK_INTERVAL: u64 = 1000;
    /// Fastest allowed tick interval
    pub const MIN_TICK_INTERVAL: u64 = 100;
    /// Slowest allowed tick interval
    pub const MAX_TICK_INTERVAL: u64 = 10_000;
}
