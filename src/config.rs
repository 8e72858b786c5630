//! Runtime options
//!
//! Options are read once by the host and carried to every operation through
//! [`crate::session::SessionContext`]. Every field has a default, so an
//! empty JSON object is a valid configuration.

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as, skip_serializing_none};
use thiserror::Error;
use web_time::Duration;

use crate::{
    constants::{join_code, timer},
    participant::StudentId,
};

type ValidationResult = garde::Result;

fn validate_tick_interval(value: &Duration, _: &()) -> ValidationResult {
    let millis = value.as_millis();
    if (u128::from(timer::MIN_TICK_INTERVAL)..=u128::from(timer::MAX_TICK_INTERVAL))
        .contains(&millis)
    {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "outside of bounds [{},{}] milliseconds",
            timer::MIN_TICK_INTERVAL,
            timer::MAX_TICK_INTERVAL
        )))
    }
}

/// Tunable behaviour of teacher and student sessions
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// How often student clients recompute the countdown
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[garde(custom(validate_tick_interval))]
    pub tick_interval: Duration,

    /// How many random join codes to try before giving up on publish
    #[garde(range(min = 1, max = crate::constants::join_code::MAX_ATTEMPTS))]
    pub code_attempts: usize,

    /// Seed for question shuffles and join codes, random when absent
    #[garde(skip)]
    pub shuffle_seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(timer::DEFAULT_TICK_INTERVAL),
            code_attempts: join_code::DEFAULT_ATTEMPTS,
            shuffle_seed: None,
        }
    }
}

/// Errors raised while loading options
#[derive(Error, Debug)]
pub enum Error {
    /// The input is not valid JSON for `Options`
    #[error("cannot parse options: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range
    #[error("invalid options: {0}")]
    Invalid(#[from] garde::Report),
}

impl Options {
    /// Parses and validates options from JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` for malformed input and `Error::Invalid` when a
    /// value is out of range.
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let options: Self = serde_json::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    /// A generator for join codes
    pub fn code_rng(&self) -> fastrand::Rng {
        self.shuffle_seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed)
    }

    /// A generator for `student`'s question order
    ///
    /// With a seed configured the order depends only on the seed and the
    /// student, so reruns reproduce it.
    pub fn shuffler_for(&self, student: StudentId) -> fastrand::Rng {
        self.shuffle_seed.map_or_else(fastrand::Rng::new, |seed| {
            fastrand::Rng::with_seed(seed ^ student.seed())
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::order::QuestionOrder;

    #[test]
    fn test_options_defaults() {
        let options = Options::from_json("{}").unwrap();
        assert_eq!(options, Options::default());
        assert_eq!(options.tick_interval, Duration::from_secs(1));
        assert_eq!(options.code_attempts, 16);
        assert_eq!(options.shuffle_seed, None);
    }

    #[test]
    fn test_options_wire_names() {
        let options =
            Options::from_json(r#"{ "tickInterval": 250, "codeAttempts": 4, "shuffleSeed": 9 }"#)
                .unwrap();
        assert_eq!(options.tick_interval, Duration::from_millis(250));
        assert_eq!(options.code_attempts, 4);
        assert_eq!(options.shuffle_seed, Some(9));
    }

    #[test]
    fn test_options_out_of_range() {
        assert!(matches!(
            Options::from_json(r#"{ "tickInterval": 50 }"#),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{ "codeAttempts": 0 }"#),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            Options::from_json(r#"{ "codeAttempts": 65 }"#),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_options_malformed() {
        assert!(matches!(
            Options::from_json(r#"{ "tickInterval": "fast" }"#),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_options_seeded_shuffles() {
        let options = Options {
            shuffle_seed: Some(11),
            ..Options::default()
        };
        let student = StudentId::new();
        let a = QuestionOrder::generate(12, &mut options.shuffler_for(student));
        let b = QuestionOrder::generate(12, &mut options.shuffler_for(student));
        assert_eq!(a, b);
    }
}
