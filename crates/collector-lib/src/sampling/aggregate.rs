//! Folding of collected tag values into a bounded sequence
//!
//! Values are visited services-first (configuration order), then tag sets in
//! arrival order, then tags in ascending key order. That order decides which
//! fractional values form a run, so it must not depend on hashing.
//!
//! Integer values pass through unchanged. Consecutive fractional values are
//! replaced by their average, emitted when the next integer arrives or when
//! the input ends.

use super::window::SamplingContext;
use crate::models::{AggregatedSequence, SampleValue};

/// Maximum number of elements in an aggregated sequence
pub const MAX_SEQUENCE_LEN: usize = 1000;

/// Fractional digits kept when rounding parsed values and averages
pub const ROUND_DIGITS: usize = 14;

// 2^63 as f64; integer-valued floats at or beyond this do not fit in i64
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Round to `ROUND_DIGITS` fractional digits using correctly rounded decimal
/// formatting.
pub fn round_fraction(value: f64) -> f64 {
    format!("{:.*}", ROUND_DIGITS, value)
        .parse()
        .unwrap_or(value)
}

/// Parse and classify one raw tag value
///
/// Returns `None` for non-numeric or non-finite input and for integer values
/// outside the `i64` range.
pub fn classify(raw: &str) -> Option<SampleValue> {
    let parsed: f64 = raw.trim().parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }

    let rounded = round_fraction(parsed);
    if rounded.fract() != 0.0 {
        return Some(SampleValue::Fractional(rounded));
    }

    if (-I64_BOUND..I64_BOUND).contains(&rounded) {
        Some(SampleValue::Integer(rounded as i64))
    } else {
        None
    }
}

/// Folds sampled tag values into an [`AggregatedSequence`]
#[derive(Debug, Clone)]
pub struct Aggregator {
    max_len: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            max_len: MAX_SEQUENCE_LEN,
        }
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the sequence length cap
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Aggregate every tag value collected in `context`
    pub fn aggregate(&self, context: &SamplingContext) -> AggregatedSequence {
        self.aggregate_raw(raw_values(context))
    }

    /// Classify, fold and truncate raw values given in traversal order
    pub fn aggregate_raw<'a, I>(&self, raw: I) -> AggregatedSequence
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut folded = fold(raw.into_iter().filter_map(classify));
        folded.truncate(self.max_len);
        AggregatedSequence::new(folded)
    }
}

/// Collapse runs of fractional values into their averages
pub fn fold<I>(values: I) -> Vec<SampleValue>
where
    I: IntoIterator<Item = SampleValue>,
{
    let mut output = Vec::new();
    let mut run = FractionalRun::default();

    for value in values {
        match value {
            SampleValue::Integer(_) => {
                if let Some(average) = run.take_average() {
                    output.push(average);
                }
                output.push(value);
            }
            SampleValue::Fractional(v) => run.push(v),
        }
    }

    if let Some(average) = run.take_average() {
        output.push(average);
    }

    output
}

/// Raw tag values of `context` in traversal order
pub fn raw_values(context: &SamplingContext) -> impl Iterator<Item = &str> {
    context
        .windows()
        .iter()
        .flat_map(|window| window.collected().iter())
        .flat_map(|tags| tags.values().map(String::as_str))
}

#[derive(Debug, Default)]
struct FractionalRun {
    sum: f64,
    count: u32,
}

impl FractionalRun {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn take_average(&mut self) -> Option<SampleValue> {
        if self.count == 0 {
            return None;
        }
        let average = round_fraction(self.sum / f64::from(self.count));
        *self = Self::default();
        Some(SampleValue::Fractional(average))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_integers_and_fractions() {
        assert_eq!(classify("60"), Some(SampleValue::Integer(60)));
        assert_eq!(classify("-2"), Some(SampleValue::Integer(-2)));
        assert_eq!(classify("1e3"), Some(SampleValue::Integer(1000)));
        assert_eq!(classify("16.5"), Some(SampleValue::Fractional(16.5)));
        assert_eq!(classify(" 7 "), Some(SampleValue::Integer(7)));
    }

    #[test]
    fn test_classify_rounded_integer_is_integer() {
        assert_eq!(classify("3.00000000000000"), Some(SampleValue::Integer(3)));
        // Noise beyond 14 digits rounds away
        assert_eq!(classify("2.000000000000001"), Some(SampleValue::Integer(2)));
    }

    #[test]
    fn test_classify_drops_non_numeric() {
        assert_eq!(classify("abc"), None);
        assert_eq!(classify(""), None);
        assert_eq!(classify("GET /index"), None);
        assert_eq!(classify("NaN"), None);
        assert_eq!(classify("inf"), None);
        assert_eq!(classify("1e300"), None);
    }

    #[test]
    fn test_round_fraction() {
        assert_eq!(round_fraction(0.1 + 0.2), 0.3);
        assert_eq!(round_fraction(1.0 / 3.0), 0.33333333333333);
        assert_eq!(round_fraction(4.0), 4.0);
    }

    #[test]
    fn test_reference_sequence() {
        let sequence = Aggregator::new().aggregate_raw(["10", "3.5", "4.5", "7", "abc"]);

        assert_eq!(
            sequence.values(),
            &[
                SampleValue::Integer(10),
                SampleValue::Fractional(4.0),
                SampleValue::Integer(7),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(fold(Vec::new()).is_empty());
        assert!(Aggregator::new().aggregate_raw(Vec::<&str>::new()).is_empty());
    }

    #[test]
    fn test_all_fractional_input_yields_overall_average() {
        let sequence = Aggregator::new().aggregate_raw(["0.5", "1.5", "2.5", "3.5"]);
        assert_eq!(sequence.values(), &[SampleValue::Fractional(2.0)]);
    }

    #[test]
    fn test_trailing_run_is_flushed() {
        let folded = fold([
            SampleValue::Integer(1),
            SampleValue::Fractional(0.25),
            SampleValue::Fractional(0.75),
        ]);
        assert_eq!(
            folded,
            vec![SampleValue::Integer(1), SampleValue::Fractional(0.5)]
        );
    }

    #[test]
    fn test_single_integer_is_fixed_point() {
        let once = fold([SampleValue::Integer(42)]);
        let twice = fold(once.clone());
        assert_eq!(once, vec![SampleValue::Integer(42)]);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_fold_bounds_output_by_integers_plus_runs() {
        // I F F I F I I F F F
        let input = vec![
            SampleValue::Integer(1),
            SampleValue::Fractional(0.1),
            SampleValue::Fractional(0.3),
            SampleValue::Integer(2),
            SampleValue::Fractional(0.5),
            SampleValue::Integer(3),
            SampleValue::Integer(4),
            SampleValue::Fractional(1.5),
            SampleValue::Fractional(2.5),
            SampleValue::Fractional(3.5),
        ];

        let output = fold(input);

        // 4 integers + 3 fractional runs
        assert_eq!(output.len(), 7);
        assert_eq!(
            output,
            vec![
                SampleValue::Integer(1),
                SampleValue::Fractional(0.2),
                SampleValue::Integer(2),
                SampleValue::Fractional(0.5),
                SampleValue::Integer(3),
                SampleValue::Integer(4),
                SampleValue::Fractional(2.5),
            ]
        );
    }

    #[test]
    fn test_output_is_head_truncated() {
        let raw: Vec<String> = (0..2000).map(|i| i.to_string()).collect();

        let sequence = Aggregator::new().aggregate_raw(raw.iter().map(String::as_str));

        assert_eq!(sequence.len(), MAX_SEQUENCE_LEN);
        assert_eq!(sequence.values()[0], SampleValue::Integer(0));
        assert_eq!(sequence.values()[999], SampleValue::Integer(999));
    }

    #[test]
    fn test_custom_cap() {
        let sequence = Aggregator::new()
            .with_max_len(2)
            .aggregate_raw(["1", "2", "3"]);
        assert_eq!(
            sequence.values(),
            &[SampleValue::Integer(1), SampleValue::Integer(2)]
        );
    }
}
