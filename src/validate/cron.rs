//! Five-field cron expression validation for `schedule/cron` flows.
//!
//! Supports `*`, lists, ranges, `/step`, month and weekday names, and the
//! `@yearly`-style shorthands. Day-of-week 7 is Sunday, like 0.

use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("{field} field is empty")]
    Empty { field: &'static str },
    #[error("invalid {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("{field} value {value} is out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("invalid {field} step '{value}'")]
    InvalidStep { field: &'static str, value: String },
    #[error("{field} range {start}-{end} is reversed")]
    ReversedRange {
        field: &'static str,
        start: u32,
        end: u32,
    },
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

const FIELDS: [FieldSpec; 5] = [
    FieldSpec { name: "minute", min: 0, max: 59, names: &[] },
    FieldSpec { name: "hour", min: 0, max: 23, names: &[] },
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] },
    FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES },
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: DAY_NAMES },
];

/// A parsed cron expression; each field is the set of values it fires on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    pub minutes: BTreeSet<u32>,
    pub hours: BTreeSet<u32>,
    pub days_of_month: BTreeSet<u32>,
    pub months: BTreeSet<u32>,
    /// Sunday is always stored as 0.
    pub days_of_week: BTreeSet<u32>,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let expanded = match expression.trim() {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other => other,
        };
        let parts: Vec<&str> = expanded.split_whitespace().collect();
        if parts.len() != FIELDS.len() {
            return Err(CronError::FieldCount(parts.len()));
        }
        let mut sets = Vec::with_capacity(FIELDS.len());
        for (part, spec) in parts.iter().zip(FIELDS.iter()) {
            sets.push(parse_field(part, spec)?);
        }
        let mut days_of_week = sets.pop().unwrap_or_default();
        if days_of_week.remove(&7) {
            days_of_week.insert(0);
        }
        let mut sets = sets.into_iter();
        Ok(CronExpression {
            minutes: sets.next().unwrap_or_default(),
            hours: sets.next().unwrap_or_default(),
            days_of_month: sets.next().unwrap_or_default(),
            months: sets.next().unwrap_or_default(),
            days_of_week,
        })
    }
}

/// Whether `expression` is a valid five-field cron expression.
pub fn is_valid_cron(expression: &str) -> bool {
    CronExpression::parse(expression).is_ok()
}

fn parse_field(field: &str, spec: &FieldSpec) -> Result<BTreeSet<u32>, CronError> {
    if field.is_empty() {
        return Err(CronError::Empty { field: spec.name });
    }
    let mut values = BTreeSet::new();
    for item in field.split(',') {
        if item.is_empty() {
            return Err(CronError::Empty { field: spec.name });
        }
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| CronError::InvalidStep {
                    field: spec.name,
                    value: step.to_string(),
                })?;
                if step == 0 {
                    return Err(CronError::InvalidStep {
                        field: spec.name,
                        value: "0".into(),
                    });
                }
                (range, step)
            }
            None => (item, 1),
        };
        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, spec)?, parse_value(b, spec)?)
        } else {
            let single = parse_value(range, spec)?;
            // `5/15` runs from 5 to the end of the field
            if step > 1 { (single, spec.max) } else { (single, single) }
        };
        if start > end {
            return Err(CronError::ReversedRange {
                field: spec.name,
                start,
                end,
            });
        }
        values.extend((start..=end).step_by(step as usize));
    }
    Ok(values)
}

fn parse_value(text: &str, spec: &FieldSpec) -> Result<u32, CronError> {
    let upper = text.to_ascii_uppercase();
    if let Some(index) = spec.names.iter().position(|n| *n == upper) {
        // months are 1-based, weekdays 0-based
        return Ok(index as u32 + spec.min);
    }
    let value: u32 = text.parse().map_err(|_| CronError::InvalidValue {
        field: spec.name,
        value: text.to_string(),
    })?;
    if value < spec.min || value > spec.max {
        return Err(CronError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_midnight() {
        let cron = CronExpression::parse("0 0 * * *").unwrap();
        assert_eq!(cron.minutes, BTreeSet::from([0]));
        assert_eq!(cron.hours, BTreeSet::from([0]));
        assert_eq!(cron.days_of_month.len(), 31);
        assert_eq!(cron.days_of_week.len(), 7);
    }

    #[test]
    fn steps_lists_and_names() {
        let cron = CronExpression::parse("*/15 9-17 1,15 JAN-mar MON-FRI").unwrap();
        assert_eq!(cron.minutes, BTreeSet::from([0, 15, 30, 45]));
        assert_eq!(cron.hours.len(), 9);
        assert_eq!(cron.days_of_month, BTreeSet::from([1, 15]));
        assert_eq!(cron.months, BTreeSet::from([1, 2, 3]));
        assert_eq!(cron.days_of_week, BTreeSet::from([1, 2, 3, 4, 5]));
    }

    #[test]
    fn sunday_as_seven() {
        let cron = CronExpression::parse("0 12 * * 7").unwrap();
        assert_eq!(cron.days_of_week, BTreeSet::from([0]));
    }

    #[test]
    fn shorthand_expands() {
        assert_eq!(
            CronExpression::parse("@daily").unwrap(),
            CronExpression::parse("0 0 * * *").unwrap()
        );
    }

    #[test]
    fn rejects_out_of_range() {
        let err = CronExpression::parse("99 99 * * *").unwrap_err();
        assert_eq!(
            err,
            CronError::OutOfRange {
                field: "minute",
                value: 99,
                min: 0,
                max: 59
            }
        );
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(CronExpression::parse("0 0 * *").unwrap_err(), CronError::FieldCount(4));
        assert!(matches!(
            CronExpression::parse("*/0 * * * *"),
            Err(CronError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpression::parse("0 5-2 * * *"),
            Err(CronError::ReversedRange { .. })
        ));
        assert!(matches!(
            CronExpression::parse("a * * * *"),
            Err(CronError::InvalidValue { .. })
        ));
        assert!(!is_valid_cron("0 0 ,1 * *"));
    }
}
