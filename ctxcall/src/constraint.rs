//! Constraint rule sets and the pure validation functions behind them.
//!
//! A [ConstraintSet] is the immutable bag of named options attached to a
//! parameter. The functions in this module check or coerce a raw value
//! against those options and fail with a descriptive
//! [ValidationError]; they never clamp, truncate or signal failure through
//! a nil value. Type-directed selection of the right function lives in
//! [crate::validate].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::value::{TypeKey, Value};

/// Named validation options for one parameter. Unset options are not
/// enforced.
#[derive(Clone, Debug, Default)]
pub struct ConstraintSet {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Regular expression which must match from the start of the string.
    pub pattern: Option<String>,
    pub gt: Option<f64>,
    pub ge: Option<f64>,
    pub lt: Option<f64>,
    pub le: Option<f64>,
    pub multiple_of: Option<f64>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    /// Element type and rules for sequence items (or mapping keys).
    pub items: Option<(TypeKey, Box<ConstraintSet>)>,
    /// Value type and rules for mapping values.
    pub values: Option<(TypeKey, Box<ConstraintSet>)>,
    pub after: Option<NaiveDateTime>,
    pub before: Option<NaiveDateTime>,
    /// Explicit date/time format; when absent a best-effort parser is used.
    pub format: Option<String>,
    /// Exact-type membership check, used for enumeration values.
    pub instance_of: Option<TypeKey>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_length(mut self, value: usize) -> Self {
        self.min_length = Some(value);
        self
    }

    pub fn max_length(mut self, value: usize) -> Self {
        self.max_length = Some(value);
        self
    }

    pub fn pattern<P: Into<String>>(mut self, pattern: P) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn gt(mut self, value: f64) -> Self {
        self.gt = Some(value);
        self
    }

    pub fn ge(mut self, value: f64) -> Self {
        self.ge = Some(value);
        self
    }

    pub fn lt(mut self, value: f64) -> Self {
        self.lt = Some(value);
        self
    }

    pub fn le(mut self, value: f64) -> Self {
        self.le = Some(value);
        self
    }

    pub fn multiple_of(mut self, value: f64) -> Self {
        self.multiple_of = Some(value);
        self
    }

    pub fn min_items(mut self, value: usize) -> Self {
        self.min_items = Some(value);
        self
    }

    pub fn max_items(mut self, value: usize) -> Self {
        self.max_items = Some(value);
        self
    }

    pub fn items<T: 'static>(mut self, rules: ConstraintSet) -> Self {
        self.items = Some((TypeKey::of::<T>(), Box::new(rules)));
        self
    }

    pub fn values<T: 'static>(mut self, rules: ConstraintSet) -> Self {
        self.values = Some((TypeKey::of::<T>(), Box::new(rules)));
        self
    }

    pub fn after(mut self, bound: NaiveDateTime) -> Self {
        self.after = Some(bound);
        self
    }

    pub fn before(mut self, bound: NaiveDateTime) -> Self {
        self.before = Some(bound);
        self
    }

    pub fn format<F: Into<String>>(mut self, format: F) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn instance_of<T: 'static>(mut self) -> Self {
        self.instance_of = Some(TypeKey::of::<T>());
        self
    }
}

static PATTERN_CACHE: Lazy<Mutex<FxHashMap<String, Regex>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

/// Compiles a pattern once per process; subsequent validations of the same
/// pattern reuse the cached automaton.
fn compiled_pattern(pattern: &str) -> Result<Regex, ValidationError> {
    let mut cache = PATTERN_CACHE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(pattern)
        .map_err(|e| ValidationError::message(format!("Invalid pattern '{pattern}': {e}")))?;
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

/// Checks string length and pattern rules; the accepted value is returned
/// unchanged.
pub fn constrained_str<'a>(
    value: &'a str,
    rules: &ConstraintSet,
) -> Result<&'a str, ValidationError> {
    if let Some(min) = rules.min_length {
        if value.chars().count() < min {
            return Err(ValidationError::message(format!(
                "String length must be at least {min}"
            )));
        }
    }
    if let Some(max) = rules.max_length {
        if value.chars().count() > max {
            return Err(ValidationError::message(format!(
                "String length must be at most {max}"
            )));
        }
    }
    if let Some(pattern) = &rules.pattern {
        let regex = compiled_pattern(pattern)?;
        // match must start at the beginning of the string, but need not span it
        let matches_start = regex.find(value).map_or(false, |m| m.start() == 0);
        if !matches_start {
            return Err(ValidationError::message(format!(
                "String does not match pattern: {pattern}"
            )));
        }
    }
    Ok(value)
}

fn check_bounds(value: f64, rules: &ConstraintSet) -> Result<(), ValidationError> {
    if let Some(gt) = rules.gt {
        if !(value > gt) {
            return Err(ValidationError::message(format!("Value must be > {gt}")));
        }
    }
    if let Some(ge) = rules.ge {
        if !(value >= ge) {
            return Err(ValidationError::message(format!("Value must be >= {ge}")));
        }
    }
    if let Some(lt) = rules.lt {
        if !(value < lt) {
            return Err(ValidationError::message(format!("Value must be < {lt}")));
        }
    }
    if let Some(le) = rules.le {
        if !(value <= le) {
            return Err(ValidationError::message(format!("Value must be <= {le}")));
        }
    }
    Ok(())
}

/// Checks numeric bound and multiple-of rules.
pub fn constrained_number(value: f64, rules: &ConstraintSet) -> Result<f64, ValidationError> {
    check_bounds(value, rules)?;
    if let Some(multiple_of) = rules.multiple_of {
        if value % multiple_of != 0.0 {
            return Err(ValidationError::message(format!(
                "Value must be a multiple of {multiple_of}"
            )));
        }
    }
    Ok(value)
}

/// Integer variant of [constrained_number]. The multiple-of check stays in
/// integer arithmetic when the divisor is integral, so values beyond the
/// exactly representable f64 range are not rounded before the check.
pub fn constrained_int(value: i64, rules: &ConstraintSet) -> Result<i64, ValidationError> {
    check_bounds(value as f64, rules)?;
    if let Some(multiple_of) = rules.multiple_of {
        let divisible = if multiple_of != 0.0
            && multiple_of.fract() == 0.0
            && multiple_of.abs() <= i64::MAX as f64
        {
            value % multiple_of as i64 == 0
        } else {
            value as f64 % multiple_of == 0.0
        };
        if !divisible {
            return Err(ValidationError::message(format!(
                "Value must be a multiple of {multiple_of}"
            )));
        }
    }
    Ok(value)
}

/// Checks item-count rules for sequences and mappings.
pub fn constrained_len(count: usize, rules: &ConstraintSet) -> Result<(), ValidationError> {
    if let Some(min) = rules.min_items {
        if count < min {
            return Err(ValidationError::message(format!(
                "Collection must have at least {min} items. Found {count}"
            )));
        }
    }
    if let Some(max) = rules.max_items {
        if count > max {
            return Err(ValidationError::message(format!(
                "Collection must have at most {max} items. Found {count}"
            )));
        }
    }
    Ok(())
}

const GENERAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

// day-first short formats come before the %Y ones: chrono's %Y also accepts
// two-digit years, which would swallow "22-12-07" as year 0022
const GENERAL_DATE_FORMATS: &[&str] = &[
    "%d-%m-%y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
];

const GENERAL_TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

fn parse_general(value: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    for format in GENERAL_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    for format in GENERAL_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    for format in GENERAL_TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(value, format) {
            return Some(NaiveDateTime::new(NaiveDate::default(), parsed));
        }
    }
    None
}

/// Parses a date/time string using the explicit format when declared, or the
/// best-effort general parser otherwise, then checks the `after`/`before`
/// bounds. Truncation to date-only or time-only shapes is done by the
/// dispatching converter.
pub fn constrained_datetime(
    value: &str,
    rules: &ConstraintSet,
) -> Result<NaiveDateTime, ValidationError> {
    let parsed = match &rules.format {
        Some(format) => NaiveDateTime::parse_from_str(value, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
            .or_else(|| {
                NaiveTime::parse_from_str(value, format)
                    .ok()
                    .map(|time| NaiveDateTime::new(NaiveDate::default(), time))
            }),
        None => parse_general(value),
    }
    .ok_or_else(|| {
        ValidationError::message(format!(
            "Value should be a valid date/time string. Found \"{value}\""
        ))
    })?;

    if let Some(after) = rules.after {
        if parsed < after {
            return Err(ValidationError::message(format!(
                "Date/time value must be on or after {after}"
            )));
        }
    }
    if let Some(before) = rules.before {
        if parsed > before {
            return Err(ValidationError::message(format!(
                "Date/time value must be on or before {before}"
            )));
        }
    }

    Ok(parsed)
}

/// Parses a UUID-like identifier.
pub fn constrained_uuid(value: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value).map_err(|_| {
        ValidationError::message(format!(
            "Value should be a valid UUID string. Found \"{value}\""
        ))
    })
}

/// Exact-type membership: the value must already be an instance of the
/// expected type. A structurally similar value of a different type is
/// rejected, which is what makes enumeration checks strict.
pub fn constrained_instance(value: &Value, expected: &TypeKey) -> Result<(), ValidationError> {
    if value.type_id() != expected.id() {
        return Err(ValidationError::message(format!(
            "Value should be of type \"{expected}\""
        )));
    }
    Ok(())
}

/// Parses a JSON text payload into a mapping.
pub fn constrained_json(value: &str) -> Result<serde_json::Map<String, serde_json::Value>, ValidationError> {
    into_json_map(serde_json::from_str(value))
}

/// Parses a binary JSON payload into a mapping.
pub fn constrained_json_bytes(
    value: &[u8],
) -> Result<serde_json::Map<String, serde_json::Value>, ValidationError> {
    into_json_map(serde_json::from_slice(value))
}

fn into_json_map(
    parsed: serde_json::Result<serde_json::Value>,
) -> Result<serde_json::Map<String, serde_json::Value>, ValidationError> {
    match parsed {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::message(
            "JSON payload is not a mapping".to_string(),
        )),
        Err(e) => Err(ValidationError::message(format!("Invalid JSON: {e}"))),
    }
}
