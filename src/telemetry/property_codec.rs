//! Decoding of wire-format property values
//!
//! The property server pushes lines of the form
//!
//! ```text
//! Property <name> <type> <value|(null)>
//! ```
//!
//! This module turns such a line into a [`PropertyLine`] carrying a
//! [`TypedValue`], and offers the same per-type parsers to the expression
//! engine so compare values can be coerced to a property's declared type.

use super::error::TelemetryError;
use chrono::{DateTime, Duration, NaiveDateTime};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Marker the server sends instead of a value
pub const NULL_VALUE: &str = "(null)";

const PROPERTY_PREFIX: &str = "Property";

/// Declared type of a property, as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Boolean,
    Integer,
    Long,
    Double,
    TimeSpan,
    DateTime,
    String,
    Object,
}

impl PropertyType {
    pub fn wire_name(&self) -> &'static str {
        match self {
            PropertyType::Boolean => "boolean",
            PropertyType::Integer => "integer",
            PropertyType::Long => "long",
            PropertyType::Double => "double",
            PropertyType::TimeSpan => "timespan",
            PropertyType::DateTime => "datetime",
            PropertyType::String => "string",
            PropertyType::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            PropertyType::Integer | PropertyType::Long | PropertyType::Double
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

impl FromStr for PropertyType {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(PropertyType::Boolean),
            "integer" | "int" => Ok(PropertyType::Integer),
            "long" => Ok(PropertyType::Long),
            "double" => Ok(PropertyType::Double),
            "timespan" => Ok(PropertyType::TimeSpan),
            "datetime" => Ok(PropertyType::DateTime),
            "string" => Ok(PropertyType::String),
            "object" => Ok(PropertyType::Object),
            _ => Err(TelemetryError::UnknownPropertyType(s.to_string())),
        }
    }
}

/// A decoded, non-null property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    TimeSpan(Duration),
    DateTime(NaiveDateTime),
    String(String),
    Object(String),
}

impl PropertyValue {
    /// Parses `text` as a value of `property_type`
    pub fn parse(property_type: PropertyType, text: &str) -> Result<Self, TelemetryError> {
        let trimmed = text.trim();
        let invalid = || TelemetryError::InvalidValue {
            property_type,
            value: text.to_string(),
        };

        match property_type {
            PropertyType::Boolean => parse_bool(trimmed)
                .map(PropertyValue::Boolean)
                .ok_or_else(invalid),
            PropertyType::Integer => trimmed
                .parse::<i32>()
                .map(PropertyValue::Integer)
                .map_err(|_| invalid()),
            PropertyType::Long => trimmed
                .parse::<i64>()
                .map(PropertyValue::Long)
                .map_err(|_| invalid()),
            PropertyType::Double => trimmed
                .parse::<f64>()
                .map(PropertyValue::Double)
                .map_err(|_| invalid()),
            PropertyType::TimeSpan => parse_timespan(trimmed)
                .map(PropertyValue::TimeSpan)
                .ok_or_else(invalid),
            PropertyType::DateTime => parse_datetime(trimmed)
                .map(PropertyValue::DateTime)
                .ok_or_else(invalid),
            PropertyType::String => Ok(PropertyValue::String(text.to_string())),
            PropertyType::Object => Ok(PropertyValue::Object(text.to_string())),
        }
    }

    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::Integer(_) => PropertyType::Integer,
            PropertyValue::Long(_) => PropertyType::Long,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::TimeSpan(_) => PropertyType::TimeSpan,
            PropertyValue::DateTime(_) => PropertyType::DateTime,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Object(_) => PropertyType::Object,
        }
    }

    /// Orders two values of the same type; values of different types are
    /// incomparable
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => Some(a.cmp(b)),
            (PropertyValue::Integer(a), PropertyValue::Integer(b)) => Some(a.cmp(b)),
            (PropertyValue::Long(a), PropertyValue::Long(b)) => Some(a.cmp(b)),
            (PropertyValue::Double(a), PropertyValue::Double(b)) => a.partial_cmp(b),
            (PropertyValue::TimeSpan(a), PropertyValue::TimeSpan(b)) => Some(a.cmp(b)),
            (PropertyValue::DateTime(a), PropertyValue::DateTime(b)) => Some(a.cmp(b)),
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            (PropertyValue::Object(a), PropertyValue::Object(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// A property value as last received: declared type, decoded value (absent
/// for `(null)`) and the raw wire text
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub property_type: PropertyType,
    pub value: Option<PropertyValue>,
    pub raw: String,
}

impl TypedValue {
    pub fn decode(property_type: PropertyType, raw: &str) -> Result<Self, TelemetryError> {
        let value = if raw.trim() == NULL_VALUE {
            None
        } else {
            Some(PropertyValue::parse(property_type, raw)?)
        };

        Ok(Self {
            property_type,
            value,
            raw: raw.to_string(),
        })
    }

    /// Coerces `text` to this value's declared type
    ///
    /// Returns `None` when the text does not parse as that type.
    pub fn coerce(&self, text: &str) -> Option<PropertyValue> {
        PropertyValue::parse(self.property_type, text).ok()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// One decoded `Property` line
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyLine {
    pub name: String,
    pub value: TypedValue,
}

/// Decodes a server line of the form `Property <name> <type> <value|(null)>`
///
/// The line is split into at most four fields so string values may contain
/// spaces.
pub fn parse_property_line(line: &str) -> Result<PropertyLine, TelemetryError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.splitn(4, ' ');

    match fields.next() {
        Some(PROPERTY_PREFIX) => {}
        _ => return Err(TelemetryError::ProtocolParseError(line.to_string())),
    }

    let (name, type_name, raw) = match (fields.next(), fields.next(), fields.next()) {
        (Some(name), Some(type_name), Some(raw)) if !name.is_empty() => (name, type_name, raw),
        _ => return Err(TelemetryError::ProtocolParseError(line.to_string())),
    };

    let property_type = type_name.parse::<PropertyType>()?;
    let value = TypedValue::decode(property_type, raw)?;

    Ok(PropertyLine {
        name: name.to_string(),
        value,
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") || text == "1" {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") || text == "0" {
        Some(false)
    } else {
        None
    }
}

// [-][d.]hh:mm:ss[.fffffff]
fn parse_timespan(text: &str) -> Option<Duration> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let (days, hours) = match parts[0].split_once('.') {
        Some((d, h)) => (d.parse::<i64>().ok()?, h.parse::<i64>().ok()?),
        None => (0, parts[0].parse::<i64>().ok()?),
    };
    let minutes = parts[1].parse::<i64>().ok()?;

    let (seconds, nanos) = match parts[2].split_once('.') {
        Some((s, frac)) => {
            if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let scaled = format!("{frac:0<9}");
            (s.parse::<i64>().ok()?, scaled.parse::<i64>().ok()?)
        }
        None => (parts[2].parse::<i64>().ok()?, 0),
    };

    if minutes >= 60 || seconds >= 60 || hours < 0 || days < 0 {
        return None;
    }

    let total = Duration::try_days(days)?
        .checked_add(&Duration::try_hours(hours)?)?
        .checked_add(&Duration::try_minutes(minutes)?)?
        .checked_add(&Duration::try_seconds(seconds)?)?
        .checked_add(&Duration::nanoseconds(nanos))?;

    Some(if negative { -total } else { total })
}

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%d.%m.%Y %H:%M:%S",
];

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn parses_boolean_property_line() {
        let line = parse_property_line("Property dcp.gd.EngineIgnitionOn boolean True\r\n").unwrap();
        assert_eq!(line.name, "dcp.gd.EngineIgnitionOn");
        assert_eq!(line.value.property_type, PropertyType::Boolean);
        assert_eq!(line.value.value, Some(PropertyValue::Boolean(true)));
        assert_eq!(line.value.raw, "True");
    }

    #[test]
    fn parses_numeric_types() {
        let int = parse_property_line("Property a integer -42").unwrap();
        assert_eq!(int.value.value, Some(PropertyValue::Integer(-42)));

        let long = parse_property_line("Property b long 9000000000").unwrap();
        assert_eq!(long.value.value, Some(PropertyValue::Long(9_000_000_000)));

        let double = parse_property_line("Property c double 12.75").unwrap();
        assert_eq!(double.value.value, Some(PropertyValue::Double(12.75)));
    }

    #[test]
    fn null_keeps_declared_type() {
        let line = parse_property_line("Property dcp.gd.Gear integer (null)").unwrap();
        assert!(line.value.is_null());
        assert_eq!(line.value.property_type, PropertyType::Integer);
    }

    #[test]
    fn string_values_may_contain_spaces() {
        let line = parse_property_line("Property dcp.gd.CarModel string Porsche 911 GT3 R").unwrap();
        assert_eq!(
            line.value.value,
            Some(PropertyValue::String("Porsche 911 GT3 R".to_string()))
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(matches!(
            parse_property_line("Hello there"),
            Err(TelemetryError::ProtocolParseError(_))
        ));
        assert!(matches!(
            parse_property_line("Property onlyname"),
            Err(TelemetryError::ProtocolParseError(_))
        ));
        assert!(matches!(
            parse_property_line("Property x complex 1"),
            Err(TelemetryError::UnknownPropertyType(_))
        ));
        assert!(matches!(
            parse_property_line("Property x integer abc"),
            Err(TelemetryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn timespan_with_days_and_fraction() {
        let value = PropertyValue::parse(PropertyType::TimeSpan, "1.02:03:04.5").unwrap();
        let expected = Duration::days(1)
            + Duration::hours(2)
            + Duration::minutes(3)
            + Duration::seconds(4)
            + Duration::milliseconds(500);
        assert_eq!(value, PropertyValue::TimeSpan(expected));

        let lap = PropertyValue::parse(PropertyType::TimeSpan, "00:01:32.4561230").unwrap();
        match lap {
            PropertyValue::TimeSpan(d) => assert_eq!(d.num_milliseconds(), 92_456),
            other => panic!("unexpected {other:?}"),
        }

        assert!(PropertyValue::parse(PropertyType::TimeSpan, "01:75:00").is_err());
    }

    #[test]
    fn datetime_formats() {
        let iso = PropertyValue::parse(PropertyType::DateTime, "2024-03-01T13:45:10").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(13, 45, 10)
            .unwrap();
        assert_eq!(iso, PropertyValue::DateTime(expected));

        let us = PropertyValue::parse(PropertyType::DateTime, "03/01/2024 01:45:10 PM").unwrap();
        match us {
            PropertyValue::DateTime(dt) => assert_eq!(dt.hour(), 13),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn boolean_accepts_digits_for_bare_conditions() {
        assert_eq!(
            PropertyValue::parse(PropertyType::Boolean, "0").unwrap(),
            PropertyValue::Boolean(false)
        );
        assert_eq!(
            PropertyValue::parse(PropertyType::Boolean, "FALSE").unwrap(),
            PropertyValue::Boolean(false)
        );
    }

    #[test]
    fn compare_only_within_same_type() {
        let a = PropertyValue::Integer(1);
        let b = PropertyValue::Integer(2);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(a.compare(&PropertyValue::Double(1.0)), None);
    }
}
