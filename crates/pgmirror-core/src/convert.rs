//! Conversion of Postgres text-format values into destination values.
//!
//! pgoutput (proto_version 1) always ships column data in text form, so every
//! buffered value passes through [`ColumnType::parse_text`].

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};
use crate::types::{ColumnType, Value};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

impl ColumnType {
    /// Convert the textual representation of a value into a [`Value`] of this type.
    ///
    /// `column` is only used to build error messages.
    pub fn parse_text(&self, column: &str, text: &str) -> Result<Value> {
        let invalid = || Error::InvalidValue {
            column: column.to_string(),
            expected: self.to_string(),
            value: text.to_string(),
        };

        let value = match self {
            ColumnType::Bool => match text {
                "t" | "true" => Value::Bool(true),
                "f" | "false" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            ColumnType::Int16 => Value::Int(text.parse::<i16>().map_err(|_| invalid())?.into()),
            ColumnType::Int32 => Value::Int(text.parse::<i32>().map_err(|_| invalid())?.into()),
            ColumnType::Int64 => Value::Int(text.parse::<i64>().map_err(|_| invalid())?),
            ColumnType::UInt8 => Value::UInt(text.parse::<u8>().map_err(|_| invalid())?.into()),
            ColumnType::UInt16 => Value::UInt(text.parse::<u16>().map_err(|_| invalid())?.into()),
            ColumnType::UInt32 => Value::UInt(text.parse::<u32>().map_err(|_| invalid())?.into()),
            ColumnType::UInt64 => Value::UInt(text.parse::<u64>().map_err(|_| invalid())?),
            ColumnType::Float32 => {
                Value::Float(text.parse::<f32>().map_err(|_| invalid())?.into())
            }
            ColumnType::Float64 => Value::Float(text.parse::<f64>().map_err(|_| invalid())?),
            ColumnType::Decimal => {
                // Validate the shape without losing precision.
                text.parse::<f64>().map_err(|_| invalid())?;
                Value::String(text.to_string())
            }
            ColumnType::String => Value::String(text.to_string()),
            ColumnType::Date | ColumnType::Timestamp | ColumnType::TimestampTz
                if matches!(text, "infinity" | "-infinity") =>
            {
                Value::String(text.to_string())
            }
            ColumnType::Date => {
                let (text, bc) = split_era(text);
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?;
                let date = to_era(date, bc).ok_or_else(invalid)?;
                Value::String(date.format("%Y-%m-%d").to_string())
            }
            ColumnType::Timestamp => {
                let (text, bc) = split_era(text);
                let ts = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
                    .map_err(|_| invalid())?;
                let ts = to_era(ts, bc).ok_or_else(invalid)?;
                Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
            }
            ColumnType::TimestampTz => {
                let (text, bc) = split_era(text);
                let ts = DateTime::parse_from_str(text, TIMESTAMPTZ_FORMAT).map_err(|_| invalid())?;
                let ts = to_era(ts, bc).ok_or_else(invalid)?.with_timezone(&Utc);
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            ColumnType::Uuid => {
                let id = uuid::Uuid::parse_str(text).map_err(|_| invalid())?;
                Value::String(id.hyphenated().to_string())
            }
            ColumnType::Json => {
                let json: serde_json::Value = serde_json::from_str(text).map_err(|_| invalid())?;
                Value::from(json)
            }
            ColumnType::Array(element) => {
                let items = split_array_literal(text)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Some(raw) => values.push(element.parse_text(column, &raw)?),
                        None => values.push(element.default_value()),
                    }
                }
                Value::Array(values)
            }
        };

        Ok(value)
    }

    /// The value written for a non-nullable column when the source sends NULL.
    pub fn default_value(&self) -> Value {
        match self {
            ColumnType::Bool => Value::Bool(false),
            ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => Value::Int(0),
            ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64 => {
                Value::UInt(0)
            }
            ColumnType::Float32 | ColumnType::Float64 => Value::Float(0.0),
            ColumnType::Decimal => Value::String("0".to_string()),
            ColumnType::String => Value::String(String::new()),
            ColumnType::Date => Value::String("1970-01-01".to_string()),
            ColumnType::Timestamp => Value::String("1970-01-01T00:00:00.000000".to_string()),
            ColumnType::TimestampTz => Value::String("1970-01-01T00:00:00.000000Z".to_string()),
            ColumnType::Uuid => Value::String(uuid::Uuid::nil().hyphenated().to_string()),
            ColumnType::Json => Value::Null,
            ColumnType::Array(_) => Value::Array(Vec::new()),
        }
    }
}

/// Strip the ` BC` suffix Postgres prints after years before 1 AD.
fn split_era(text: &str) -> (&str, bool) {
    match text.strip_suffix(" BC") {
        Some(rest) => (rest, true),
        None => (text, false),
    }
}

/// Map a Postgres BC year onto chrono's astronomical numbering (1 BC is year 0).
fn to_era<T: Datelike>(value: T, bc: bool) -> Option<T> {
    if bc {
        let year = value.year();
        value.with_year(1 - year)
    } else {
        Some(value)
    }
}

/// Split a one-dimensional Postgres array literal (`{a,"b c",NULL}`) into its
/// elements. `None` marks an unquoted `NULL` element.
pub fn split_array_literal(text: &str) -> Result<Vec<Option<String>>> {
    let malformed = |reason: &str| Error::MalformedArray(format!("{reason}: {text}"));

    let inner = text
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| malformed("missing braces"))?;

    let mut items = Vec::new();
    if inner.is_empty() {
        return Ok(items);
    }

    let mut chars = inner.chars().peekable();
    loop {
        let mut buf = String::new();

        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => buf.push(c),
                        None => return Err(malformed("dangling escape")),
                    },
                    Some('"') => break,
                    Some(c) => buf.push(c),
                    None => return Err(malformed("unterminated quote")),
                }
            }
            items.push(Some(buf));
        } else {
            while let Some(&c) = chars.peek() {
                match c {
                    ',' => break,
                    '{' | '}' | '"' => return Err(malformed("nested or stray delimiter")),
                    '\\' => {
                        chars.next();
                        match chars.next() {
                            Some(escaped) => buf.push(escaped),
                            None => return Err(malformed("dangling escape")),
                        }
                    }
                    _ => {
                        buf.push(c);
                        chars.next();
                    }
                }
            }

            let trimmed = buf.trim();
            if trimmed.eq_ignore_ascii_case("NULL") {
                items.push(None);
            } else {
                items.push(Some(trimmed.to_string()));
            }
        }

        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(_) => return Err(malformed("unexpected character after element")),
        }
    }

    Ok(items)
}
