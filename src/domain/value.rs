use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single cell of a listing dataset
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

/// Coarse type of a present value, used for mixed-type inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredType {
    Datetime,
    Numeric,
    Categorical,
}

impl InferredType {
    /// Fixed inference order; earlier wins ties.
    pub const ORDER: [InferredType; 3] = [
        InferredType::Datetime,
        InferredType::Numeric,
        InferredType::Categorical,
    ];
}

// Unit and currency decorations stripped before numeric parsing.
static NUMBER_DECORATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:chf|eur|euros?|usd|gbp|€|\$|£|fr\.?)?\s*(.*?)\s*(?:m²|m2|sqm|sq\.?\s?ft|sqft|ft²|chf|eur|euros?|usd|gbp|€|\$|£|%|\.-|-)?$",
    )
    .expect("number decoration regex")
});

static NUMBER_CORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?[\d\s\u{a0}\u{202f}'.,]*\d[\d\s\u{a0}\u{202f}'.,]*$").expect("number core regex"));

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y"];

// Epoch-second window accepted when a number is read as a timestamp (1973..2100).
const EPOCH_MIN: f64 = 1.0e8;
const EPOCH_MAX: f64 = 4_102_444_800.0;

/// Parse a loosely formatted number such as `"450 000 €"`, `"1'250'000"`,
/// `"85,5 m²"` or `"1,500"`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let core = NUMBER_DECORATION
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    if !NUMBER_CORE.is_match(core) {
        return None;
    }

    let (sign, body) = match core.chars().next() {
        Some('-') => (-1.0, &core[1..]),
        Some('+') => (1.0, &core[1..]),
        _ => (1.0, core),
    };
    let compact: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();

    let commas = compact.matches(',').count();
    let dots = compact.matches('.').count();
    let normalized = match (commas, dots) {
        (0, 0) | (0, 1) => compact,
        (0, _) => compact.replace('.', ""),
        (_, 0) => {
            let decimals = compact.rsplit(',').next().map(str::len).unwrap_or(0);
            if commas == 1 && decimals != 3 {
                compact.replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
        _ => {
            // Both present: whichever comes last is the decimal separator.
            let last_comma = compact.rfind(',').unwrap_or(0);
            let last_dot = compact.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                compact.replace('.', "").replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| sign * v)
}

/// Parse a timestamp in one of the accepted textual layouts.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.len() < 8 {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Build a value from a CSV cell: empty cells are null, plain integers,
    /// floats and booleans are typed, everything else stays text.
    pub fn from_cell(cell: &str) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Text(cell.to_string()),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        }
    }

    /// Numeric reading of the value; text is parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// Timestamp reading of the value; numbers are read as epoch seconds when
    /// they fall in a plausible window.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => parse_datetime(s),
            Value::Int(_) | Value::Float(_) => {
                let secs = self.as_f64()?;
                if (EPOCH_MIN..=EPOCH_MAX).contains(&secs) {
                    Utc.timestamp_opt(secs as i64, 0).single()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Categorical reading of the value.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Type this value would be read as when no declared type applies.
    pub fn infer_type(&self) -> Option<InferredType> {
        match self {
            Value::Null => None,
            Value::DateTime(_) => Some(InferredType::Datetime),
            Value::Int(_) | Value::Float(_) => Some(InferredType::Numeric),
            Value::Bool(_) => Some(InferredType::Categorical),
            Value::Text(s) => {
                if parse_datetime(s).is_some() {
                    Some(InferredType::Datetime)
                } else if parse_number(s).is_some() {
                    Some(InferredType::Numeric)
                } else {
                    Some(InferredType::Categorical)
                }
            }
        }
    }

    /// Equality key: `Int(3)` and `Float(3.0)` share a key.
    pub fn key(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("b:{}", b),
            Value::Int(i) => format!("n:{}", *i as f64),
            Value::Float(f) => format!("n:{}", f),
            Value::Text(s) => format!("t:{}", s),
            Value::DateTime(dt) => format!("d:{}", dt.timestamp()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Value::Float(v)
        } else {
            Value::Null
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(_) => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_handles_listing_formats() {
        assert_eq!(parse_number("450000"), Some(450000.0));
        assert_eq!(parse_number("450 000 €"), Some(450000.0));
        assert_eq!(parse_number("CHF 1'250'000.-"), Some(1250000.0));
        assert_eq!(parse_number("85,5 m²"), Some(85.5));
        assert_eq!(parse_number("1,500"), Some(1500.0));
        assert_eq!(parse_number("1.250.000"), Some(1250000.0));
        assert_eq!(parse_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_number("-3.5"), Some(-3.5));
        assert_eq!(parse_number("three"), None);
        assert_eq!(parse_number("2024-01-15"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-03-01"), Some(expected));
        assert_eq!(parse_datetime("01/03/2024"), Some(expected));
        assert_eq!(parse_datetime("2024-03-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_datetime("hello"), None);
    }

    #[test]
    fn test_from_cell_types_plain_values() {
        assert_eq!(Value::from_cell(""), Value::Null);
        assert_eq!(Value::from_cell("42"), Value::Int(42));
        assert_eq!(Value::from_cell("4.5"), Value::Float(4.5));
        assert_eq!(Value::from_cell("TRUE"), Value::Bool(true));
        assert_eq!(Value::from_cell("Lausanne"), Value::Text("Lausanne".to_string()));
    }

    #[test]
    fn test_infer_type_order() {
        assert_eq!(Value::from("2023-05-01").infer_type(), Some(InferredType::Datetime));
        assert_eq!(Value::from("1 200").infer_type(), Some(InferredType::Numeric));
        assert_eq!(Value::from("soon").infer_type(), Some(InferredType::Categorical));
        assert_eq!(Value::Null.infer_type(), None);
    }

    #[test]
    fn test_key_unifies_numeric_representations() {
        assert_eq!(Value::Int(3).key(), Value::Float(3.0).key());
        assert_ne!(Value::Int(3).key(), Value::from("3").key());
    }

    #[test]
    fn test_numbers_as_epoch_only_in_window() {
        assert!(Value::Int(1_700_000_000).as_datetime().is_some());
        assert!(Value::Int(2020).as_datetime().is_none());
    }
}
