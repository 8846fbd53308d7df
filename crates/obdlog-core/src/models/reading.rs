//! Query responses and per-channel readings

use std::fmt;

use serde::{Deserialize, Serialize};

/// A decoded value: numeric magnitudes or textual values (status bits, enums)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
}

impl ReadingValue {
    /// Text values that carry nothing count as empty
    pub fn is_empty(&self) -> bool {
        match self {
            ReadingValue::Number(_) => false,
            ReadingValue::Text(s) => s.trim().is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ReadingValue::Number(n) => Some(*n),
            ReadingValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Number(n) => write!(f, "{}", n),
            ReadingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        ReadingValue::Number(value)
    }
}

impl From<&str> for ReadingValue {
    fn from(value: &str) -> Self {
        ReadingValue::Text(value.to_string())
    }
}

/// What the transport returned for one query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResponse {
    /// Decoded value; `None` is a null response
    pub value: Option<ReadingValue>,
    /// Unit reported by the transport
    pub unit: Option<String>,
}

impl QueryResponse {
    pub fn null() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<ReadingValue>, unit: Option<&str>) -> Self {
        Self {
            value: Some(value.into()),
            unit: unit.map(String::from),
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Why a channel produced no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsentReason {
    /// The ECU answered with a null response
    NoData,
    /// No channel is open
    NotConnected,
    /// The query did not complete in time
    Timeout,
    /// The transport reported a failure
    Transport(String),
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::NoData => f.write_str("no data"),
            AbsentReason::NotConnected => f.write_str("not connected"),
            AbsentReason::Timeout => f.write_str("timeout"),
            AbsentReason::Transport(msg) => write!(f, "transport: {}", msg),
        }
    }
}

/// Result of reading one channel: a value, or an ordinary absence
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Value {
        value: ReadingValue,
        unit: Option<String>,
    },
    Absent(AbsentReason),
}

impl Reading {
    pub fn is_absent(&self) -> bool {
        matches!(self, Reading::Absent(_))
    }

    pub fn value(&self) -> Option<&ReadingValue> {
        match self {
            Reading::Value { value, .. } => Some(value),
            Reading::Absent(_) => None,
        }
    }

    pub fn into_value(self) -> Option<ReadingValue> {
        match self {
            Reading::Value { value, .. } => Some(value),
            Reading::Absent(_) => None,
        }
    }

    /// Absence caused by the link rather than by the ECU declining to answer
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Reading::Absent(AbsentReason::Transport(_))
                | Reading::Absent(AbsentReason::NotConnected)
                | Reading::Absent(AbsentReason::Timeout)
        )
    }
}

impl From<QueryResponse> for Reading {
    fn from(response: QueryResponse) -> Self {
        match response.value {
            Some(value) => Reading::Value {
                value,
                unit: response.unit,
            },
            None => Reading::Absent(AbsentReason::NoData),
        }
    }
}
