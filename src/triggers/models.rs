use derive_more::From;
use serde::{Deserialize, Serialize};

/// Value of a trigger, either set by the host application (custom triggers) or carried by a
/// message's trigger condition.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, `bool` and lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum TriggerValue {
    /// A boolean.
    Boolean(bool),
    /// A number. Integers are stored as floats.
    Number(f64),
    /// A string.
    String(String),
    /// Only meaningful for the `contains` operator.
    List(Vec<TriggerValue>),
}

impl From<&str> for TriggerValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i64> for TriggerValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl TriggerValue {
    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number value, parsing strings if needed.
    pub(crate) fn coerce_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String form used for flexible equality between differently typed values.
    pub(crate) fn to_flex_string(&self) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::List(values) => {
                let items: Vec<String> = values.iter().map(Self::to_flex_string).collect();
                format!("[{}]", items.join(","))
            }
        }
    }
}

/// Source of the value a trigger is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// App-supplied key/value, looked up in the trigger store.
    Custom,
    /// Elapsed time of the current session.
    SessionTime,
    /// Time since the last in-app message was dismissed.
    #[serde(rename = "min_time_since")]
    TimeSinceLastInAppMessage,
    /// Unknown to this SDK version. Always evaluates to `false`.
    #[serde(other)]
    Unknown,
}

impl TriggerKind {
    /// Returns `true` for time-based kinds that are evaluated without the trigger store.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::SessionTime | Self::TimeSinceLastInAppMessage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum TriggerOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "==")]
    EqualTo,
    #[serde(rename = "!=")]
    NotEqualTo,
    #[serde(rename = "<=")]
    LessThanOrEqualTo,
    #[serde(rename = ">=")]
    GreaterThanOrEqualTo,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "not_exists")]
    NotExists,
    #[serde(rename = "in", alias = "contains")]
    Contains,
}

/// A single `property operator value` condition of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Trigger {
    /// Server-side id of the trigger. Dynamic trigger events refer to triggers by this id.
    #[serde(rename = "id")]
    pub trigger_id: String,
    /// What the trigger observes.
    pub kind: TriggerKind,
    /// Trigger store key for custom triggers.
    #[serde(default)]
    pub property: String,
    /// How the observed value is compared with `value`.
    pub operator: TriggerOperator,
    /// Value to compare with. Unused by `exists` and `not_exists`.
    #[serde(default)]
    pub value: Option<TriggerValue>,
}

#[cfg(test)]
mod tests {
    use super::{Trigger, TriggerKind, TriggerOperator, TriggerValue};

    #[test]
    fn parse_trigger() {
        let trigger: Trigger = serde_json::from_str(
            r#"{"id":"t1","kind":"custom","property":"level","operator":">=","value":3}"#,
        )
        .unwrap();
        assert_eq!(trigger.kind, TriggerKind::Custom);
        assert_eq!(trigger.operator, TriggerOperator::GreaterThanOrEqualTo);
        assert_eq!(trigger.value, Some(TriggerValue::Number(3.0)));
    }

    #[test]
    fn parse_unknown_kind_and_contains_alias() {
        let trigger: Trigger = serde_json::from_str(
            r#"{"id":"t1","kind":"location","property":"x","operator":"contains","value":"a"}"#,
        )
        .unwrap();
        assert_eq!(trigger.kind, TriggerKind::Unknown);
        assert_eq!(trigger.operator, TriggerOperator::Contains);
    }

    #[test]
    fn parse_dynamic_trigger_without_property() {
        let trigger: Trigger = serde_json::from_str(
            r#"{"id":"t2","kind":"min_time_since","operator":">","value":30}"#,
        )
        .unwrap();
        assert_eq!(trigger.kind, TriggerKind::TimeSinceLastInAppMessage);
        assert!(trigger.kind.is_dynamic());
        assert_eq!(trigger.property, "");
    }
}
