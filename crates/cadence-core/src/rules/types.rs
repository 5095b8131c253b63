//! Rule definitions: ignore rules, triggers and habits.
//!
//! Definitions are deserialized from the rule store documents and are never
//! mutated afterwards. Runtime habit progress lives in the correlator.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{CadenceError, CadenceResult};

/// Parameter mapping carried by events and rules.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Compare two parameter values, treating integer and float forms of the same
/// number as equal.
pub fn values_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value;

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => parameters_equal(x, y),
        _ => a == b,
    }
}

fn numbers_equal(x: &serde_json::Number, y: &serde_json::Number) -> bool {
    // Integers compare exactly, f64 would collapse large neighbours.
    if let (Some(i), Some(j)) = (as_integer(x), as_integer(y)) {
        return i == j;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn as_integer(n: &serde_json::Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Full equality of two parameter mappings (same keys, equal values).
pub fn parameters_equal(a: &Parameters, b: &Parameters) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| values_equal(value, other)))
}

/// Serialized form of an ignore rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreRuleDef {
    /// Drop events whose kind contains this text.
    Contains(String),
    /// Drop events whose kind matches this regular expression.
    Pattern { pattern: String },
}

/// An intent kind that must never be logged nor matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "IgnoreRuleDef", into = "IgnoreRuleDef")]
pub enum IgnoreRule {
    /// Substring containment.
    Contains(String),
    /// Regular expression search.
    Pattern(Regex),
}

impl IgnoreRule {
    /// Substring rule.
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    /// Regex rule.
    pub fn pattern(pattern: &str) -> CadenceResult<Self> {
        Regex::new(pattern).map(Self::Pattern).map_err(|e| {
            CadenceError::configuration_with_source(
                format!("invalid ignore pattern '{}'", pattern),
                e,
            )
        })
    }

    /// Whether an event kind is covered by this rule.
    pub fn matches(&self, kind: &str) -> bool {
        match self {
            Self::Contains(text) => kind.contains(text.as_str()),
            Self::Pattern(re) => re.is_match(kind),
        }
    }
}

impl fmt::Display for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(text) => write!(f, "{}", text),
            Self::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl TryFrom<IgnoreRuleDef> for IgnoreRule {
    type Error = CadenceError;

    fn try_from(def: IgnoreRuleDef) -> Result<Self, Self::Error> {
        match def {
            IgnoreRuleDef::Contains(text) => Ok(Self::Contains(text)),
            IgnoreRuleDef::Pattern { pattern } => Self::pattern(&pattern),
        }
    }
}

impl From<IgnoreRule> for IgnoreRuleDef {
    fn from(rule: IgnoreRule) -> Self {
        match rule {
            IgnoreRule::Contains(text) => Self::Contains(text),
            IgnoreRule::Pattern(re) => Self::Pattern {
                pattern: re.as_str().to_string(),
            },
        }
    }
}

/// A rule that fires on a single matching event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    /// Event kind that must match exactly.
    #[serde(rename = "intent")]
    pub intent_kind: String,
    /// Parameters that must be present with equal values.
    #[serde(rename = "parameters", default)]
    pub required_parameters: Parameters,
}

impl TriggerRule {
    /// Create a trigger rule without parameter requirements.
    pub fn new(intent_kind: impl Into<String>) -> Self {
        Self {
            intent_kind: intent_kind.into(),
            required_parameters: Parameters::new(),
        }
    }

    /// Builder method to require a parameter value.
    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.required_parameters.insert(name.into(), value);
        self
    }
}

/// One intent of a habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitMember {
    /// Event kind.
    pub name: String,
    /// Exact parameter mapping.
    #[serde(default)]
    pub parameters: Parameters,
}

impl HabitMember {
    /// Create a member intent.
    pub fn new(name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// A habit as stored in the habit document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitDefinition {
    /// Member intents.
    #[serde(rename = "intents")]
    pub members: Vec<HabitMember>,
    /// Habits picked by the user are not detected automatically.
    #[serde(default)]
    pub user_choice: bool,
    /// Half width of the daily window, in minutes.
    #[serde(
        default,
        deserialize_with = "minutes_from_number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval_max: Option<f64>,
    /// Centre of the daily window, `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

fn minutes_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Minutes {
        Number(f64),
        Text(String),
    }

    match Option::<Minutes>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Minutes::Number(n)) => Ok(Some(n)),
        Some(Minutes::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("interval_max '{}' is not a number", s))),
    }
}

/// Parse a `H:M` time of day. Fields after the minute, such as seconds,
/// are ignored.
pub fn parse_time_of_day(text: &str) -> CadenceResult<NaiveTime> {
    let invalid = || CadenceError::configuration(format!("invalid habit time '{}'", text));

    let mut fields = text.trim().split(':');
    let hour = fields.next().ok_or_else(invalid)?;
    let minute = fields.next().ok_or_else(invalid)?;
    let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = minute.trim().parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Daily window `centre ± half_width`, compared by time of day only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    centre: NaiveTime,
    half_width: Duration,
}

impl TimeWindow {
    /// Create a window around `centre`.
    pub fn new(centre: NaiveTime, half_width: Duration) -> Self {
        Self { centre, half_width }
    }

    /// Window from a `HH:MM` centre and a half width in minutes.
    pub fn from_minutes(time: &str, interval_max: f64) -> CadenceResult<Self> {
        if !interval_max.is_finite() || interval_max < 0.0 {
            return Err(CadenceError::configuration(format!(
                "invalid interval_max {}",
                interval_max
            )));
        }
        let centre = parse_time_of_day(time)?;
        let half_width = Duration::milliseconds((interval_max * 60_000.0).round() as i64);
        Ok(Self::new(centre, half_width))
    }

    /// Centre of the window.
    pub fn centre(&self) -> NaiveTime {
        self.centre
    }

    /// Half width of the window.
    pub fn half_width(&self) -> Duration {
        self.half_width
    }

    /// Whether `now` lies strictly inside the window. Windows crossing
    /// midnight wrap around.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.half_width <= Duration::zero() {
            return false;
        }
        if self.half_width >= Duration::hours(12) {
            return true;
        }

        let (lower, _) = self.centre.overflowing_sub_signed(self.half_width);
        let (upper, _) = self.centre.overflowing_add_signed(self.half_width);

        if lower < upper {
            now > lower && now < upper
        } else {
            now > lower || now < upper
        }
    }
}

/// Stable ordinal of a habit, its position in the habit document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitIndex(pub usize);

impl fmt::Display for HabitIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A habit tracked for automatic detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Habit {
    /// Position in the habit document.
    pub index: HabitIndex,
    /// Member intents, in document order.
    pub members: Vec<HabitMember>,
    /// Optional daily completion window.
    pub window: Option<TimeWindow>,
}

impl Habit {
    /// Build a tracked habit from its definition.
    ///
    /// A window is defined only when `interval_max` is set, in which case
    /// `time` is required.
    pub fn from_definition(index: usize, def: &HabitDefinition) -> CadenceResult<Self> {
        let window = match (def.interval_max, def.time.as_deref()) {
            (Some(minutes), Some(time)) => Some(TimeWindow::from_minutes(time, minutes)?),
            (Some(_), None) => {
                return Err(CadenceError::configuration(format!(
                    "habit {} has interval_max but no time",
                    index
                )))
            }
            (None, _) => None,
        };

        Ok(Self {
            index: HabitIndex(index),
            members: def.members.clone(),
            window,
        })
    }
}

/// An immutable, versioned view of all three rule sets.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    /// Monotonic version, bumped on every successful load.
    pub version: u64,
    /// When the rules were read.
    pub loaded_at: DateTime<Utc>,
    /// Ignore rules.
    pub ignore: Vec<IgnoreRule>,
    /// Trigger rules; a rule's id is its position.
    pub triggers: Vec<TriggerRule>,
    /// Habits eligible for automatic detection.
    pub habits: Vec<Habit>,
    /// Number of habits skipped because the user picked them.
    pub user_chosen: usize,
}

impl RuleSnapshot {
    /// Build a snapshot from raw definitions.
    ///
    /// Habit indices are positions in `definitions`, user-chosen habits keep
    /// their slot but are not tracked.
    pub fn build(
        ignore: Vec<IgnoreRule>,
        triggers: Vec<TriggerRule>,
        definitions: &[HabitDefinition],
    ) -> CadenceResult<Self> {
        let mut habits = Vec::new();
        let mut user_chosen = 0;

        for (index, def) in definitions.iter().enumerate() {
            if def.user_choice {
                user_chosen += 1;
                continue;
            }
            habits.push(Habit::from_definition(index, def)?);
        }

        Ok(Self {
            version: 0,
            loaded_at: Utc::now(),
            ignore,
            triggers,
            habits,
            user_chosen,
        })
    }

    /// An empty snapshot.
    pub fn empty() -> Self {
        Self {
            version: 0,
            loaded_at: Utc::now(),
            ignore: Vec::new(),
            triggers: Vec::new(),
            habits: Vec::new(),
            user_chosen: 0,
        }
    }

    /// Builder method to stamp a version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}
