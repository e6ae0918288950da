//! Field comparator.
//!
//! Compares one desired value against one observed value under a
//! [`FieldRule`]. Pure and side-effect free.

use serde_json::{Map, Number, Value};
use std::borrow::Cow;

use crate::model::{ComparisonMode, FieldRule, Provision, ValueKind};

/// Outcome of comparing a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Desired and observed match under the rule.
    Equal,
    /// Desired and observed differ.
    Differs,
}

/// Matching options that recursive comparisons carry along.
#[derive(Debug, Clone, Copy)]
struct Matcher {
    mode: ComparisonMode,
    case_insensitive: bool,
}

impl Comparison {
    /// Returns true for [`Comparison::Equal`].
    #[must_use]
    pub const fn is_equal(self) -> bool {
        matches!(self, Self::Equal)
    }

    const fn from_bool(equal: bool) -> Self {
        if equal { Self::Equal } else { Self::Differs }
    }
}

/// Compares a desired provision with an observed value.
///
/// Unprovided fields and `ignore` fields are always equal. An explicitly
/// empty provision is compared as the empty value of the field's kind. A
/// missing observed value counts as that same empty value.
#[must_use]
pub fn compare(desired: &Provision, observed: Option<&Value>, rule: &FieldRule<'_>) -> Comparison {
    if rule.mode == ComparisonMode::Ignore {
        return Comparison::Equal;
    }

    let desired = match desired {
        Provision::NotProvided => return Comparison::Equal,
        Provision::Empty => Cow::Owned(rule.kind.empty_value()),
        Provision::Value(v) => Cow::Borrowed(v),
    };

    let observed = match observed {
        None | Some(Value::Null) => Cow::Owned(rule.kind.empty_value()),
        Some(v) => Cow::Borrowed(v),
    };

    let matcher = Matcher {
        mode: rule.mode,
        case_insensitive: rule.case_insensitive,
    };

    let equal = match rule.kind {
        ValueKind::Scalar => matcher.value_eq(&desired, &observed),
        ValueKind::Mapping => match (desired.as_ref(), observed.as_ref()) {
            (Value::Object(d), Value::Object(o)) => matcher.mapping_eq(d, o),
            _ => false,
        },
        kind => match (desired.as_ref(), observed.as_ref()) {
            (Value::Array(d), Value::Array(o)) => {
                let d = normalize_elements(d, rule.key);
                let o = normalize_elements(o, rule.key);
                matcher.collection_eq(kind, &d, &o)
            }
            _ => false,
        },
    };

    Comparison::from_bool(equal)
}

/// Wraps scalar elements as `{key: element}` when an identity key is set.
fn normalize_elements<'a>(items: &'a [Value], key: Option<&str>) -> Cow<'a, [Value]> {
    let Some(key) = key else {
        return Cow::Borrowed(items);
    };
    if items.iter().all(|v| v.is_object() || v.is_array()) {
        return Cow::Borrowed(items);
    }
    Cow::Owned(
        items
            .iter()
            .map(|v| {
                if v.is_object() || v.is_array() {
                    v.clone()
                } else {
                    let mut map = Map::new();
                    map.insert(key.to_string(), v.clone());
                    Value::Object(map)
                }
            })
            .collect(),
    )
}

impl Matcher {
    /// Compares two arbitrary values: objects as mappings, arrays as
    /// ordered lists, everything else as scalars.
    fn value_eq(self, desired: &Value, observed: &Value) -> bool {
        match (desired, observed) {
            (Value::Object(d), Value::Object(o)) => self.mapping_eq(d, o),
            (Value::Array(d), Value::Array(o)) => self.ordered_eq(d, o),
            (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
                false
            }
            (d, o) => self.scalar_eq(d, o),
        }
    }

    /// Values of the same JSON type compare directly. Across types, `null`
    /// is the empty string, and a string matches a number or boolean it
    /// spells out.
    fn scalar_eq(self, desired: &Value, observed: &Value) -> bool {
        match (desired, observed) {
            (Value::String(d), Value::String(o)) => self.text_eq(d, o),
            (Value::Number(d), Value::Number(o)) => number_eq(d, o),
            (Value::Bool(d), Value::Bool(o)) => d == o,
            (Value::Null, Value::Null) => true,
            (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
            (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
                parse_number(s).is_some_and(|parsed| number_eq(&parsed, n))
            }
            (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => {
                self.text_eq(s, if *b { "true" } else { "false" })
            }
            _ => false,
        }
    }

    fn text_eq(self, desired: &str, observed: &str) -> bool {
        if self.case_insensitive {
            desired.eq_ignore_ascii_case(observed)
        } else {
            desired == observed
        }
    }

    fn mapping_eq(self, desired: &Map<String, Value>, observed: &Map<String, Value>) -> bool {
        let desired_match = desired
            .iter()
            .all(|(k, d)| self.value_eq(d, observed.get(k).unwrap_or(&Value::Null)));
        if !desired_match {
            return false;
        }

        match self.mode {
            ComparisonMode::Strict => observed
                .iter()
                .all(|(k, v)| desired.contains_key(k) || v.is_null()),
            ComparisonMode::AllowMorePresent | ComparisonMode::Ignore => true,
        }
    }

    fn collection_eq(self, kind: ValueKind, desired: &[Value], observed: &[Value]) -> bool {
        match kind {
            ValueKind::Set => self.set_eq(desired, observed),
            ValueKind::ListUnordered => self.multiset_eq(desired, observed),
            _ => self.ordered_eq(desired, observed),
        }
    }

    /// Duplicates are irrelevant: every desired element must be present, and
    /// under `strict` every observed element must be desired.
    fn set_eq(self, desired: &[Value], observed: &[Value]) -> bool {
        let covered = desired
            .iter()
            .all(|d| observed.iter().any(|o| self.value_eq(d, o)));
        if !covered {
            return false;
        }
        match self.mode {
            ComparisonMode::Strict => observed
                .iter()
                .all(|o| desired.iter().any(|d| self.value_eq(d, o))),
            ComparisonMode::AllowMorePresent | ComparisonMode::Ignore => true,
        }
    }

    /// Multiplicity matters: each observed element satisfies at most one
    /// desired element.
    fn multiset_eq(self, desired: &[Value], observed: &[Value]) -> bool {
        match self.mode {
            ComparisonMode::Strict if desired.len() != observed.len() => return false,
            _ if desired.len() > observed.len() => return false,
            _ => {}
        }
        self.max_matching(desired, observed) == desired.len()
    }

    fn ordered_eq(self, desired: &[Value], observed: &[Value]) -> bool {
        match self.mode {
            ComparisonMode::Strict => {
                desired.len() == observed.len()
                    && desired
                        .iter()
                        .zip(observed)
                        .all(|(d, o)| self.value_eq(d, o))
            }
            ComparisonMode::AllowMorePresent | ComparisonMode::Ignore => {
                let mut remaining = observed.iter();
                desired
                    .iter()
                    .all(|d| remaining.any(|o| self.value_eq(d, o)))
            }
        }
    }

    /// Size of a maximum bipartite matching between desired and observed
    /// elements, using augmenting paths.
    fn max_matching(self, desired: &[Value], observed: &[Value]) -> usize {
        let edges: Vec<Vec<usize>> = desired
            .iter()
            .map(|d| {
                observed
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| self.value_eq(d, o))
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();

        let mut owner: Vec<Option<usize>> = vec![None; observed.len()];
        let mut matched = 0;
        for i in 0..desired.len() {
            let mut visited = vec![false; observed.len()];
            if augment(i, &edges, &mut owner, &mut visited) {
                matched += 1;
            }
        }
        matched
    }
}

fn augment(
    i: usize,
    edges: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &j in &edges[i] {
        if visited[j] {
            continue;
        }
        visited[j] = true;
        let free = match owner[j] {
            None => true,
            Some(other) => augment(other, edges, owner, visited),
        };
        if free {
            owner[j] = Some(i);
            return true;
        }
    }
    false
}

/// Integers compare exactly; only non-integers go through `f64`.
fn number_eq(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    if a.is_f64() || b.is_f64() {
        return match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => false,
        };
    }
    false
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Number::from(u));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}
