//! Field values carried by entity records: scalars, references and collections.

use crate::entity::Entity;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;

/// A scalar column value. `DateTime` is always UTC.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(i64::from(*n)),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::Time(t) => write!(f, "{}", t),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Value::Time(t)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// How a reference field points at its target: by the target's key, or by a
/// live instance that may still need to be written.
#[derive(Clone, Debug)]
pub enum Reference {
    ByKey(Value),
    ByValue(Entity),
}

impl Reference {
    /// The foreign key this reference stores; `Null` when the target has no key yet.
    pub fn key_value(&self) -> Value {
        match self {
            Reference::ByKey(v) => v.clone(),
            Reference::ByValue(target) => target
                .key()
                .and_then(|k| k.into_single())
                .unwrap_or(Value::Null),
        }
    }

    pub fn target(&self) -> Option<&Entity> {
        match self {
            Reference::ByKey(_) => None,
            Reference::ByValue(target) => Some(target),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reference::ByValue(a), Reference::ByValue(b)) => Entity::ptr_eq(a, b),
            _ => self.key_value() == other.key_value(),
        }
    }
}

/// Contents of one field slot on a record.
#[derive(Clone, Debug)]
pub enum Datum {
    Value(Value),
    Reference(Reference),
    Many(Vec<Entity>),
}

impl Datum {
    /// The column value this datum persists as. Collections have none.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Datum::Value(v) => Some(v.clone()),
            Datum::Reference(r) => Some(r.key_value()),
            Datum::Many(_) => None,
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Value(a), Datum::Value(b)) => a == b,
            (Datum::Reference(a), Datum::Reference(b)) => a == b,
            (Datum::Many(a), Datum::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Entity::ptr_eq(x, y))
            }
            _ => false,
        }
    }
}

macro_rules! datum_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Datum {
                fn from(v: $ty) -> Self {
                    Datum::Value(v.into())
                }
            }
        )*
    };
}

datum_from_scalar!(
    Value,
    i32,
    i64,
    &str,
    String,
    NaiveDate,
    NaiveTime,
    DateTime<Utc>,
);

impl From<Reference> for Datum {
    fn from(r: Reference) -> Self {
        Datum::Reference(r)
    }
}

impl From<Entity> for Datum {
    fn from(e: Entity) -> Self {
        Datum::Reference(Reference::ByValue(e))
    }
}

impl From<&Entity> for Datum {
    fn from(e: &Entity) -> Self {
        Datum::Reference(Reference::ByValue(e.clone()))
    }
}

impl From<Vec<Entity>> for Datum {
    fn from(items: Vec<Entity>) -> Self {
        Datum::Many(items)
    }
}

/// The ordered key parts identifying one row.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyValue(Vec<Value>);

impl KeyValue {
    pub fn new(parts: Vec<Value>) -> Self {
        KeyValue(parts)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every part holds a value.
    pub fn is_complete(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|v| !v.is_null())
    }

    pub fn into_parts(self) -> Vec<Value> {
        self.0
    }

    /// The sole part of a single-field key.
    pub fn into_single(self) -> Option<Value> {
        let mut parts = self.0;
        if parts.len() == 1 {
            parts.pop()
        } else {
            None
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{}", single),
            parts => {
                f.write_str("(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<Value> for KeyValue {
    fn from(v: Value) -> Self {
        KeyValue(vec![v])
    }
}

impl From<Vec<Value>> for KeyValue {
    fn from(parts: Vec<Value>) -> Self {
        KeyValue(parts)
    }
}

impl From<i32> for KeyValue {
    fn from(n: i32) -> Self {
        KeyValue(vec![Value::Int(n)])
    }
}

impl From<i64> for KeyValue {
    fn from(n: i64) -> Self {
        KeyValue(vec![Value::Long(n)])
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue(vec![Value::from(s)])
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for KeyValue {
    fn from((a, b): (A, B)) -> Self {
        KeyValue(vec![a.into(), b.into()])
    }
}
