use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};

/// A scalar (or list of scalars) carried by a filter condition, a bound
///  parameter or an entity field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
        }
    }
}

/// Dates always leave the crate as ISO-8601 calendar dates.
pub(crate) fn iso_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Timestamps always leave the crate as RFC 3339 in UTC with a `Z` suffix.
pub(crate) fn iso_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => s.serialize_none(),
            Value::Bool(b) => s.serialize_bool(*b),
            Value::Int(i) => s.serialize_i64(*i),
            Value::Float(f) => s.serialize_f64(*f),
            Value::Text(t) => s.serialize_str(t),
            Value::Date(d) => s.serialize_str(&iso_date(d)),
            Value::DateTime(dt) => s.serialize_str(&iso_datetime(dt)),
            Value::List(items) => s.collect_seq(items),
        }
    }
}

// Nested objects have no scalar counterpart; they travel as their JSON text.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            obj @ serde_json::Value::Object(_) => Value::Text(obj.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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
impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An entity flattened into its fields, in serialization order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Replaces the value of an existing field or appends a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_map(self.fields.iter().map(|(n, v)| (n, v)))
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(d)?;
        Record::try_from(json).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<serde_json::Value> for Record {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(Error::Serialization(format!(
                "entity must serialize to an object, got {other}"
            ))),
        }
    }
}

/// Anything a command can carry as a row. Every `Serialize` type qualifies;
///  its fields become record fields in serialization order.
pub trait Entity {
    fn to_record(&self) -> Result<Record>;
}

impl<T: Serialize + ?Sized> Entity for T {
    fn to_record(&self) -> Result<Record> {
        Record::try_from(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Customer {
        id: i64,
        name: &'static str,
        since: NaiveDate,
        tier: Option<&'static str>,
    }

    #[test]
    fn entity_fields_keep_declaration_order() {
        let record = Customer {
            id: 7,
            name: "Ada",
            since: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            tier: None,
        }
        .to_record()
        .unwrap();

        let names: Vec<_> = record.field_names().collect();
        assert_eq!(names, ["id", "name", "since", "tier"]);
        assert_eq!(record.get("id"), Some(&Value::Int(7)));
        assert_eq!(record.get("since"), Some(&Value::Text("2024-01-15".into())));
        assert_eq!(record.get("tier"), Some(&Value::Null));
    }

    #[test]
    fn scalar_entity_is_rejected() {
        let err = 42.to_record().unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn set_replaces_existing_field() {
        let mut record = Record::new().with("a", 1).with("b", 2);
        record.set("a", "x");
        assert_eq!(record.get("a"), Some(&Value::Text("x".into())));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn values_serialize_with_iso_temporals() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T08:30:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_value(Value::List(vec![
            Value::DateTime(dt),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        ]))
        .unwrap();
        assert_eq!(json, serde_json::json!(["2024-03-01T06:30:00Z", "2024-03-01"]));
    }

    #[test]
    fn json_numbers_prefer_integers() {
        let v: Value = serde_json::from_str("[1, 2.5, \"x\", null]").unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Text("x".into()),
                Value::Null
            ])
        );
    }
}
