//! In-memory evaluation of expressions against records.
//!
//! The file domain has no query engine, so these are the semantics a file
//! connection applies to the expressions a [`FileOperation`] passes through.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    error::{Error, Result},
    expr::{
        FilterCondition, FilterExpression, Logic, OrderingExpression, PagingExpression,
        ProjectionExpression, SortDirection,
    },
    translate::{FileOperation, FileOperationKind},
    value::{Record, Value},
};

/// Syntax name reported when an operator has no in-memory semantics.
pub const IN_MEMORY: &str = "InMemory";

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Orders two values, or `None` when they cannot be compared. Null compares
///  with nothing. Int and Float compare numerically; text holding an ISO date
///  or timestamp compares with the matching temporal value.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => int_float_cmp(*a, *b),
        (Value::Float(a), Value::Int(b)) => int_float_cmp(*b, *a).map(Ordering::reverse),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        // Serialized entities carry temporals as text
        (Value::Text(a), Value::Date(b)) => parse_date(a).map(|a| a.cmp(b)),
        (Value::Date(a), Value::Text(b)) => parse_date(b).map(|b| a.cmp(&b)),
        (Value::Text(a), Value::DateTime(b)) => parse_datetime(a).map(|a| a.cmp(b)),
        (Value::DateTime(a), Value::Text(b)) => parse_datetime(b).map(|b| a.cmp(&b)),
        _ => None,
    }
}

// i64 spans [-2^63, 2^63)
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a float; `None` only for NaN.
fn int_float_cmp(i: i64, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f >= I64_BOUND {
        return Some(Ordering::Less);
    }
    if f < -I64_BOUND {
        return Some(Ordering::Greater);
    }
    // In range, the integral part converts exactly and the fraction is exact
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(f - whole)),
        other => Some(other),
    }
}

// Total order used for sorting: the kind of value first, then the value.
//  Nulls come first; NaN sorts after every other number.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Text(_) => 3,
        Value::Date(_) | Value::DateTime(_) => 4,
        Value::List(_) => 5,
    }
}

fn float_total_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn instant_of(value: &Value) -> Option<(DateTime<Utc>, u8)> {
    match value {
        Value::Date(d) => Some((d.and_time(chrono::NaiveTime::MIN).and_utc(), 0)),
        Value::DateTime(dt) => Some((*dt, 1)),
        _ => None,
    }
}

pub(crate) fn sort_cmp(left: &Value, right: &Value) -> Ordering {
    let by_kind = kind_rank(left).cmp(&kind_rank(right));
    if by_kind != Ordering::Equal {
        return by_kind;
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => float_total_cmp(*a, *b),
        (Value::Int(a), Value::Float(b)) => int_float_cmp(*a, *b).unwrap_or(Ordering::Less),
        (Value::Float(a), Value::Int(b)) => {
            int_float_cmp(*b, *a).map_or(Ordering::Greater, Ordering::reverse)
        }
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::List(a), Value::List(b)) => a
            .iter()
            .zip(b)
            .map(|(l, r)| sort_cmp(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (l, r) => instant_of(l).cmp(&instant_of(r)),
    }
}

pub(crate) fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::Text(s) => Some(s),
        _ => None,
    }
}

impl FilterCondition {
    /// A field missing from the record evaluates as null.
    pub fn matches(&self, row: &Record) -> Result<bool> {
        self.validate()?;
        let predicate = self.operator.evaluate.ok_or_else(|| Error::UnsupportedOperator {
            operator: self.operator.name.to_string(),
            syntax: IN_MEMORY.to_string(),
        })?;
        let field = row.get(&self.property_name).unwrap_or(&Value::Null);
        Ok(predicate(field, self.value.as_ref()))
    }
}

impl FilterExpression {
    pub fn matches(&self, row: &Record) -> Result<bool> {
        self.validate()?;
        self.eval(row)
    }

    // Every branch is evaluated so an unsupported operator fails regardless
    //  of the data
    fn eval(&self, row: &Record) -> Result<bool> {
        let mut outcomes = Vec::with_capacity(self.conditions.len() + self.nested_filters.len());
        for condition in &self.conditions {
            outcomes.push(condition.matches(row)?);
        }
        for nested in &self.nested_filters {
            outcomes.push(nested.eval(row)?);
        }
        Ok(match self.logic {
            Logic::And => outcomes.iter().all(|&b| b),
            Logic::Or => outcomes.iter().any(|&b| b),
        })
    }
}

impl ProjectionExpression {
    /// Picks the projected fields, renamed to their aliases. Missing fields
    ///  come back as null.
    pub fn apply(&self, row: &Record) -> Record {
        self.fields
            .iter()
            .map(|f| {
                let name = f.alias.as_deref().unwrap_or(&f.property_name);
                let value = row.get(&f.property_name).cloned().unwrap_or(Value::Null);
                (name, value)
            })
            .collect()
    }
}

impl OrderingExpression {
    /// Stable sort over a total order. Values of different kinds sort as
    ///  null, bool, number, text, temporal, list; nulls therefore come first
    ///  when ascending. Numbers compare exactly across Int and Float and NaN
    ///  sorts after every other number.
    pub fn sort(&self, rows: &mut [Record]) {
        rows.sort_by(|a, b| {
            for field in &self.fields {
                let l = a.get(&field.property_name).unwrap_or(&Value::Null);
                let r = b.get(&field.property_name).unwrap_or(&Value::Null);
                let ord = sort_cmp(l, r);
                let ord = match field.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

impl PagingExpression {
    /// The rows at positions `[skip, skip + take)`, clipped to the input.
    pub fn window<'a, T>(&self, rows: &'a [T]) -> &'a [T] {
        let start = self.skip.min(rows.len());
        let end = start.saturating_add(self.take).min(rows.len());
        &rows[start..end]
    }
}

impl FileOperation {
    /// Applies the operation to the current contents of the file and returns
    ///  the rows a `Read` yields or the new contents for a write.
    pub fn apply(&self, rows: Vec<Record>) -> Result<Vec<Record>> {
        match self.operation {
            FileOperationKind::Read => self.read(rows),
            FileOperationKind::Append => {
                let mut rows = rows;
                rows.extend(self.data.iter().flatten().cloned());
                Ok(rows)
            }
            FileOperationKind::Overwrite => self.overwrite(rows),
        }
    }

    fn read(&self, rows: Vec<Record>) -> Result<Vec<Record>> {
        let mut selected = match &self.filter {
            Some(filter) => {
                filter.validate()?;
                let mut selected = Vec::new();
                for row in rows {
                    if filter.eval(&row)? {
                        selected.push(row);
                    }
                }
                selected
            }
            None => rows,
        };
        if let Some(ordering) = &self.ordering {
            ordering.sort(&mut selected);
        }
        let page = match &self.paging {
            Some(paging) => paging.window(&selected),
            None => &selected[..],
        };
        Ok(match &self.projection {
            Some(projection) => page.iter().map(|r| projection.apply(r)).collect(),
            None => page.to_vec(),
        })
    }

    // Matching rows are dropped and `data` takes the place of the first one;
    //  without a filter every row matches.
    fn overwrite(&self, rows: Vec<Record>) -> Result<Vec<Record>> {
        let data = self.data.iter().flatten().cloned();
        let Some(filter) = &self.filter else {
            return Ok(data.collect());
        };
        filter.validate()?;

        let mut kept = Vec::with_capacity(rows.len());
        let mut first_match = None;
        for row in rows {
            if filter.eval(&row)? {
                first_match.get_or_insert(kept.len());
            } else {
                kept.push(row);
            }
        }
        if let Some(at) = first_match {
            kept.splice(at..at, data);
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::{Command, Delete, Query, Update},
        operator::{
            CONTAINS, EQUAL, GREATER_THAN_OR_EQUAL, IN, IS_NULL, LESS_THAN, Operator, Rendering,
            Syntax, ValueFormat,
        },
        translate::{BackendCommand, Translator, file::FileTranslator},
    };

    fn customers() -> Vec<Record> {
        vec![
            Record::new().with("Id", 1).with("Name", "Ada").with("City", "NY").with("TotalSpent", 12_000.5).with("IsActive", true),
            Record::new().with("Id", 2).with("Name", "Bo").with("City", "LA").with("TotalSpent", 300).with("IsActive", true),
            Record::new().with("Id", 3).with("Name", "Cy").with("City", "NY").with("TotalSpent", Value::Null).with("IsActive", false),
            Record::new().with("Id", 4).with("Name", "Di").with("City", "Rome").with("TotalSpent", 10_000).with("IsActive", true),
        ]
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter()
            .map(|r| match r.get("Id") {
                Some(Value::Int(i)) => *i,
                other => panic!("bad id {other:?}"),
            })
            .collect()
    }

    fn file_op(command: Command) -> FileOperation {
        match FileTranslator::new("/data", "jsonl").translate(&command).unwrap() {
            BackendCommand::File(op) => op,
            other => panic!("expected a file operation, got {other:?}"),
        }
    }

    #[test]
    fn numeric_comparison_crosses_int_and_float() {
        assert_eq!(compare(&Value::Int(2), &Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(compare(&Value::Float(3.0), &Value::Int(3)), Some(Ordering::Equal));
        assert_eq!(compare(&Value::Null, &Value::Null), None);
        assert_eq!(compare(&Value::from("1"), &Value::Int(1)), None);
    }

    #[test]
    fn temporal_text_compares_with_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(compare(&Value::from("2024-04-30"), &date.into()), Some(Ordering::Less));
        let ts = parse_datetime("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(
            compare(&ts.into(), &Value::from("2024-05-01T12:00:00+02:00")),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn nested_filter_matches() {
        let filter = FilterExpression::or().with("City", &EQUAL, "Rome").with_nested(
            FilterExpression::and()
                .with("TotalSpent", &GREATER_THAN_OR_EQUAL, 10_000)
                .with("IsActive", &EQUAL, true),
        );
        let matched: Vec<_> = customers()
            .into_iter()
            .filter(|r| filter.matches(r).unwrap())
            .collect();
        assert_eq!(ids(&matched), [1, 4]);
    }

    #[test]
    fn missing_fields_are_null() {
        let row = Record::new().with("Id", 1);
        assert!(FilterCondition::unary("Email", &IS_NULL).matches(&row).unwrap());
        assert!(!FilterCondition::new("Email", &CONTAINS, "@").matches(&row).unwrap());
    }

    #[test]
    fn operator_without_semantics_is_unsupported() {
        static SOUNDS_LIKE: Operator = Operator {
            name: "SoundsLike",
            requires_value: true,
            expects_list: false,
            renderings: &[Rendering {
                syntax: Syntax::Sql,
                template: |p, o| format!("SOUNDEX({p}) = SOUNDEX({})", o[0]),
                value: ValueFormat::Bind(|v| Ok(v.clone())),
            }],
            evaluate: None,
        };
        let filter = FilterExpression::and().with("Name", &SOUNDS_LIKE, "Ada");
        assert_eq!(
            filter.matches(&customers()[0]),
            Err(Error::UnsupportedOperator {
                operator: "SoundsLike".into(),
                syntax: "InMemory".into()
            })
        );
    }

    #[test]
    fn sort_puts_nulls_first_and_breaks_ties() {
        let mut rows = customers();
        OrderingExpression::new().asc("TotalSpent").sort(&mut rows);
        assert_eq!(ids(&rows), [3, 2, 4, 1]);

        OrderingExpression::new().asc("City").desc("Id").sort(&mut rows);
        assert_eq!(ids(&rows), [2, 3, 1, 4]);
    }

    #[test]
    fn mixed_kinds_sort_in_a_total_order() {
        let keys = [
            Value::Int(2),
            Value::from("x"),
            Value::Int(1),
            Value::Float(f64::NAN),
            Value::Null,
            Value::Float(1.5),
            Value::Bool(true),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        ];
        let mut rows: Vec<_> = keys
            .into_iter()
            .enumerate()
            .map(|(i, k)| Record::new().with("Id", i as i64).with("K", k))
            .collect();

        OrderingExpression::new().asc("K").sort(&mut rows);
        assert_eq!(ids(&rows), [4, 6, 2, 5, 0, 3, 1, 7]);

        OrderingExpression::new().desc("K").sort(&mut rows);
        assert_eq!(ids(&rows), [7, 1, 3, 0, 5, 2, 6, 4]);
    }

    #[test]
    fn many_rows_with_nan_and_text_keep_numbers_sorted() {
        let mut rows: Vec<_> = (0..200i64)
            .map(|i| {
                let k = match i % 4 {
                    0 => Value::Int((i * 37) % 101),
                    1 => Value::from(format!("t{}", i % 7)),
                    2 => Value::Float(f64::NAN),
                    _ => Value::Float(((i * 13) % 97) as f64 + 0.5),
                };
                Record::new().with("K", k)
            })
            .collect();
        OrderingExpression::new().asc("K").sort(&mut rows);

        let keys: Vec<&Value> = rows.iter().map(|r| r.get("K").unwrap()).collect();
        for pair in keys.windows(2) {
            assert!(sort_cmp(pair[0], pair[1]).is_le(), "{:?} before {:?}", pair[0], pair[1]);
        }
        let numbers: Vec<f64> = keys
            .iter()
            .filter_map(|k| match k {
                Value::Int(i) => Some(*i as f64),
                Value::Float(f) if !f.is_nan() => Some(*f),
                _ => None,
            })
            .collect();
        assert!(numbers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn large_integers_compare_exactly_with_floats() {
        let two_53 = 9_007_199_254_740_992_i64;
        assert_eq!(
            compare(&Value::Int(two_53 + 1), &Value::Float(two_53 as f64)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare(&Value::Float(two_53 as f64), &Value::Int(two_53 + 1)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(&Value::Int(i64::MAX), &Value::Float(i64::MAX as f64)),
            Some(Ordering::Less)
        );
        assert_eq!(compare(&Value::Int(-2), &Value::Float(-2.5)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::Int(-3), &Value::Float(-2.5)), Some(Ordering::Less));
        assert_eq!(compare(&Value::Int(1), &Value::Float(f64::NAN)), None);

        let row = Record::new().with("Key", two_53 as f64);
        let condition = FilterCondition::new("Key", &EQUAL, two_53 + 1);
        assert!(!condition.matches(&row).unwrap());
    }

    #[test]
    fn window_clips_to_the_input() {
        let rows = [1, 2, 3, 4, 5];
        assert_eq!(PagingExpression::new(1, 2).window(&rows), [2, 3]);
        assert_eq!(PagingExpression::new(4, 10).window(&rows), [5]);
        assert!(PagingExpression::new(9, 1).window(&rows).is_empty());
    }

    #[test]
    fn read_filters_orders_pages_then_projects() {
        let op = file_op(
            Query::new("customers")
                .with_filter(FilterExpression::and().with("IsActive", &EQUAL, true))
                .with_ordering(OrderingExpression::new().desc("TotalSpent"))
                .with_paging(1, 5)
                .with_projection(ProjectionExpression::new().field("Id").field_as("Name", "Customer"))
                .into(),
        );
        let rows = op.apply(customers()).unwrap();
        assert_eq!(
            rows,
            [
                Record::new().with("Id", 4).with("Customer", "Di"),
                Record::new().with("Id", 2).with("Customer", "Bo"),
            ]
        );
    }

    #[test]
    fn update_replaces_the_keyed_row_in_place() {
        let op = file_op(
            Update::new("customers", Record::new().with("Id", 2).with("Name", "Bea")).into(),
        );
        let rows = op.apply(customers()).unwrap();
        assert_eq!(ids(&rows), [1, 2, 3, 4]);
        assert_eq!(rows[1], Record::new().with("Id", 2).with("Name", "Bea"));

        let missing = file_op(Update::new("customers", Record::new().with("Id", 9)).into());
        assert_eq!(missing.apply(customers()).unwrap(), customers());
    }

    #[test]
    fn delete_removes_matches_or_truncates() {
        let some = file_op(
            Delete::matching("customers", FilterExpression::and().with("City", &IN, vec!["NY"]))
                .into(),
        );
        assert_eq!(ids(&some.apply(customers()).unwrap()), [2, 4]);

        let all = file_op(Delete::all("customers").into());
        assert!(all.apply(customers()).unwrap().is_empty());
    }

    #[test]
    fn append_keeps_existing_rows() {
        let op = file_op(
            crate::command::Insert::new("customers", Record::new().with("Id", 5)).into(),
        );
        assert_eq!(ids(&op.apply(customers()).unwrap()), [1, 2, 3, 4, 5]);
    }

    #[test]
    fn invalid_filter_fails_instead_of_matching() {
        let filter = FilterExpression::and().with("Id", &LESS_THAN, vec![1, 2]);
        assert!(matches!(
            filter.matches(&customers()[0]),
            Err(Error::MalformedExpression(_))
        ));
    }
}
