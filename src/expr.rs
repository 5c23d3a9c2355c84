//! The expression model: immutable filter, projection, ordering, paging,
//! aggregation and join values that a command is composed from.
//!
//! Expressions carry no backend knowledge. Each type can check its own
//! structure with `validate`; translators call that before rendering.

use serde::{Deserialize, Deserializer};

use crate::{
    error::{Error, Result},
    operator::{Operator, STANDARD_OPERATORS},
    value::Value,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterCondition {
    pub property_name: String,
    #[serde(deserialize_with = "standard_operator")]
    pub operator: &'static Operator,
    #[serde(default)]
    pub value: Option<Value>,
}

fn standard_operator<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<&'static Operator, D::Error> {
    let name = String::deserialize(d)?;
    STANDARD_OPERATORS
        .get(&name)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown operator: {name}")))
}

impl FilterCondition {
    pub fn new(
        property_name: impl Into<String>,
        operator: &'static Operator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            operator,
            value: Some(value.into()),
        }
    }

    /// A condition for an operator that takes no value (IsNull, IsNotNull).
    pub fn unary(property_name: impl Into<String>, operator: &'static Operator) -> Self {
        Self {
            property_name: property_name.into(),
            operator,
            value: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let op = self.operator.name;
        if self.property_name.trim().is_empty() {
            return Err(Error::validation(format!(
                "{op} condition has an empty property name"
            )));
        }
        match (&self.value, self.operator.requires_value) {
            (None, true) => Err(Error::malformed(format!(
                "{op} on {} requires a value",
                self.property_name
            ))),
            (Some(_), false) => Err(Error::malformed(format!(
                "{op} on {} does not take a value",
                self.property_name
            ))),
            // Backends disagree on what comparing with NULL means
            (Some(Value::Null), true) => Err(Error::malformed(format!(
                "{op} on {} cannot compare with null; use IsNull or IsNotNull",
                self.property_name
            ))),
            (Some(Value::List(items)), true) if self.operator.expects_list => {
                if items.is_empty() {
                    Err(Error::malformed(format!(
                        "{op} on {} needs at least one value",
                        self.property_name
                    )))
                } else if items.iter().any(Value::is_null) {
                    Err(Error::malformed(format!(
                        "{op} on {} cannot list null; combine with IsNull instead",
                        self.property_name
                    )))
                } else {
                    Ok(())
                }
            }
            (Some(other), true) if self.operator.expects_list => Err(Error::malformed(format!(
                "{op} on {} expects a list, got {}",
                self.property_name,
                other.type_name()
            ))),
            (Some(Value::List(_)), true) => Err(Error::malformed(format!(
                "{op} on {} does not accept a list",
                self.property_name
            ))),
            _ => Ok(()),
        }
    }
}

/// A predicate tree. Conditions render first, then nested filters, each in
///  declared order, all joined by `logic`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterExpression {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
    #[serde(default)]
    pub nested_filters: Vec<FilterExpression>,
}

impl FilterExpression {
    pub fn new(logic: Logic) -> Self {
        Self {
            logic,
            conditions: Vec::new(),
            nested_filters: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(Logic::And)
    }

    pub fn or() -> Self {
        Self::new(Logic::Or)
    }

    pub fn with_condition(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Shorthand for `with_condition(FilterCondition::new(..))`.
    pub fn with(
        self,
        property_name: impl Into<String>,
        operator: &'static Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.with_condition(FilterCondition::new(property_name, operator, value))
    }

    pub fn with_nested(mut self, filter: FilterExpression) -> Self {
        self.nested_filters.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.nested_filters.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation(
                "filter has neither conditions nor nested filters",
            ));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        for nested in &self.nested_filters {
            nested.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectionField {
    pub property_name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectionExpression {
    pub fields: Vec<ProjectionField>,
}

impl ProjectionExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, property_name: impl Into<String>) -> Self {
        self.fields.push(ProjectionField {
            property_name: property_name.into(),
            alias: None,
        });
        self
    }

    pub fn field_as(mut self, property_name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.fields.push(ProjectionField {
            property_name: property_name.into(),
            alias: Some(alias.into()),
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::validation("projection lists no fields"));
        }
        for field in &self.fields {
            if field.property_name.trim().is_empty() {
                return Err(Error::validation("projection field has an empty name"));
            }
            if field.alias.as_deref().is_some_and(|a| a.trim().is_empty()) {
                return Err(Error::validation(format!(
                    "projection field {} has an empty alias",
                    field.property_name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderingField {
    pub property_name: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrderingExpression {
    pub fields: Vec<OrderingField>,
}

impl OrderingExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(self, property_name: impl Into<String>) -> Self {
        self.then(property_name, SortDirection::Ascending)
    }

    pub fn desc(self, property_name: impl Into<String>) -> Self {
        self.then(property_name, SortDirection::Descending)
    }

    pub fn then(mut self, property_name: impl Into<String>, direction: SortDirection) -> Self {
        self.fields.push(OrderingField {
            property_name: property_name.into(),
            direction,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::validation("ordering lists no fields"));
        }
        if self.fields.iter().any(|f| f.property_name.trim().is_empty()) {
            return Err(Error::validation("ordering field has an empty name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PagingExpression {
    #[serde(default)]
    pub skip: usize,
    pub take: usize,
}

impl PagingExpression {
    pub fn new(skip: usize, take: usize) -> Self {
        Self { skip, take }
    }

    pub fn validate(&self) -> Result<()> {
        if self.take < 1 {
            return Err(Error::malformed(format!(
                "paging take must be at least 1, got {}",
                self.take
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Average,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::CountDistinct => "countdistinct",
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// Property name that stands for "every row" in a `Count`.
pub const ALL_ROWS: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub property_name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Aggregate {
    pub fn alias_or_default(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None if self.property_name == ALL_ROWS => self.function.name().to_string(),
            None => format!("{}_{}", self.property_name, self.function.name()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AggregationExpression {
    pub aggregates: Vec<Aggregate>,
    #[serde(default)]
    pub group_by: Vec<String>,
}

impl AggregationExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_all(self) -> Self {
        self.with(AggregateFunction::Count, ALL_ROWS)
    }

    pub fn with(mut self, function: AggregateFunction, property_name: impl Into<String>) -> Self {
        self.aggregates.push(Aggregate {
            function,
            property_name: property_name.into(),
            alias: None,
        });
        self
    }

    pub fn with_alias(
        mut self,
        function: AggregateFunction,
        property_name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.aggregates.push(Aggregate {
            function,
            property_name: property_name.into(),
            alias: Some(alias.into()),
        });
        self
    }

    pub fn group_by(mut self, property_name: impl Into<String>) -> Self {
        self.group_by.push(property_name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.aggregates.is_empty() {
            return Err(Error::validation("aggregation lists no aggregates"));
        }
        for agg in &self.aggregates {
            if agg.property_name.trim().is_empty() {
                return Err(Error::validation("aggregate has an empty property name"));
            }
            if agg.property_name == ALL_ROWS && agg.function != AggregateFunction::Count {
                return Err(Error::malformed(format!(
                    "{} cannot be applied to every row",
                    agg.function.name()
                )));
            }
        }
        if self.group_by.iter().any(|g| g.trim().is_empty()) {
            return Err(Error::validation("group-by property has an empty name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// An equi-join against another container: `on` pairs a property of the
///  queried container with a property of the joined one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinExpression {
    #[serde(default)]
    pub kind: JoinKind,
    pub container_name: String,
    pub on: Vec<(String, String)>,
}

impl JoinExpression {
    pub fn inner(container_name: impl Into<String>) -> Self {
        Self::new(JoinKind::Inner, container_name)
    }

    pub fn left(container_name: impl Into<String>) -> Self {
        Self::new(JoinKind::Left, container_name)
    }

    fn new(kind: JoinKind, container_name: impl Into<String>) -> Self {
        Self {
            kind,
            container_name: container_name.into(),
            on: Vec::new(),
        }
    }

    pub fn on(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.on.push((left.into(), right.into()));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.container_name.trim().is_empty() {
            return Err(Error::validation("join target has an empty container name"));
        }
        if self.on.is_empty() {
            return Err(Error::validation(format!(
                "join with {} has no join columns",
                self.container_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{
        CONTAINS, EQUAL, GREATER_THAN, IN, IS_NULL, LESS_THAN_OR_EQUAL, NOT_EQUAL, Operator,
    };
    use test_case::test_case;

    #[test]
    fn empty_filter_level_is_rejected() {
        let filter = FilterExpression::or()
            .with("Status", &EQUAL, "Premium")
            .with_nested(FilterExpression::and());
        assert!(matches!(filter.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn in_requires_a_non_empty_list() {
        let scalar = FilterCondition::new("City", &IN, "NY");
        assert!(matches!(
            scalar.validate(),
            Err(Error::MalformedExpression(msg)) if msg.contains("expects a list")
        ));

        let empty = FilterCondition::new("City", &IN, Vec::<&str>::new());
        assert!(matches!(empty.validate(), Err(Error::MalformedExpression(_))));

        let ok = FilterCondition::new("City", &IN, vec!["NY", "LA"]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn value_presence_follows_operator() {
        let mut null_check = FilterCondition::unary("DeletedAt", &IS_NULL);
        assert!(null_check.validate().is_ok());
        null_check.value = Some(Value::Null);
        assert!(null_check.validate().is_err());

        let mut eq = FilterCondition::new("Id", &EQUAL, 1);
        eq.value = None;
        assert!(matches!(eq.validate(), Err(Error::MalformedExpression(_))));
    }

    #[test_case(&EQUAL ; "equal")]
    #[test_case(&NOT_EQUAL ; "not equal")]
    #[test_case(&GREATER_THAN ; "greater than")]
    #[test_case(&LESS_THAN_OR_EQUAL ; "less than or equal")]
    #[test_case(&CONTAINS ; "contains")]
    fn null_operands_point_to_null_checks(operator: &'static Operator) {
        let condition = FilterCondition::new("DeletedAt", operator, Value::Null);
        let Err(Error::MalformedExpression(message)) = condition.validate() else {
            panic!("{} accepted a null operand", operator.name);
        };
        assert!(message.contains("IsNull"), "{message}");
    }

    #[test]
    fn in_lists_reject_null_members() {
        let condition =
            FilterCondition::new("City", &IN, Value::List(vec!["NY".into(), Value::Null]));
        assert!(matches!(condition.validate(), Err(Error::MalformedExpression(_))));
    }

    #[test]
    fn paging_take_must_be_positive() {
        assert!(PagingExpression::new(0, 1).validate().is_ok());
        assert!(matches!(
            PagingExpression::new(5, 0).validate(),
            Err(Error::MalformedExpression(_))
        ));
    }

    #[test]
    fn aggregate_default_aliases() {
        let agg = AggregationExpression::new()
            .count_all()
            .with(AggregateFunction::Sum, "TotalSpent");
        let aliases: Vec<_> = agg.aggregates.iter().map(Aggregate::alias_or_default).collect();
        assert_eq!(aliases, ["count", "TotalSpent_sum"]);

        let bad = AggregationExpression::new().with(AggregateFunction::Sum, ALL_ROWS);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn filter_deserializes_with_operator_names() {
        let filter: FilterExpression = serde_json::from_str(
            r#"{
                "logic": "Or",
                "conditions": [{ "property_name": "Status", "operator": "equal", "value": "Premium" }],
                "nested_filters": [{
                    "conditions": [
                        { "property_name": "City", "operator": "In", "value": ["NY", "LA"] },
                        { "property_name": "Notes", "operator": "IsNull" }
                    ]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(filter.logic, Logic::Or);
        assert_eq!(filter.conditions[0].operator.name, "Equal");
        assert_eq!(filter.nested_filters[0].logic, Logic::And);
        assert_eq!(filter.nested_filters[0].conditions[1].value, None);
        assert!(filter.validate().is_ok());

        let unknown = serde_json::from_str::<FilterCondition>(
            r#"{ "property_name": "A", "operator": "Like", "value": "x" }"#,
        );
        assert!(unknown.unwrap_err().to_string().contains("unknown operator: Like"));
    }
}
