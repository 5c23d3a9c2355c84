use std::{fmt, path::PathBuf};

use crate::{
    command::{Command, CommandKind},
    error::{Error, Result},
    expr::{
        FilterCondition, FilterExpression, Logic, OrderingExpression, PagingExpression,
        ProjectionExpression,
    },
    operator::{Syntax, ValueFormat},
    value::{Entity, Record, Value},
};

pub mod file;
pub mod odata;
pub mod sql;

/// Names the family of backends a translator targets ("Sql", "Rest", "File").
pub trait Domain {
    fn domain_name(&self) -> &'static str;
}

/// Turns a backend-independent command into something one backend can run.
///
/// Implementations hold only immutable configuration, so one instance can be
///  shared across threads. Each call builds its own scratch state and either
///  returns a complete [`BackendCommand`] or an [`Error`]; nothing partial ever
///  escapes.
///
/// ```rust
/// # use command_expr::{command::{Command, Query}, dialect::Dialect,
/// #     expr::FilterExpression, operator::EQUAL,
/// #     translate::{BackendCommand, Translator, sql::SqlTranslator}};
/// let translator = SqlTranslator::new(Dialect::ansi());
/// let query: Command = Query::new("Customers")
///     .with_filter(FilterExpression::and().with("Status", &EQUAL, "Premium"))
///     .into();
///
/// let BackendCommand::Sql(sql) = translator.translate(&query).unwrap() else {
///     unreachable!()
/// };
/// assert_eq!(sql.command_text, "SELECT * FROM Customers WHERE Status = @p0");
/// ```
pub trait Translator<E: Entity = Record>: Domain + Send + Sync {
    fn translate(&self, command: &Command<E>) -> Result<BackendCommand>;
}

/// The output of translation, one variant per backend family.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Sql(SqlCommand),
    Rest(RestRequest),
    File(FileOperation),
    /// One command per bulk-insert partition, in order.
    Batch(CommandBatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandBatch {
    pub commands: Vec<BackendCommand>,
    pub continue_on_error: bool,
}

/// Bound parameters in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: Vec<(String, Value)>,
}

impl Parameters {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn values(&self) -> Vec<&Value> {
        self.entries.iter().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    pub command_text: String,
    pub parameters: Parameters,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperationKind {
    Read,
    Append,
    Overwrite,
}

/// A file operation with its expressions left unevaluated.
///
/// For `Overwrite`, `data` decides what happens to the rows `filter` matches:
///  with data they are replaced by it, without data they are removed. An
///  `Overwrite` with neither filter nor data truncates the file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOperation {
    pub path: PathBuf,
    pub operation: FileOperationKind,
    pub filter: Option<FilterExpression>,
    pub projection: Option<ProjectionExpression>,
    pub ordering: Option<OrderingExpression>,
    pub paging: Option<PagingExpression>,
    pub data: Option<Vec<Record>>,
}

/// Call-scoped scratch state: the placeholder counter and the parameters
///  bound so far. Created fresh for every `translate` call.
#[derive(Debug, Default)]
pub(crate) struct RenderContext {
    next_index: usize,
    parameters: Parameters,
}

impl RenderContext {
    pub(crate) fn next_name(&mut self) -> String {
        let name = format!("p{}", self.next_index);
        self.next_index += 1;
        name
    }

    /// Takes ownership of a fully rendered fragment's bindings and hands back
    ///  its text.
    pub(crate) fn merge(&mut self, fragment: Fragment) -> String {
        self.parameters.entries.extend(fragment.bindings);
        fragment.text
    }

    pub(crate) fn bind(&mut self, value: Value) -> String {
        let name = self.next_name();
        self.parameters.entries.push((name.clone(), value));
        name
    }

    pub(crate) fn into_parameters(self) -> Parameters {
        self.parameters
    }
}

/// Rendered text plus the parameters it refers to. Kept local to one level of
///  the filter recursion until that level has fully succeeded.
#[derive(Debug, Default)]
pub(crate) struct Fragment {
    pub text: String,
    pub bindings: Vec<(String, Value)>,
}

/// What the shared filter builder needs to know about a target syntax.
pub(crate) trait FilterSyntax {
    fn syntax(&self) -> Syntax;

    fn property(&self, name: &str) -> Result<String>;

    fn junction(&self, logic: Logic) -> &'static str;

    /// Placeholder text for a parameter name.
    fn placeholder(&self, name: &str) -> String;

    /// Last adjustment of a value before it is bound.
    fn bound_value(&self, value: Value) -> Value {
        value
    }
}

/// Renders a filter tree. Conditions come first, then nested filters in
///  parentheses, all in declared order.
pub(crate) fn build_filter<S: FilterSyntax>(
    syntax: &S,
    filter: &FilterExpression,
    cx: &mut RenderContext,
) -> Result<Fragment> {
    let mut parts = Vec::with_capacity(filter.conditions.len() + filter.nested_filters.len());
    let mut bindings = Vec::new();

    for condition in &filter.conditions {
        let fragment = build_condition(syntax, condition, cx)?;
        parts.push(fragment.text);
        bindings.extend(fragment.bindings);
    }
    for nested in &filter.nested_filters {
        let fragment = build_filter(syntax, nested, cx)?;
        parts.push(format!("({})", fragment.text));
        bindings.extend(fragment.bindings);
    }

    Ok(Fragment {
        text: parts.join(syntax.junction(filter.logic)),
        bindings,
    })
}

fn build_condition<S: FilterSyntax>(
    syntax: &S,
    condition: &FilterCondition,
    cx: &mut RenderContext,
) -> Result<Fragment> {
    condition.validate()?;
    let rendering = condition.operator.rendering(syntax.syntax())?;
    let property = syntax.property(&condition.property_name)?;

    // validate() guarantees a value is present exactly when the operator
    //  needs one, and that list operators got a non-empty list
    let values: Vec<&Value> = match (&condition.value, condition.operator.expects_list) {
        (None, _) => Vec::new(),
        (Some(Value::List(items)), true) => items.iter().collect(),
        (Some(v), _) => vec![v],
    };

    let mut bindings = Vec::new();
    let operands = match rendering.value {
        ValueFormat::None => Vec::new(),
        ValueFormat::Literal(format) => values
            .into_iter()
            .map(format)
            .collect::<Result<Vec<_>>>()?,
        ValueFormat::Bind(bind) => {
            let base = cx.next_name();
            let mut placeholders = Vec::with_capacity(values.len());
            for (i, value) in values.into_iter().enumerate() {
                let name = if condition.operator.expects_list {
                    format!("{base}_{i}")
                } else {
                    base.clone()
                };
                placeholders.push(syntax.placeholder(&name));
                bindings.push((name, syntax.bound_value(bind(value)?)));
            }
            placeholders
        }
    };

    Ok(Fragment {
        text: (rendering.template)(&property, &operands),
        bindings,
    })
}

/// Flattens an entity, refusing entities without fields.
pub(crate) fn entity_record<E: Entity>(entity: &E, kind: CommandKind) -> Result<Record> {
    let record = entity.to_record()?;
    if record.is_empty() {
        return Err(Error::validation(format!("{kind} entity has no fields")));
    }
    Ok(record)
}

pub(crate) fn key_value<'r>(record: &'r Record, key_property: &str) -> Result<&'r Value> {
    match record.get(key_property) {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(Error::validation(format!(
            "Update entity has no value for key property {key_property}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{EQUAL, GREATER_THAN, IN, IS_NULL};

    struct Plain;

    impl FilterSyntax for Plain {
        fn syntax(&self) -> Syntax {
            Syntax::Sql
        }
        fn property(&self, name: &str) -> Result<String> {
            Ok(name.to_string())
        }
        fn junction(&self, logic: Logic) -> &'static str {
            match logic {
                Logic::And => " AND ",
                Logic::Or => " OR ",
            }
        }
        fn placeholder(&self, name: &str) -> String {
            format!(":{name}")
        }
    }

    #[test]
    fn placeholders_follow_render_order() {
        let filter = FilterExpression::and()
            .with("A", &EQUAL, 1)
            .with_condition(FilterCondition::unary("B", &IS_NULL))
            .with("C", &IN, vec![2, 3])
            .with_nested(FilterExpression::or().with("D", &GREATER_THAN, 4));

        let mut cx = RenderContext::default();
        let fragment = build_filter(&Plain, &filter, &mut cx).unwrap();
        let text = cx.merge(fragment);
        assert_eq!(
            text,
            "A = :p0 AND B IS NULL AND C IN (:p1_0, :p1_1) AND (D > :p2)"
        );
        let params = cx.into_parameters();
        assert_eq!(params.names(), ["p0", "p1_0", "p1_1", "p2"]);
        assert_eq!(params.get("p1_1"), Some(&Value::Int(3)));
    }

    #[test]
    fn failure_deep_in_the_tree_exposes_nothing() {
        let filter = FilterExpression::and()
            .with("A", &EQUAL, 1)
            .with_nested(FilterExpression::and().with("B", &IN, "not a list"));

        let mut cx = RenderContext::default();
        assert!(build_filter(&Plain, &filter, &mut cx).is_err());
        assert!(cx.into_parameters().is_empty());
    }

    #[test]
    fn key_must_be_present_and_non_null() {
        let record = Record::new().with("Id", Value::Null).with("Name", "x");
        assert!(key_value(&record, "Id").is_err());
        assert!(key_value(&record, "Key").is_err());
        assert_eq!(key_value(&record, "Name").unwrap(), &Value::from("x"));
    }
}
