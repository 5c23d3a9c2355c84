//! Relational dialect strategies.
//!
//! Everything that differs between SQL engines lives behind small strategy
//! objects fixed when a translator is built: how identifiers are quoted, how
//! a page of rows is requested, how booleans are bound. The filter,
//! projection and ordering logic never looks at which engine it targets.

use std::{fmt, sync::Arc};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    expr::PagingExpression,
    value::Value,
};

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

pub trait IdentifierQuoting: fmt::Debug + Send + Sync {
    /// Quotes one unqualified name.
    fn quote_part(&self, part: &str) -> Result<String>;
}

fn wrap_escaped(part: &str, open: char, close: char) -> String {
    let mut res = String::with_capacity(part.len() + 2);
    res.push(open);
    for c in part.chars() {
        if c == close {
            res.push(close);
        }
        res.push(c);
    }
    res.push(close);
    res
}

/// `[name]`, SQL Server.
#[derive(Debug, Clone, Copy)]
pub struct Brackets;

impl IdentifierQuoting for Brackets {
    fn quote_part(&self, part: &str) -> Result<String> {
        Ok(wrap_escaped(part, '[', ']'))
    }
}

/// `"name"`, PostgreSQL and SQLite.
#[derive(Debug, Clone, Copy)]
pub struct DoubleQuotes;

impl IdentifierQuoting for DoubleQuotes {
    fn quote_part(&self, part: &str) -> Result<String> {
        Ok(wrap_escaped(part, '"', '"'))
    }
}

/// `` `name` ``, MySQL.
#[derive(Debug, Clone, Copy)]
pub struct Backticks;

impl IdentifierQuoting for Backticks {
    fn quote_part(&self, part: &str) -> Result<String> {
        Ok(wrap_escaped(part, '`', '`'))
    }
}

/// Names are emitted bare, so they must be plain identifiers.
#[derive(Debug, Clone, Copy)]
pub struct Unquoted;

impl IdentifierQuoting for Unquoted {
    fn quote_part(&self, part: &str) -> Result<String> {
        if PLAIN_IDENTIFIER.is_match(part) {
            Ok(part.to_string())
        } else {
            Err(Error::validation(format!("{part:?} is not a plain identifier")))
        }
    }
}

pub trait PagingStrategy: fmt::Debug + Send + Sync {
    fn clause(&self, paging: &PagingExpression) -> String;

    /// Whether the clause is only legal after an ORDER BY.
    fn requires_ordering(&self) -> bool {
        false
    }
}

/// `OFFSET n ROWS FETCH NEXT m ROWS ONLY`
#[derive(Debug, Clone, Copy)]
pub struct OffsetFetch;

impl PagingStrategy for OffsetFetch {
    fn clause(&self, paging: &PagingExpression) -> String {
        format!(
            "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            paging.skip, paging.take
        )
    }

    fn requires_ordering(&self) -> bool {
        true
    }
}

/// `LIMIT m OFFSET n`
#[derive(Debug, Clone, Copy)]
pub struct LimitOffset;

impl PagingStrategy for LimitOffset {
    fn clause(&self, paging: &PagingExpression) -> String {
        format!("LIMIT {} OFFSET {}", paging.take, paging.skip)
    }
}

/// `$skip=n&$top=m`, OData system query options.
#[derive(Debug, Clone, Copy)]
pub struct SkipTop;

impl PagingStrategy for SkipTop {
    fn clause(&self, paging: &PagingExpression) -> String {
        format!("$skip={}&$top={}", paging.skip, paging.take)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanStyle {
    /// Bound as native booleans (`TRUE` / `FALSE`).
    Keywords,
    /// Bound as `1` / `0` for engines that store booleans as integers.
    Numeric,
}

impl BooleanStyle {
    pub fn bind(&self, value: Value) -> Value {
        match (self, value) {
            (BooleanStyle::Numeric, Value::Bool(b)) => Value::Int(i64::from(b)),
            (_, v) => v,
        }
    }
}

/// A relational engine's syntax, fixed at translator construction.
///
/// Placeholders are spelled `{parameter_prefix}{name}` (`@p0`, `@p1_0`) in
/// every preset. That assumes a driver binding parameters by name, as ADO.NET
/// providers, Npgsql and MySqlConnector do. Engines whose native form is
/// positional (`$1` on PostgreSQL, `?` on MySQL and SQLite) need such a driver
/// or a different prefix through [`Dialect::with_parameter_prefix`];
/// [`SqlCommand::parameters`](crate::translate::SqlCommand) keeps the binding
/// order either way.
///
/// `max_parameters` is the most parameters one statement may bind on the
/// engine. The SQL translator refuses statements past it.
#[derive(Debug, Clone)]
pub struct Dialect {
    pub name: &'static str,
    pub quoting: Arc<dyn IdentifierQuoting>,
    pub paging: Arc<dyn PagingStrategy>,
    pub booleans: BooleanStyle,
    pub parameter_prefix: char,
    pub max_parameters: Option<usize>,
}

impl Dialect {
    pub fn sql_server() -> Self {
        Self {
            name: "sqlserver",
            quoting: Arc::new(Brackets),
            paging: Arc::new(OffsetFetch),
            booleans: BooleanStyle::Numeric,
            parameter_prefix: '@',
            max_parameters: Some(2_100),
        }
    }

    pub fn postgres() -> Self {
        Self {
            name: "postgres",
            quoting: Arc::new(DoubleQuotes),
            paging: Arc::new(LimitOffset),
            booleans: BooleanStyle::Keywords,
            parameter_prefix: '@',
            max_parameters: Some(65_535),
        }
    }

    pub fn mysql() -> Self {
        Self {
            name: "mysql",
            quoting: Arc::new(Backticks),
            paging: Arc::new(LimitOffset),
            booleans: BooleanStyle::Numeric,
            parameter_prefix: '@',
            max_parameters: Some(65_535),
        }
    }

    pub fn sqlite() -> Self {
        Self {
            name: "sqlite",
            quoting: Arc::new(DoubleQuotes),
            paging: Arc::new(LimitOffset),
            booleans: BooleanStyle::Numeric,
            parameter_prefix: '@',
            max_parameters: Some(32_766),
        }
    }

    /// Bare identifiers and `OFFSET … FETCH`, the SQL:2008 spelling.
    pub fn ansi() -> Self {
        Self {
            name: "ansi",
            quoting: Arc::new(Unquoted),
            paging: Arc::new(OffsetFetch),
            booleans: BooleanStyle::Keywords,
            parameter_prefix: '@',
            max_parameters: None,
        }
    }

    pub fn with_parameter_prefix(mut self, prefix: char) -> Self {
        self.parameter_prefix = prefix;
        self
    }

    pub fn with_max_parameters(mut self, max_parameters: Option<usize>) -> Self {
        self.max_parameters = max_parameters;
        self
    }

    /// Quotes a possibly qualified name (`Orders.Total`) part by part.
    pub fn quote(&self, name: &str) -> Result<String> {
        let parts = name
            .split('.')
            .map(|part| {
                if part.is_empty() {
                    Err(Error::validation(format!("{name:?} has an empty name part")))
                } else {
                    self.quoting.quote_part(part)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join("."))
    }

    pub fn placeholder(&self, name: &str) -> String {
        format!("{}{name}", self.parameter_prefix)
    }
}

/// Dialect names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectName {
    SqlServer,
    Postgres,
    MySql,
    Sqlite,
    Ansi,
}

impl DialectName {
    pub fn dialect(self) -> Dialect {
        match self {
            DialectName::SqlServer => Dialect::sql_server(),
            DialectName::Postgres => Dialect::postgres(),
            DialectName::MySql => Dialect::mysql(),
            DialectName::Sqlite => Dialect::sqlite(),
            DialectName::Ansi => Dialect::ansi(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Dialect::sql_server(), "[Orders].[Total]", "[we]]ird]")]
    #[test_case(Dialect::postgres(), "\"Orders\".\"Total\"", "\"we]ird\"")]
    #[test_case(Dialect::mysql(), "`Orders`.`Total`", "`we]ird`")]
    fn quoting(dialect: Dialect, qualified: &str, odd: &str) {
        assert_eq!(dialect.quote("Orders.Total").unwrap(), qualified);
        assert_eq!(dialect.quote("we]ird").unwrap(), odd);
    }

    #[test_case(Dialect::postgres(), ':', ":p0")]
    #[test_case(Dialect::mysql(), '@', "@p0")]
    #[test_case(Dialect::sqlite(), '$', "$p0")]
    fn placeholders_follow_the_prefix(dialect: Dialect, prefix: char, expected: &str) {
        assert_eq!(dialect.placeholder("p0"), "@p0");
        assert_eq!(dialect.with_parameter_prefix(prefix).placeholder("p0"), expected);
    }

    #[test]
    fn presets_carry_engine_parameter_limits() {
        assert_eq!(Dialect::sql_server().max_parameters, Some(2_100));
        assert_eq!(Dialect::sqlite().max_parameters, Some(32_766));
        assert_eq!(Dialect::ansi().max_parameters, None);
        assert_eq!(Dialect::postgres().with_max_parameters(Some(10)).max_parameters, Some(10));
    }

    #[test]
    fn quote_characters_are_doubled() {
        assert_eq!(Dialect::postgres().quote("a\"b").unwrap(), "\"a\"\"b\"");
        assert_eq!(Dialect::mysql().quote("a`b").unwrap(), "`a``b`");
    }

    #[test]
    fn unquoted_rejects_anything_but_plain_names() {
        let ansi = Dialect::ansi();
        assert_eq!(ansi.quote("Orders.Total").unwrap(), "Orders.Total");
        assert!(ansi.quote("Name; DROP TABLE x").is_err());
        assert!(ansi.quote("Orders..Total").is_err());
    }

    #[test_case(&OffsetFetch, "OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY")]
    #[test_case(&LimitOffset, "LIMIT 10 OFFSET 20")]
    #[test_case(&SkipTop, "$skip=20&$top=10")]
    fn paging_clauses(strategy: &dyn PagingStrategy, expected: &str) {
        assert_eq!(strategy.clause(&PagingExpression::new(20, 10)), expected);
    }

    #[test]
    fn numeric_booleans() {
        assert_eq!(BooleanStyle::Numeric.bind(Value::Bool(true)), Value::Int(1));
        assert_eq!(BooleanStyle::Keywords.bind(Value::Bool(false)), Value::Bool(false));
        assert_eq!(BooleanStyle::Numeric.bind(Value::from("x")), Value::from("x"));
    }

    #[test]
    fn dialect_names_deserialize() {
        let name: DialectName = serde_json::from_str("\"sqlserver\"").unwrap();
        assert_eq!(name.dialect().name, "sqlserver");
        let name: DialectName = serde_json::from_str("\"mysql\"").unwrap();
        assert_eq!(name, DialectName::MySql);
    }
}
