//! Relational translation. One translator serves every SQL engine; the
//! engine-specific parts come from the [`Dialect`] it was built with.

use tracing::{debug, trace};

use super::{
    BackendCommand, CommandBatch, Domain, FilterSyntax, RenderContext, SqlCommand, Translator,
    build_filter, entity_record, key_value,
};
use crate::{
    command::{BulkInsert, Command, CommandKind, Query},
    dialect::Dialect,
    error::{Error, Result},
    expr::{
        ALL_ROWS, Aggregate, AggregateFunction, AggregationExpression, JoinExpression, JoinKind,
        Logic, OrderingExpression, ProjectionExpression, SortDirection,
    },
    operator::Syntax,
    value::{Entity, Record, Value},
};

pub const DOMAIN: &str = "Sql";

#[derive(Debug, Clone)]
pub struct SqlTranslator {
    dialect: Dialect,
}

impl SqlTranslator {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn query(&self, table: &str, q: &Query) -> Result<SqlCommand> {
        let mut cx = RenderContext::default();
        let mut clauses = vec![format!("SELECT {}", self.select_list(q)?)];
        clauses.push(format!("FROM {table}"));

        for join in &q.joins {
            clauses.push(self.join(&q.container_name, join)?);
        }
        if let Some(filter) = &q.filter {
            let fragment = build_filter(self, filter, &mut cx)?;
            clauses.push(format!("WHERE {}", cx.merge(fragment)));
        }
        if let Some(agg) = q.aggregation.as_ref().filter(|a| !a.group_by.is_empty()) {
            clauses.push(format!("GROUP BY {}", self.column_list(&agg.group_by)?));
        }
        match (&q.ordering, &q.paging) {
            (Some(ordering), _) => clauses.push(format!("ORDER BY {}", self.ordering(ordering)?)),
            (None, Some(_)) if self.dialect.paging.requires_ordering() => {
                clauses.push("ORDER BY (SELECT NULL)".to_string())
            }
            _ => {}
        }
        if let Some(paging) = &q.paging {
            clauses.push(self.dialect.paging.clause(paging));
        }

        Ok(SqlCommand {
            command_text: clauses.join(" "),
            parameters: cx.into_parameters(),
            kind: CommandKind::Query,
        })
    }

    fn select_list(&self, q: &Query) -> Result<String> {
        match (&q.aggregation, &q.projection) {
            (Some(_), Some(_)) => Err(Error::validation(
                "Query cannot carry both a projection and an aggregation",
            )),
            (Some(agg), None) => self.aggregation(agg),
            (None, Some(projection)) => self.projection(projection),
            (None, None) => Ok("*".to_string()),
        }
    }

    fn projection(&self, projection: &ProjectionExpression) -> Result<String> {
        let fields = projection
            .fields
            .iter()
            .map(|f| {
                let column = self.dialect.quote(&f.property_name)?;
                Ok(match &f.alias {
                    Some(alias) => format!("{column} AS {}", self.dialect.quote(alias)?),
                    None => column,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(fields.join(", "))
    }

    // Group-by columns are selected ahead of the aggregates
    fn aggregation(&self, agg: &AggregationExpression) -> Result<String> {
        let mut items = agg
            .group_by
            .iter()
            .map(|g| self.dialect.quote(g))
            .collect::<Result<Vec<_>>>()?;
        for aggregate in &agg.aggregates {
            items.push(self.aggregate(aggregate)?);
        }
        Ok(items.join(", "))
    }

    fn aggregate(&self, aggregate: &Aggregate) -> Result<String> {
        let alias = self.dialect.quote(&aggregate.alias_or_default())?;
        let call = if aggregate.property_name == ALL_ROWS {
            "COUNT(*)".to_string()
        } else {
            let column = self.dialect.quote(&aggregate.property_name)?;
            match aggregate.function {
                AggregateFunction::Count => format!("COUNT({column})"),
                AggregateFunction::CountDistinct => format!("COUNT(DISTINCT {column})"),
                AggregateFunction::Sum => format!("SUM({column})"),
                AggregateFunction::Average => format!("AVG({column})"),
                AggregateFunction::Min => format!("MIN({column})"),
                AggregateFunction::Max => format!("MAX({column})"),
            }
        };
        Ok(format!("{call} AS {alias}"))
    }

    fn join(&self, container: &str, join: &JoinExpression) -> Result<String> {
        let keyword = match join.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        let conditions = join
            .on
            .iter()
            .map(|(left, right)| {
                Ok(format!(
                    "{} = {}",
                    self.dialect.quote(&qualify(container, left))?,
                    self.dialect.quote(&qualify(&join.container_name, right))?
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "{keyword} {} ON {}",
            self.dialect.quote(&join.container_name)?,
            conditions.join(" AND ")
        ))
    }

    fn ordering(&self, ordering: &OrderingExpression) -> Result<String> {
        let fields = ordering
            .fields
            .iter()
            .map(|f| {
                let direction = match f.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                };
                Ok(format!("{} {direction}", self.dialect.quote(&f.property_name)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(fields.join(", "))
    }

    fn column_list<S: AsRef<str>>(&self, names: &[S]) -> Result<String> {
        let columns = names
            .iter()
            .map(|n| self.dialect.quote(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(columns.join(", "))
    }

    fn bind(&self, cx: &mut RenderContext, value: &Value) -> String {
        let name = cx.bind(self.dialect.booleans.bind(value.clone()));
        self.dialect.placeholder(&name)
    }

    fn insert(&self, table: &str, records: &[Record], kind: CommandKind) -> Result<SqlCommand> {
        let Some(first) = records.first() else {
            return Err(Error::validation(format!("{kind} has no entities")));
        };
        let names: Vec<&str> = first.field_names().collect();
        let mut cx = RenderContext::default();
        let mut rows = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            if !record.field_names().eq(names.iter().copied()) {
                return Err(Error::validation(format!(
                    "{kind} entity {i} does not have the same fields as the first entity"
                )));
            }
            let placeholders: Vec<String> =
                record.fields().map(|(_, v)| self.bind(&mut cx, v)).collect();
            rows.push(format!("({})", placeholders.join(", ")));
        }

        Ok(SqlCommand {
            command_text: format!(
                "INSERT INTO {table} ({}) VALUES {}",
                self.column_list(&names)?,
                rows.join(", ")
            ),
            parameters: cx.into_parameters(),
            kind,
        })
    }

    fn update(&self, table: &str, record: &Record, key_property: &str) -> Result<SqlCommand> {
        let key = key_value(record, key_property)?;
        let mut cx = RenderContext::default();
        let mut assignments = Vec::with_capacity(record.len());
        for (name, value) in record.fields().filter(|(n, _)| *n != key_property) {
            let column = self.dialect.quote(name)?;
            assignments.push(format!("{column} = {}", self.bind(&mut cx, value)));
        }
        if assignments.is_empty() {
            return Err(Error::validation(format!(
                "Update entity has no fields besides key {key_property}"
            )));
        }
        let key_column = self.dialect.quote(key_property)?;
        let key_placeholder = self.bind(&mut cx, key);

        Ok(SqlCommand {
            command_text: format!(
                "UPDATE {table} SET {} WHERE {key_column} = {key_placeholder}",
                assignments.join(", ")
            ),
            parameters: cx.into_parameters(),
            kind: CommandKind::Update,
        })
    }

    fn bulk_insert<E: Entity>(&self, table: &str, bulk: &BulkInsert<E>) -> Result<CommandBatch> {
        let mut commands = Vec::new();
        for batch in bulk.partition()? {
            let records = batch
                .iter()
                .map(|e| entity_record(e, CommandKind::BulkInsert))
                .collect::<Result<Vec<_>>>()?;
            commands.push(BackendCommand::Sql(self.insert(
                table,
                &records,
                CommandKind::BulkInsert,
            )?));
        }
        Ok(CommandBatch {
            commands,
            continue_on_error: bulk.continue_on_error,
        })
    }

    fn check_parameter_limit(&self, command: &BackendCommand) -> Result<()> {
        let Some(limit) = self.dialect.max_parameters else {
            return Ok(());
        };
        match command {
            BackendCommand::Sql(sql) if sql.parameters.len() > limit => {
                Err(Error::validation(format!(
                    "{} statement binds {} parameters but {} allows {limit}",
                    sql.kind,
                    sql.parameters.len(),
                    self.dialect.name
                )))
            }
            BackendCommand::Batch(batch) => batch
                .commands
                .iter()
                .try_for_each(|c| self.check_parameter_limit(c)),
            _ => Ok(()),
        }
    }
}

/// Prefixes bare names with their container; qualified names pass through.
fn qualify(container: &str, property: &str) -> String {
    if property.contains('.') {
        property.to_string()
    } else {
        format!("{container}.{property}")
    }
}

impl Domain for SqlTranslator {
    fn domain_name(&self) -> &'static str {
        DOMAIN
    }
}

impl FilterSyntax for SqlTranslator {
    fn syntax(&self) -> Syntax {
        Syntax::Sql
    }

    fn property(&self, name: &str) -> Result<String> {
        self.dialect.quote(name)
    }

    fn junction(&self, logic: Logic) -> &'static str {
        match logic {
            Logic::And => " AND ",
            Logic::Or => " OR ",
        }
    }

    fn placeholder(&self, name: &str) -> String {
        self.dialect.placeholder(name)
    }

    fn bound_value(&self, value: Value) -> Value {
        self.dialect.booleans.bind(value)
    }
}

impl<E: Entity> Translator<E> for SqlTranslator {
    fn translate(&self, command: &Command<E>) -> Result<BackendCommand> {
        debug!(
            domain = DOMAIN,
            dialect = self.dialect.name,
            kind = %command.kind(),
            container = command.container_name(),
            "translating command"
        );
        command.validate()?;
        let table = self.dialect.quote(command.container_name())?;

        let translated = match command {
            Command::Query(q) => BackendCommand::Sql(self.query(&table, q)?),
            Command::Insert(insert) => {
                let record = entity_record(&insert.entity, CommandKind::Insert)?;
                BackendCommand::Sql(self.insert(&table, &[record], CommandKind::Insert)?)
            }
            Command::Update(update) => {
                let record = entity_record(&update.entity, CommandKind::Update)?;
                BackendCommand::Sql(self.update(&table, &record, &update.key_property)?)
            }
            Command::Delete(delete) => {
                let mut cx = RenderContext::default();
                let mut text = format!("DELETE FROM {table}");
                if let Some(filter) = &delete.filter {
                    let fragment = build_filter(self, filter, &mut cx)?;
                    text.push_str(" WHERE ");
                    text.push_str(&cx.merge(fragment));
                }
                BackendCommand::Sql(SqlCommand {
                    command_text: text,
                    parameters: cx.into_parameters(),
                    kind: CommandKind::Delete,
                })
            }
            Command::BulkInsert(bulk) => BackendCommand::Batch(self.bulk_insert(&table, bulk)?),
        };
        self.check_parameter_limit(&translated)?;

        if let BackendCommand::Sql(sql) = &translated {
            trace!(text = %sql.command_text, parameters = sql.parameters.len(), "rendered SQL");
        }
        Ok(translated)
    }
}
