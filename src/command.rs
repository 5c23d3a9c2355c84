//! Commands: one value per data operation, generic over the entity type.
//!
//! `Command` is a closed enum. Translators dispatch on it with a single
//! exhaustive `match`, so adding a kind here breaks every translator until it
//! handles the new kind.

use std::fmt;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    expr::{
        AggregationExpression, FilterExpression, JoinExpression, OrderingExpression,
        PagingExpression, ProjectionExpression,
    },
    value::Record,
};

/// Key property assumed by [`Update`] unless told otherwise.
pub const DEFAULT_KEY_PROPERTY: &str = "Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Query,
    Insert,
    Update,
    Delete,
    BulkInsert,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Query => "Query",
            CommandKind::Insert => "Insert",
            CommandKind::Update => "Update",
            CommandKind::Delete => "Delete",
            CommandKind::BulkInsert => "BulkInsert",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Command<E = Record> {
    Query(Query),
    Insert(Insert<E>),
    Update(Update<E>),
    Delete(Delete),
    BulkInsert(BulkInsert<E>),
}

impl<E> Command<E> {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Query(_) => CommandKind::Query,
            Command::Insert(_) => CommandKind::Insert,
            Command::Update(_) => CommandKind::Update,
            Command::Delete(_) => CommandKind::Delete,
            Command::BulkInsert(_) => CommandKind::BulkInsert,
        }
    }

    pub fn container_name(&self) -> &str {
        match self {
            Command::Query(q) => &q.container_name,
            Command::Insert(i) => &i.container_name,
            Command::Update(u) => &u.container_name,
            Command::Delete(d) => &d.container_name,
            Command::BulkInsert(b) => &b.container_name,
        }
    }

    /// Structural checks shared by every translator. Entity contents are
    ///  checked later, once the entity has been turned into a record.
    pub fn validate(&self) -> Result<()> {
        if self.container_name().trim().is_empty() {
            return Err(Error::validation(format!(
                "{} has an empty container name",
                self.kind()
            )));
        }
        match self {
            Command::Query(q) => q.validate(),
            Command::Insert(_) => Ok(()),
            Command::Update(u) => {
                if u.key_property.trim().is_empty() {
                    Err(Error::validation("Update has an empty key property"))
                } else {
                    Ok(())
                }
            }
            Command::Delete(d) => d.filter.as_ref().map_or(Ok(()), FilterExpression::validate),
            Command::BulkInsert(b) => {
                if b.entities.is_empty() {
                    Err(Error::validation("BulkInsert has no entities"))
                } else {
                    b.partition().map(|_| ())
                }
            }
        }
    }
}

impl<E> From<Query> for Command<E> {
    fn from(q: Query) -> Self {
        Command::Query(q)
    }
}
impl<E> From<Insert<E>> for Command<E> {
    fn from(i: Insert<E>) -> Self {
        Command::Insert(i)
    }
}
impl<E> From<Update<E>> for Command<E> {
    fn from(u: Update<E>) -> Self {
        Command::Update(u)
    }
}
impl<E> From<Delete> for Command<E> {
    fn from(d: Delete) -> Self {
        Command::Delete(d)
    }
}
impl<E> From<BulkInsert<E>> for Command<E> {
    fn from(b: BulkInsert<E>) -> Self {
        Command::BulkInsert(b)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Query {
    pub container_name: String,
    #[serde(default)]
    pub filter: Option<FilterExpression>,
    #[serde(default)]
    pub projection: Option<ProjectionExpression>,
    #[serde(default)]
    pub ordering: Option<OrderingExpression>,
    #[serde(default)]
    pub paging: Option<PagingExpression>,
    #[serde(default)]
    pub aggregation: Option<AggregationExpression>,
    #[serde(default)]
    pub joins: Vec<JoinExpression>,
}

impl Query {
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_projection(mut self, projection: ProjectionExpression) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_ordering(mut self, ordering: OrderingExpression) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn with_paging(mut self, skip: usize, take: usize) -> Self {
        self.paging = Some(PagingExpression::new(skip, take));
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationExpression) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn with_join(mut self, join: JoinExpression) -> Self {
        self.joins.push(join);
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        if let Some(projection) = &self.projection {
            projection.validate()?;
        }
        if let Some(ordering) = &self.ordering {
            ordering.validate()?;
        }
        if let Some(paging) = &self.paging {
            paging.validate()?;
        }
        if let Some(aggregation) = &self.aggregation {
            aggregation.validate()?;
        }
        for join in &self.joins {
            join.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Insert<E = Record> {
    pub container_name: String,
    pub entity: E,
}

impl<E> Insert<E> {
    pub fn new(container_name: impl Into<String>, entity: E) -> Self {
        Self {
            container_name: container_name.into(),
            entity,
        }
    }
}

/// Replaces the stored entity identified by the entity's own `key_property`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Update<E = Record> {
    pub container_name: String,
    pub entity: E,
    #[serde(default = "default_key_property")]
    pub key_property: String,
}

fn default_key_property() -> String {
    DEFAULT_KEY_PROPERTY.to_string()
}

impl<E> Update<E> {
    pub fn new(container_name: impl Into<String>, entity: E) -> Self {
        Self {
            container_name: container_name.into(),
            entity,
            key_property: default_key_property(),
        }
    }

    pub fn with_key(mut self, key_property: impl Into<String>) -> Self {
        self.key_property = key_property.into();
        self
    }
}

/// Without a filter every record in the container is deleted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Delete {
    pub container_name: String,
    #[serde(default)]
    pub filter: Option<FilterExpression>,
}

impl Delete {
    pub fn all(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            filter: None,
        }
    }

    pub fn matching(container_name: impl Into<String>, filter: FilterExpression) -> Self {
        Self {
            container_name: container_name.into(),
            filter: Some(filter),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkInsert<E = Record> {
    pub container_name: String,
    pub entities: Vec<E>,
    pub batch_size: usize,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl<E> BulkInsert<E> {
    pub fn new(container_name: impl Into<String>, entities: Vec<E>, batch_size: usize) -> Self {
        Self {
            container_name: container_name.into(),
            entities,
            batch_size,
            continue_on_error: false,
        }
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Consecutive batches of `batch_size` entities; only the last may be
    ///  shorter. The split depends on nothing but the command itself.
    pub fn partition(&self) -> Result<Vec<&[E]>> {
        if self.batch_size == 0 {
            return Err(Error::validation("BulkInsert batch size must be greater than 0"));
        }
        Ok(self.entities.chunks(self.batch_size).collect())
    }
}
