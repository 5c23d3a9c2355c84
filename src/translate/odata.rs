//! OData v4 translation: queries become `GET` URLs with system query options,
//! mutations become JSON requests against entity sets and entity keys.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, trace};
use urlencoding::encode;

use super::{
    BackendCommand, CommandBatch, Domain, FilterSyntax, HttpMethod, RenderContext, RestRequest,
    Translator, build_filter, entity_record, key_value,
};
use crate::{
    command::{BulkInsert, Command, CommandKind, Delete, Query},
    dialect::{PagingStrategy, SkipTop},
    error::{Error, Result},
    expr::{
        ALL_ROWS, Aggregate, AggregateFunction, AggregationExpression, FilterExpression, Logic,
        OrderingExpression, ProjectionExpression, SortDirection,
    },
    operator::{EQUAL, Syntax},
    value::{Entity, Record, Value, iso_date, iso_datetime},
};

pub const DOMAIN: &str = "Rest";

const JSON: &str = "application/json";

static PROPERTY_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(/[A-Za-z_][A-Za-z0-9_]*)*$").expect("property regex")
});

/// Writes a value as an OData URL literal. Text is single-quoted with inner
///  quotes doubled; temporals use their ISO forms.
pub(crate) fn literal(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) if f.is_finite() => Ok(f.to_string()),
        Value::Float(f) => Err(Error::malformed(format!("{f} has no OData literal form"))),
        Value::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Date(d) => Ok(iso_date(d)),
        Value::DateTime(dt) => Ok(iso_datetime(dt)),
        Value::List(_) => Err(Error::malformed(
            "a list cannot be written as a single OData literal",
        )),
    }
}

#[derive(Debug, Clone)]
pub struct ODataTranslator {
    service_root: String,
}

impl ODataTranslator {
    pub fn new(service_root: impl Into<String>) -> Self {
        let service_root = service_root.into().trim_end_matches('/').to_string();
        Self { service_root }
    }

    pub fn service_root(&self) -> &str {
        &self.service_root
    }

    fn entity_set(&self, container: &str) -> String {
        format!("{}/{}", self.service_root, encode(container))
    }

    fn query(&self, q: &Query) -> Result<RestRequest> {
        if !q.joins.is_empty() {
            return Err(Error::unsupported(DOMAIN, "Join"));
        }

        let mut cx = RenderContext::default();
        let filter = match &q.filter {
            Some(filter) => {
                let fragment = build_filter(self, filter, &mut cx)?;
                Some(cx.merge(fragment))
            }
            None => None,
        };

        let mut options = Vec::new();
        match (&q.aggregation, &q.projection) {
            (Some(_), Some(_)) => {
                return Err(Error::validation(
                    "Query cannot carry both a projection and an aggregation",
                ));
            }
            // $apply runs before $filter, so the filter moves inside it
            (Some(agg), None) => {
                let mut steps = Vec::with_capacity(2);
                if let Some(filter) = &filter {
                    steps.push(format!("filter({filter})"));
                }
                steps.push(self.aggregation(agg)?);
                options.push(format!("$apply={}", encode(&steps.join("/"))));
            }
            (None, projection) => {
                if let Some(filter) = &filter {
                    options.push(format!("$filter={}", encode(filter)));
                }
                if let Some(projection) = projection {
                    options.push(format!("$select={}", encode(&self.projection(projection)?)));
                }
            }
        }
        if let Some(ordering) = &q.ordering {
            options.push(format!("$orderby={}", encode(&self.ordering(ordering)?)));
        }
        if let Some(paging) = &q.paging {
            options.push(SkipTop.clause(paging));
        }

        let mut url = self.entity_set(&q.container_name);
        if !options.is_empty() {
            url.push('?');
            url.push_str(&options.join("&"));
        }
        Ok(RestRequest {
            url,
            method: HttpMethod::Get,
            headers: vec![("Accept".to_string(), JSON.to_string())],
            body: None,
            content_type: None,
        })
    }

    fn projection(&self, projection: &ProjectionExpression) -> Result<String> {
        let fields = projection
            .fields
            .iter()
            .map(|f| {
                if let Some(alias) = &f.alias {
                    debug!(property = %f.property_name, alias = %alias, "OData $select has no aliases; dropping alias");
                }
                self.property(&f.property_name)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(fields.join(","))
    }

    fn ordering(&self, ordering: &OrderingExpression) -> Result<String> {
        let fields = ordering
            .fields
            .iter()
            .map(|f| {
                let direction = match f.direction {
                    SortDirection::Ascending => "asc",
                    SortDirection::Descending => "desc",
                };
                Ok(format!("{} {direction}", self.property(&f.property_name)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(fields.join(","))
    }

    fn aggregation(&self, agg: &AggregationExpression) -> Result<String> {
        let aggregates = agg
            .aggregates
            .iter()
            .map(|a| self.aggregate(a))
            .collect::<Result<Vec<_>>>()?
            .join(",");
        if agg.group_by.is_empty() {
            return Ok(format!("aggregate({aggregates})"));
        }
        let group_by = agg
            .group_by
            .iter()
            .map(|g| self.property(g))
            .collect::<Result<Vec<_>>>()?
            .join(",");
        Ok(format!("groupby(({group_by}),aggregate({aggregates}))"))
    }

    fn aggregate(&self, aggregate: &Aggregate) -> Result<String> {
        let alias = self.property(&aggregate.alias_or_default())?;
        if aggregate.property_name == ALL_ROWS {
            return Ok(format!("$count as {alias}"));
        }
        let method = match aggregate.function {
            AggregateFunction::Count => {
                return Err(Error::unsupported(DOMAIN, "Count of a single property"));
            }
            AggregateFunction::CountDistinct => "countdistinct",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Average => "average",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        };
        let property = self.property(&aggregate.property_name)?;
        Ok(format!("{property} with {method} as {alias}"))
    }

    fn json_request(&self, method: HttpMethod, url: String, record: &Record) -> Result<RestRequest> {
        Ok(RestRequest {
            url,
            method,
            headers: vec![("Accept".to_string(), JSON.to_string())],
            body: Some(serde_json::to_string(record)?),
            content_type: Some(JSON.to_string()),
        })
    }

    fn update(&self, container: &str, record: &Record, key_property: &str) -> Result<RestRequest> {
        let key = literal(key_value(record, key_property)?)?;
        let url = format!("{}({})", self.entity_set(container), encode(&key));
        self.json_request(HttpMethod::Put, url, record)
    }

    fn delete(&self, delete: &Delete) -> Result<RestRequest> {
        let Some(filter) = &delete.filter else {
            return Err(Error::unsupported(DOMAIN, "Delete without a key filter"));
        };
        let key = self.key_predicate(filter)?;
        Ok(RestRequest {
            url: format!("{}({})", self.entity_set(&delete.container_name), encode(&key)),
            method: HttpMethod::Delete,
            headers: Vec::new(),
            body: None,
            content_type: None,
        })
    }

    /// `v` for a single key, `A=v,B=w` for a composite one.
    fn key_predicate(&self, filter: &FilterExpression) -> Result<String> {
        let only_equalities = filter.nested_filters.is_empty()
            && (filter.logic == Logic::And || filter.conditions.len() == 1)
            && filter.conditions.iter().all(|c| *c.operator == EQUAL);
        if !only_equalities {
            return Err(Error::unsupported(DOMAIN, "Delete by a non-key filter"));
        }

        let mut parts = Vec::with_capacity(filter.conditions.len());
        for condition in &filter.conditions {
            let value = condition.value.as_ref().ok_or_else(|| {
                Error::malformed(format!("Equal on {} requires a value", condition.property_name))
            })?;
            parts.push((self.property(&condition.property_name)?, literal(value)?));
        }
        Ok(match parts.as_slice() {
            [(_, value)] => value.clone(),
            _ => parts
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(","),
        })
    }

    fn bulk_insert<E: Entity>(&self, bulk: &BulkInsert<E>) -> Result<CommandBatch> {
        let mut headers = vec![("Accept".to_string(), JSON.to_string())];
        if bulk.continue_on_error {
            headers.push(("Prefer".to_string(), "odata.continue-on-error".to_string()));
        }
        let url = format!("{}/$batch", self.service_root);
        let target = encode(&bulk.container_name).into_owned();

        let mut commands = Vec::new();
        for batch in bulk.partition()? {
            let mut requests = Vec::with_capacity(batch.len());
            for (i, entity) in batch.iter().enumerate() {
                let record = entity_record(entity, CommandKind::BulkInsert)?;
                requests.push(json!({
                    "id": (i + 1).to_string(),
                    "method": "POST",
                    "url": target,
                    "headers": { "content-type": JSON },
                    "body": serde_json::to_value(&record)?,
                }));
            }
            commands.push(BackendCommand::Rest(RestRequest {
                url: url.clone(),
                method: HttpMethod::Post,
                headers: headers.clone(),
                body: Some(json!({ "requests": requests }).to_string()),
                content_type: Some(JSON.to_string()),
            }));
        }
        Ok(CommandBatch {
            commands,
            continue_on_error: bulk.continue_on_error,
        })
    }
}

impl Domain for ODataTranslator {
    fn domain_name(&self) -> &'static str {
        DOMAIN
    }
}

impl FilterSyntax for ODataTranslator {
    fn syntax(&self) -> Syntax {
        Syntax::OData
    }

    fn property(&self, name: &str) -> Result<String> {
        if PROPERTY_PATH.is_match(name) {
            Ok(name.to_string())
        } else {
            Err(Error::validation(format!("{name:?} is not a valid OData property path")))
        }
    }

    fn junction(&self, logic: Logic) -> &'static str {
        match logic {
            Logic::And => " and ",
            Logic::Or => " or ",
        }
    }

    // Every standard operator inlines literals on OData; only custom
    //  operators that bind end up here.
    fn placeholder(&self, name: &str) -> String {
        format!("@{name}")
    }
}

impl<E: Entity> Translator<E> for ODataTranslator {
    fn translate(&self, command: &Command<E>) -> Result<BackendCommand> {
        debug!(
            domain = DOMAIN,
            kind = %command.kind(),
            container = command.container_name(),
            "translating command"
        );
        command.validate()?;

        let translated = match command {
            Command::Query(q) => BackendCommand::Rest(self.query(q)?),
            Command::Insert(insert) => {
                let record = entity_record(&insert.entity, CommandKind::Insert)?;
                BackendCommand::Rest(self.json_request(
                    HttpMethod::Post,
                    self.entity_set(&insert.container_name),
                    &record,
                )?)
            }
            Command::Update(update) => {
                let record = entity_record(&update.entity, CommandKind::Update)?;
                BackendCommand::Rest(self.update(
                    &update.container_name,
                    &record,
                    &update.key_property,
                )?)
            }
            Command::Delete(delete) => BackendCommand::Rest(self.delete(delete)?),
            Command::BulkInsert(bulk) => BackendCommand::Batch(self.bulk_insert(bulk)?),
        };

        if let BackendCommand::Rest(request) = &translated {
            trace!(method = %request.method, url = %request.url, "rendered request");
        }
        Ok(translated)
    }
}
