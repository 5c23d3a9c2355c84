//! Domain name → translator lookup.
//!
//! Registries are filled ahead of time through [`TranslatorRegistryBuilder`]
//! or from a declarative [`TranslatorConfig`], and can take more translators
//! at runtime with [`TranslatorRegistry::register`].

use std::{collections::BTreeMap, fmt, path::PathBuf, sync::Arc};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    command::Command,
    dialect::DialectName,
    error::{Error, Result},
    translate::{
        BackendCommand, Domain, Translator, file::FileTranslator, odata::ODataTranslator,
        sql::SqlTranslator,
    },
    value::{Entity, Record},
};

pub struct TranslatorRegistry<E: Entity = Record> {
    translators: BTreeMap<&'static str, Arc<dyn Translator<E>>>,
}

impl<E: Entity> Default for TranslatorRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for TranslatorRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatorRegistry")
            .field("domains", &self.domains())
            .finish()
    }
}

impl<E: Entity> TranslatorRegistry<E> {
    pub fn new() -> Self {
        Self {
            translators: BTreeMap::new(),
        }
    }

    /// Builds one translator per configured section.
    pub fn from_config(config: &TranslatorConfig) -> Self {
        let mut builder = TranslatorRegistryBuilder::new();
        if let Some(sql) = &config.sql {
            let mut dialect = sql.dialect.dialect();
            if let Some(prefix) = sql.parameter_prefix {
                dialect = dialect.with_parameter_prefix(prefix);
            }
            builder = builder.with_translator(SqlTranslator::new(dialect));
        }
        if let Some(odata) = &config.odata {
            builder = builder.with_translator(ODataTranslator::new(odata.service_root.as_str()));
        }
        if let Some(file) = &config.file {
            builder = builder.with_translator(FileTranslator::new(
                file.root.clone(),
                file.extension.as_str(),
            ));
        }
        builder.build()
    }

    /// Adds a translator under its domain name, returning the one it replaced.
    pub fn register(&mut self, translator: Arc<dyn Translator<E>>) -> Option<Arc<dyn Translator<E>>> {
        let domain = translator.domain_name();
        let previous = self.translators.insert(domain, translator);
        if previous.is_some() {
            warn!(domain, "replacing registered translator");
        } else {
            debug!(domain, "registered translator");
        }
        previous
    }

    pub fn get(&self, domain: &str) -> Option<&Arc<dyn Translator<E>>> {
        self.translators.get(domain)
    }

    pub fn domains(&self) -> Vec<&'static str> {
        self.translators.keys().copied().collect()
    }

    pub fn translate(&self, domain: &str, command: &Command<E>) -> Result<BackendCommand> {
        self.get(domain)
            .ok_or_else(|| Error::UnknownDomain(domain.to_string()))?
            .translate(command)
    }
}

pub struct TranslatorRegistryBuilder<E: Entity = Record> {
    translators: Vec<Arc<dyn Translator<E>>>,
}

impl<E: Entity> Default for TranslatorRegistryBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> TranslatorRegistryBuilder<E> {
    pub fn new() -> Self {
        Self {
            translators: Vec::new(),
        }
    }

    pub fn with_translator(mut self, translator: impl Translator<E> + 'static) -> Self {
        self.translators.push(Arc::new(translator));
        self
    }

    /// Later translators win when two share a domain name.
    pub fn build(self) -> TranslatorRegistry<E> {
        let mut registry = TranslatorRegistry::new();
        for translator in self.translators {
            registry.register(translator);
        }
        registry
    }
}

/// Which translators a registry is built with. Absent sections are skipped.
///
/// ```json
/// {
///   "sql": { "dialect": "postgres" },
///   "odata": { "service_root": "https://example.com/odata" },
///   "file": { "root": "/var/data", "extension": "jsonl" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default)]
    pub sql: Option<SqlConfig>,
    #[serde(default)]
    pub odata: Option<ODataConfig>,
    #[serde(default)]
    pub file: Option<FileConfig>,
}

impl TranslatorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqlConfig {
    pub dialect: DialectName,
    #[serde(default)]
    pub parameter_prefix: Option<char>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ODataConfig {
    pub service_root: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileConfig {
    pub root: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    "json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::Query,
        dialect::Dialect,
        expr::FilterExpression,
        operator::EQUAL,
    };

    fn customers() -> Command {
        Query::new("Customers")
            .with_filter(FilterExpression::and().with("Status", &EQUAL, "Premium"))
            .into()
    }

    #[test]
    fn dispatches_by_domain() {
        let registry = TranslatorRegistryBuilder::<Record>::new()
            .with_translator(SqlTranslator::new(Dialect::postgres()))
            .with_translator(ODataTranslator::new("https://example.com/odata"))
            .with_translator(FileTranslator::new("/data", "json"))
            .build();
        assert_eq!(registry.domains(), ["File", "Rest", "Sql"]);

        assert!(matches!(
            registry.translate("Sql", &customers()),
            Ok(BackendCommand::Sql(_))
        ));
        assert!(matches!(
            registry.translate("Rest", &customers()),
            Ok(BackendCommand::Rest(_))
        ));
        assert!(matches!(
            registry.translate("File", &customers()),
            Ok(BackendCommand::File(_))
        ));
    }

    #[test]
    fn unknown_domain() {
        let registry = TranslatorRegistry::<Record>::new();
        assert_eq!(
            registry.translate("Graph", &customers()),
            Err(Error::UnknownDomain("Graph".into()))
        );
    }

    #[test]
    fn runtime_registration_replaces() {
        let mut registry = TranslatorRegistryBuilder::<Record>::new()
            .with_translator(SqlTranslator::new(Dialect::postgres()))
            .build();
        let previous = registry.register(Arc::new(SqlTranslator::new(Dialect::sql_server())));
        assert!(previous.is_some());
        assert_eq!(registry.domains(), ["Sql"]);

        let Ok(BackendCommand::Sql(sql)) = registry.translate("Sql", &customers()) else {
            panic!("expected SQL");
        };
        assert_eq!(sql.command_text, "SELECT * FROM [Customers] WHERE [Status] = @p0");
    }

    #[test]
    fn builds_from_config() {
        let config = TranslatorConfig::from_json(
            r#"{
                "sql": { "dialect": "mysql", "parameter_prefix": "?" },
                "file": { "root": "/srv/data" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.file.as_ref().unwrap().extension, "json");

        let registry = TranslatorRegistry::<Record>::from_config(&config);
        assert_eq!(registry.domains(), ["File", "Sql"]);
        assert_eq!(registry.get("Sql").unwrap().domain_name(), "Sql");

        let Ok(BackendCommand::Sql(sql)) = registry.translate("Sql", &customers()) else {
            panic!("expected SQL");
        };
        assert_eq!(sql.command_text, "SELECT * FROM `Customers` WHERE `Status` = ?p0");
    }

    #[test]
    fn unknown_dialect_is_a_serialization_error() {
        let err = TranslatorConfig::from_json(r#"{ "sql": { "dialect": "oracle" } }"#).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
