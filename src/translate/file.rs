//! Flat-file translation. Files have no query language: the translator only
//! resolves the path and hands the expressions through for the caller to
//! apply in memory (see [`FileOperation::apply`]).

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::{
    BackendCommand, CommandBatch, Domain, FileOperation, FileOperationKind, Translator,
    entity_record, key_value,
};
use crate::{
    command::{BulkInsert, Command, CommandKind, Query},
    error::{Error, Result},
    expr::FilterExpression,
    operator::EQUAL,
    value::Entity,
};

pub const DOMAIN: &str = "File";

#[derive(Debug, Clone)]
pub struct FileTranslator {
    root: PathBuf,
    extension: String,
}

impl FileTranslator {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into().trim_start_matches('.').to_string();
        Self {
            root: root.into(),
            extension,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `root/<container>.<extension>`, refusing names that would leave `root`.
    fn path(&self, container: &str) -> Result<PathBuf> {
        let file_name = if self.extension.is_empty() {
            container.to_string()
        } else {
            format!("{container}.{}", self.extension)
        };
        let single_component = matches!(
            Path::new(&file_name).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );
        if !single_component
            || container.contains(['/', '\\'])
            || container.contains("..")
        {
            return Err(Error::validation(format!(
                "{container:?} cannot be used as a file name"
            )));
        }
        Ok(self.root.join(file_name))
    }

    fn operation(&self, path: PathBuf, operation: FileOperationKind) -> FileOperation {
        FileOperation {
            path,
            operation,
            filter: None,
            projection: None,
            ordering: None,
            paging: None,
            data: None,
        }
    }

    fn read(&self, path: PathBuf, q: &Query) -> Result<FileOperation> {
        if q.aggregation.is_some() {
            return Err(Error::unsupported(DOMAIN, "Aggregation"));
        }
        if !q.joins.is_empty() {
            return Err(Error::unsupported(DOMAIN, "Join"));
        }
        Ok(FileOperation {
            filter: q.filter.clone(),
            projection: q.projection.clone(),
            ordering: q.ordering.clone(),
            paging: q.paging,
            ..self.operation(path, FileOperationKind::Read)
        })
    }

    fn bulk_insert<E: Entity>(&self, path: &Path, bulk: &BulkInsert<E>) -> Result<CommandBatch> {
        let mut commands = Vec::new();
        for batch in bulk.partition()? {
            let records = batch
                .iter()
                .map(|e| entity_record(e, CommandKind::BulkInsert))
                .collect::<Result<Vec<_>>>()?;
            commands.push(BackendCommand::File(FileOperation {
                data: Some(records),
                ..self.operation(path.to_path_buf(), FileOperationKind::Append)
            }));
        }
        Ok(CommandBatch {
            commands,
            continue_on_error: bulk.continue_on_error,
        })
    }
}

impl Domain for FileTranslator {
    fn domain_name(&self) -> &'static str {
        DOMAIN
    }
}

impl<E: Entity> Translator<E> for FileTranslator {
    fn translate(&self, command: &Command<E>) -> Result<BackendCommand> {
        debug!(
            domain = DOMAIN,
            kind = %command.kind(),
            container = command.container_name(),
            "translating command"
        );
        command.validate()?;
        let path = self.path(command.container_name())?;

        let operation = match command {
            Command::Query(q) => self.read(path, q)?,
            Command::Insert(insert) => FileOperation {
                data: Some(vec![entity_record(&insert.entity, CommandKind::Insert)?]),
                ..self.operation(path, FileOperationKind::Append)
            },
            Command::Update(update) => {
                let record = entity_record(&update.entity, CommandKind::Update)?;
                let key = key_value(&record, &update.key_property)?.clone();
                FileOperation {
                    filter: Some(FilterExpression::and().with(
                        update.key_property.as_str(),
                        &EQUAL,
                        key,
                    )),
                    data: Some(vec![record]),
                    ..self.operation(path, FileOperationKind::Overwrite)
                }
            }
            Command::Delete(delete) => FileOperation {
                filter: delete.filter.clone(),
                ..self.operation(path, FileOperationKind::Overwrite)
            },
            Command::BulkInsert(bulk) => {
                return Ok(BackendCommand::Batch(self.bulk_insert(&path, bulk)?));
            }
        };
        Ok(BackendCommand::File(operation))
    }
}
