use crate::modules::database::SDK_MODELS;
use crate::modules::error::{code::ErrorCode, PushlineError, PushlineResult};
use crate::raise_error;
use native_db::{Builder, Database};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CACHE_SIZE: usize = 16 * 1024 * 1024;

/// Opens the database holding the task queue, the auth token and buffered
/// events.
pub struct TaskDatabase;

impl TaskDatabase {
    pub fn open(path: impl AsRef<Path>) -> PushlineResult<Arc<Database<'static>>> {
        let path = path.as_ref();
        info!("Opening task database at: {:?}", path);
        let mut database = Builder::new()
            .set_cache_size(DEFAULT_CACHE_SIZE)
            .create(&SDK_MODELS, path)
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::StorageError))?;
        Ok(Arc::new(database))
    }

    pub fn in_memory() -> PushlineResult<Arc<Database<'static>>> {
        let database = Builder::new()
            .create_in_memory(&SDK_MODELS)
            .map_err(Self::handle_database_error)?;
        Ok(Arc::new(database))
    }

    fn handle_database_error(error: native_db::db_type::Error) -> PushlineError {
        match error {
            native_db::db_type::Error::RedbDatabaseError(database_error) => match database_error {
                redb::DatabaseError::DatabaseAlreadyOpen => {
                    raise_error!(
                        "Database is already open by another instance".into(),
                        ErrorCode::StorageError
                    )
                }
                other => {
                    raise_error!(
                        format!("Database error: {:?}", other),
                        ErrorCode::StorageError
                    )
                }
            },
            other => {
                raise_error!(
                    format!("Failed to create database: {:?}", other),
                    ErrorCode::StorageError
                )
            }
        }
    }
}
