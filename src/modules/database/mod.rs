use crate::modules::auth::token::AuthTokenEntity;
use crate::modules::error::{code::ErrorCode, PushlineError, PushlineResult};
use crate::modules::scheduler::nativedb::TaskEntity;
use crate::modules::unknown::BufferedEventEntity;
use crate::raise_error;
use itertools::Itertools;
use native_db::*;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};
use transaction::RwTransaction;

pub mod manager;
#[cfg(test)]
mod tests;

pub static SDK_MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut adapter = ModelsAdapter::new();
    adapter.register_sdk_models();
    adapter.models
});

pub struct ModelsAdapter {
    pub models: Models,
}

impl ModelsAdapter {
    pub fn new() -> Self {
        ModelsAdapter {
            models: Models::new(),
        }
    }

    pub fn register_model<T: ToInput>(&mut self) {
        self.models.define::<T>().expect("failed to define model ");
    }

    pub fn register_sdk_models(&mut self) {
        self.register_model::<TaskEntity>();
        self.register_model::<AuthTokenEntity>();
        self.register_model::<BufferedEventEntity>();
    }
}

impl Default for ModelsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn storage_error<E: Debug>(e: E) -> PushlineError {
    raise_error!(format!("{:#?}", e), ErrorCode::StorageError)
}

/// Runs `f` inside a single write transaction and commits it.
pub async fn rw_transaction_impl<R: Send + 'static>(
    database: &Arc<Database<'static>>,
    f: impl FnOnce(&RwTransaction) -> PushlineResult<R> + Send + 'static,
) -> PushlineResult<R> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let rw = db.rw_transaction().map_err(storage_error)?;
        let result = f(&rw)?;
        rw.commit().map_err(storage_error)?;
        Ok(result)
    })
    .await
    .map_err(storage_error)?
}

pub async fn insert_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    item: T,
) -> PushlineResult<()> {
    rw_transaction_impl(database, move |rw| {
        rw.insert(item).map_err(storage_error)?;
        Ok(())
    })
    .await
}

pub async fn upsert_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    item: T,
) -> PushlineResult<()> {
    rw_transaction_impl(database, move |rw| {
        rw.upsert(item).map_err(storage_error)?;
        Ok(())
    })
    .await
}

pub async fn update_impl<T: ToInput + Clone + Debug + Send + 'static>(
    database: &Arc<Database<'static>>,
    current: impl FnOnce(&RwTransaction) -> PushlineResult<T> + Send + 'static,
    updated: impl FnOnce(&T) -> PushlineResult<T> + Send + 'static,
) -> PushlineResult<T> {
    rw_transaction_impl(database, move |rw| {
        let current_item = current(rw)?;
        let updated_item = updated(&current_item)?;
        rw.update(current_item, updated_item.clone())
            .map_err(storage_error)?;
        Ok(updated_item)
    })
    .await
}

pub async fn batch_update_impl<T: ToInput + Clone + Debug + Send + 'static>(
    database: &Arc<Database<'static>>,
    filter: impl FnOnce(&RwTransaction) -> PushlineResult<Vec<T>> + Send + 'static,
    updated: impl FnOnce(&Vec<T>) -> PushlineResult<Vec<(T, T)>> + Send + 'static,
) -> PushlineResult<Vec<T>> {
    rw_transaction_impl(database, move |rw| {
        let targets = filter(rw)?;
        let tuples = updated(&targets)?;
        for (old, updated) in tuples {
            rw.update(old, updated).map_err(storage_error)?;
        }
        Ok(targets)
    })
    .await
}

pub async fn async_find_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    key: impl ToKey + Send + 'static,
) -> PushlineResult<Option<T>> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let r_transaction = db.r_transaction().map_err(storage_error)?;
        let entity: Option<T> = r_transaction
            .get()
            .primary(key)
            .map_err(storage_error)?;
        Ok(entity)
    })
    .await
    .map_err(storage_error)?
}

pub async fn delete_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    delete: impl FnOnce(&RwTransaction) -> PushlineResult<Option<T>> + Send + 'static,
) -> PushlineResult<bool> {
    rw_transaction_impl(database, move |rw| match delete(rw)? {
        Some(to_delete) => {
            rw.remove::<T>(to_delete).map_err(storage_error)?;
            Ok(true)
        }
        None => Ok(false),
    })
    .await
}

pub async fn batch_delete_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
    delete: impl FnOnce(&RwTransaction) -> PushlineResult<Vec<T>> + Send + 'static,
) -> PushlineResult<usize> {
    rw_transaction_impl(database, move |rw| {
        let to_delete = delete(rw)?;
        let delete_count = to_delete.len();
        for item in to_delete {
            rw.remove(item).map_err(storage_error)?;
        }
        Ok(delete_count)
    })
    .await
}

pub async fn list_all_impl<T: ToInput + Clone + Send + 'static>(
    database: &Arc<Database<'static>>,
) -> PushlineResult<Vec<T>> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let r_transaction = db.r_transaction().map_err(storage_error)?;
        let entities: Vec<T> = r_transaction
            .scan()
            .primary()
            .map_err(storage_error)?
            .all()
            .map_err(storage_error)?
            .try_collect()
            .map_err(storage_error)?;
        Ok(entities)
    })
    .await
    .map_err(storage_error)?
}

pub async fn count_impl<T: ToInput + Send + 'static>(
    database: &Arc<Database<'static>>,
) -> PushlineResult<u64> {
    let db = database.clone();
    tokio::task::spawn_blocking(move || {
        let r_transaction = db.r_transaction().map_err(storage_error)?;
        r_transaction.len().primary::<T>().map_err(storage_error)
    })
    .await
    .map_err(storage_error)?
}
