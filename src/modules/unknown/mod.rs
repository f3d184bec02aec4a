use std::sync::Arc;

use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::modules::database::{
    batch_delete_impl, count_impl, list_all_impl, rw_transaction_impl, storage_error,
};
use crate::modules::error::{code::ErrorCode, PushlineResult};
use crate::{raise_error, utc_now};

/// A `track_event` call made before any user was identified.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct BufferedEventEntity {
    #[primary_key]
    pub id: u64,
    pub event_name: String,
    /// JSON text. The storage codec cannot carry `serde_json::Value`.
    pub data_fields: Option<String>,
    pub created_at: i64,
}

impl BufferedEventEntity {
    pub fn data_fields(&self) -> Option<Value> {
        self.data_fields
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
    }
}

/// Persisted buffer of pre-identity events, capped at `limit` entries.
#[derive(Clone)]
pub struct UnknownUserEventBuffer {
    database: Arc<Database<'static>>,
    limit: usize,
}

impl UnknownUserEventBuffer {
    pub fn new(database: Arc<Database<'static>>, limit: usize) -> Self {
        Self { database, limit }
    }

    /// Appends an event and evicts the oldest ones beyond the limit. Returns
    /// the number evicted.
    pub async fn push(&self, event_name: &str, data_fields: Option<Value>) -> PushlineResult<usize> {
        if self.limit == 0 {
            debug!("event buffer disabled, dropping '{}'", event_name);
            return Ok(0);
        }
        let data_fields = data_fields
            .map(|value| serde_json::to_string(&value))
            .transpose()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SerializationError))?;
        let event_name = event_name.to_string();
        let limit = self.limit;

        let evicted = rw_transaction_impl(&self.database, move |rw| {
            let existing: Vec<BufferedEventEntity> = rw
                .scan()
                .primary()
                .map_err(storage_error)?
                .all()
                .map_err(storage_error)?
                .try_collect()
                .map_err(storage_error)?;
            let next_id = existing.iter().map(|e| e.id).max().map_or(1, |id| id + 1);
            rw.insert(BufferedEventEntity {
                id: next_id,
                event_name,
                data_fields,
                created_at: utc_now!(),
            })
            .map_err(storage_error)?;

            let overflow = (existing.len() + 1).saturating_sub(limit);
            let oldest: Vec<BufferedEventEntity> = existing
                .into_iter()
                .sorted_by_key(|e| e.id)
                .take(overflow)
                .collect();
            for entity in oldest {
                rw.remove(entity).map_err(storage_error)?;
            }
            Ok(overflow)
        })
        .await?;

        if evicted > 0 {
            warn!("event buffer full, evicted {} oldest event(s)", evicted);
        }
        Ok(evicted)
    }

    /// Buffered events, oldest first.
    pub async fn list(&self) -> PushlineResult<Vec<BufferedEventEntity>> {
        let events = list_all_impl::<BufferedEventEntity>(&self.database).await?;
        Ok(events.into_iter().sorted_by_key(|e| e.id).collect())
    }

    pub async fn remove(&self, id: u64) -> PushlineResult<()> {
        batch_delete_impl::<BufferedEventEntity>(&self.database, move |rw| {
            let found: Option<BufferedEventEntity> =
                rw.get().primary(id).map_err(storage_error)?;
            Ok(found.into_iter().collect())
        })
        .await?;
        Ok(())
    }

    pub async fn clear(&self) -> PushlineResult<usize> {
        batch_delete_impl::<BufferedEventEntity>(&self.database, |rw| {
            rw.scan()
                .primary()
                .map_err(storage_error)?
                .all()
                .map_err(storage_error)?
                .try_collect()
                .map_err(storage_error)
        })
        .await
    }

    pub async fn len(&self) -> PushlineResult<u64> {
        count_impl::<BufferedEventEntity>(&self.database).await
    }
}
