// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

use crate::modules::database::{async_find_impl, delete_impl, storage_error, upsert_impl};
use crate::modules::error::PushlineResult;
use crate::utc_now;

const CURRENT_TOKEN_KEY: &str = "current";

/// The last auth token handed to the SDK, kept across restarts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct AuthTokenEntity {
    /// Always `"current"`, there is one token per SDK instance.
    #[primary_key]
    pub key: String,
    pub token: String,
    /// The timestamp (in milliseconds since epoch) when the token was stored.
    pub updated_at: i64,
}

#[derive(Clone)]
pub struct AuthTokenStore {
    database: Arc<Database<'static>>,
}

impl AuthTokenStore {
    pub fn new(database: Arc<Database<'static>>) -> Self {
        Self { database }
    }

    pub async fn load(&self) -> PushlineResult<Option<String>> {
        let entity: Option<AuthTokenEntity> =
            async_find_impl(&self.database, CURRENT_TOKEN_KEY.to_string()).await?;
        Ok(entity.map(|e| e.token))
    }

    /// Stores `token`, or removes the stored one when `None`.
    pub async fn save(&self, token: Option<String>) -> PushlineResult<()> {
        match token {
            Some(token) => {
                upsert_impl(
                    &self.database,
                    AuthTokenEntity {
                        key: CURRENT_TOKEN_KEY.to_string(),
                        token,
                        updated_at: utc_now!(),
                    },
                )
                .await
            }
            None => self.clear().await,
        }
    }

    pub async fn clear(&self) -> PushlineResult<()> {
        delete_impl::<AuthTokenEntity>(&self.database, |rw| {
            rw.get()
                .primary::<AuthTokenEntity>(CURRENT_TOKEN_KEY.to_string())
                .map_err(storage_error)
        })
        .await?;
        Ok(())
    }
}
