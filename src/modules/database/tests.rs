use crate::modules::{
    auth::token::AuthTokenEntity,
    database::{
        async_find_impl, batch_delete_impl, count_impl, delete_impl, insert_impl, list_all_impl,
        manager::TaskDatabase, storage_error, update_impl, upsert_impl,
    },
    error::code::ErrorCode,
};

fn token(key: &str, value: &str) -> AuthTokenEntity {
    AuthTokenEntity {
        key: key.into(),
        token: value.into(),
        updated_at: 1,
    }
}

#[tokio::test]
async fn insert_find_and_count() {
    let database = TaskDatabase::in_memory().unwrap();
    insert_impl(&database, token("a", "one")).await.unwrap();
    insert_impl(&database, token("b", "two")).await.unwrap();

    let found: Option<AuthTokenEntity> = async_find_impl(&database, "a".to_string()).await.unwrap();
    assert_eq!(found, Some(token("a", "one")));
    assert_eq!(count_impl::<AuthTokenEntity>(&database).await.unwrap(), 2);
    assert_eq!(list_all_impl::<AuthTokenEntity>(&database).await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_insert_is_a_storage_error() {
    let database = TaskDatabase::in_memory().unwrap();
    insert_impl(&database, token("a", "one")).await.unwrap();
    let error = insert_impl(&database, token("a", "again")).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::StorageError);

    upsert_impl(&database, token("a", "again")).await.unwrap();
    let found: Option<AuthTokenEntity> = async_find_impl(&database, "a".to_string()).await.unwrap();
    assert_eq!(found.unwrap().token, "again");
}

#[tokio::test]
async fn update_and_delete() {
    let database = TaskDatabase::in_memory().unwrap();
    insert_impl(&database, token("a", "one")).await.unwrap();
    insert_impl(&database, token("b", "two")).await.unwrap();

    let updated = update_impl(
        &database,
        |rw| {
            rw.get()
                .primary::<AuthTokenEntity>("a".to_string())
                .map_err(storage_error)?
                .ok_or_else(|| storage_error("missing"))
        },
        |current| {
            let mut next = current.clone();
            next.token = "changed".into();
            Ok(next)
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.token, "changed");

    let removed = delete_impl::<AuthTokenEntity>(&database, |rw| {
        rw.get().primary("a".to_string()).map_err(storage_error)
    })
    .await
    .unwrap();
    assert!(removed);
    let removed_again = delete_impl::<AuthTokenEntity>(&database, |rw| {
        rw.get().primary("a".to_string()).map_err(storage_error)
    })
    .await
    .unwrap();
    assert!(!removed_again);

    let purged = batch_delete_impl::<AuthTokenEntity>(&database, |rw| {
        rw.get()
            .primary("b".to_string())
            .map_err(storage_error)
            .map(|found: Option<AuthTokenEntity>| found.into_iter().collect())
    })
    .await
    .unwrap();
    assert_eq!(purged, 1);
    assert_eq!(count_impl::<AuthTokenEntity>(&database).await.unwrap(), 0);
}
