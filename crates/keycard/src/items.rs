//! The `/items/{id}` resource.
//!
//! Reads go through [`run_read_only_transaction`], so a lookup is one
//! read-only transaction and database failures arrive as typed
//! [`DbError`]s that map straight onto HTTP responses.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use keycard_core::{handler_fn, json_response, ApiError, Handler};
use keycard_database::{
    run_read_only_transaction, tx_fn, DbError, DbErrorKind, PgTransaction, Transaction,
    TransactionSource, TxError,
};
use keycard_server::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

const FIND_ITEM: &str = "SELECT id, name, version FROM items WHERE id = $1";

/// A stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Primary key
    pub id: i64,
    /// Display name
    pub name: String,
    /// Optimistic-locking version
    pub version: i32,
}

/// Item queries available inside a transaction.
#[async_trait]
pub trait ItemQueries: Transaction {
    /// Loads one item. A missing row is [`DbErrorKind::NotFound`].
    async fn find_item(&mut self, id: i64) -> Result<Item, DbError>;
}

#[async_trait]
impl ItemQueries for PgTransaction {
    async fn find_item(&mut self, id: i64) -> Result<Item, DbError> {
        let (id, name, version) = sqlx::query_as::<_, (i64, String, i32)>(FIND_ITEM)
            .bind(id)
            .fetch_one(self.conn())
            .await?;
        Ok(Item { id, name, version })
    }
}

/// Loads an item in its own read-only transaction.
pub async fn load_item<S>(source: &S, id: i64) -> Result<Item, TxError>
where
    S: TransactionSource,
    S::Tx: ItemQueries,
{
    let found = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&found);

    run_read_only_transaction(
        source,
        vec![tx_fn(move |tx: &mut S::Tx| {
            Box::pin(async move {
                let item = tx.find_item(id).await?;
                *slot.lock() = Some(item);
                Ok(())
            })
        })],
    )
    .await?;

    let item = found.lock().take();
    item.ok_or_else(|| TxError::Operation {
        index: 1,
        source: DbErrorKind::NotFound.into(),
    })
}

/// `GET /items/{id}`.
///
/// Ids that are not positive integers are treated as missing.
pub fn get_item<S>(source: Arc<S>) -> Handler
where
    S: TransactionSource + 'static,
    S::Tx: ItemQueries + 'static,
{
    handler_fn(move |ctx, _req| {
        let source = Arc::clone(&source);
        Box::pin(async move {
            let id = ctx
                .param("id")
                .and_then(|raw| raw.parse::<i64>().ok())
                .filter(|id| *id > 0);
            let Some(id) = id else {
                return ApiError::NotFound.into_response();
            };

            match load_item(source.as_ref(), id).await {
                Ok(item) => json_response(StatusCode::OK, &json!({ "item": item })),
                Err(err) => {
                    let api = ApiError::from(&err);
                    if matches!(api, ApiError::Internal) {
                        ApiError::server_error(ctx, &err)
                    } else {
                        api.into_response()
                    }
                }
            }
        })
    })
}

/// Mounts the item routes.
pub fn routes<S>(router: &mut Router, source: Arc<S>)
where
    S: TransactionSource + 'static,
    S::Tx: ItemQueries + 'static,
{
    router.get("/items/{id}", get_item(source));
}
