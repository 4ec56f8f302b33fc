//! # Keycard Database
//!
//! Persistence plumbing shared by Keycard handlers:
//!
//! - [`map_error`] / [`DbError`] - classify driver failures into a closed
//!   set of [`DbErrorKind`]s, once, at the data-access boundary
//! - [`run_transaction`] / [`run_read_only_transaction`] - run an ordered
//!   list of operations atomically, with rollback on failure or panic
//! - [`PgTransactionSource`] / [`connect`] - the Postgres backend
//!
//! ## Example
//!
//! ```ignore
//! use keycard_database::{run_transaction, tx_fn, DbErrorKind, PgTransaction};
//!
//! run_transaction(&source, vec![
//!     tx_fn(move |tx: &mut PgTransaction| Box::pin(async move {
//!         let done = sqlx::query("UPDATE items SET version = version + 1 WHERE id = $1 AND version = $2")
//!             .bind(id)
//!             .bind(version)
//!             .execute(tx.conn())
//!             .await?;
//!         if done.rows_affected() == 0 {
//!             return Err(DbErrorKind::EditConflict.into());
//!         }
//!         Ok(())
//!     })),
//! ]).await?;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod postgres;
pub mod transaction;

pub use error::{map_error, sqlstate, DbError, DbErrorKind};
pub use postgres::{connect, PgTransaction, PgTransactionSource, PoolSettings};
pub use transaction::{
    run_read_only_transaction, run_transaction, tx_fn, AccessMode, Transaction,
    TransactionSource, TxError, TxFn,
};
