//! SQLite persistence: receipt checks, the category taxonomy and memo,
//! subscriptions and materialized transactions.

pub mod categories;
pub mod checks;
pub mod db;
pub mod recurring;

pub use db::{connect, create_db, DbPool};
