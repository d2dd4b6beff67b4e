//! BabyBill Database Library
//!
//! Record-store and username-directory traits with their Postgres (sqlx) and
//! in-memory implementations.

pub mod db;

pub use db::*;
