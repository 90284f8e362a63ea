//! Carbon-emission accounting over a six-step guided form.
//!
//! - [`numeric`]: parsing and formatting of human-entered numbers.
//! - [`calc`]: step definitions, formula rules and derived-field recomputation.
//! - [`models`] and [`db`]: projects and per-step records in SQLite.
//! - [`api`]: the HTTP JSON interface.

pub mod api;
pub mod calc;
pub mod config;
pub mod db;
pub mod models;
pub mod numeric;
