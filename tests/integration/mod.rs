//! Integration tests for the SQL console.

pub mod gateway_test;
pub mod sqlite_test;
