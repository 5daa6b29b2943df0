//! Test suites for the data access layer.

mod support;
mod unit;
