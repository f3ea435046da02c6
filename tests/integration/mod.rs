//! Integration tests for relay dispatch
//!
//! Each test drives a real `Dispatcher` against a local mock upstream and
//! inspects what the upstream received.

mod errors;
mod task;
