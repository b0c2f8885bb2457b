//! Shared test infrastructure for the tenancy integration tests.
//!
//! Provides the Account / Project / Task domain used throughout the tests and
//! helpers for saving records on behalf of a tenant.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;
