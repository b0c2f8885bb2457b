//! Multitenancy tests.
//!
//! This module contains tests for read isolation between tenants and for
//! tenant enforcement on writes.

pub mod cross_tenant_tests;
pub mod isolation_tests;
