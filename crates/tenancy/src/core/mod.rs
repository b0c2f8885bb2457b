//! Core storage abstractions.
//!
//! - [`EntityStore`] - The persistence collaborator: filtered reads and
//!   by-key writes over JSON records

mod store;

pub use store::{EntityStore, record_key};
pub(crate) use store::order_and_limit;
