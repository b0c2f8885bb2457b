//! Entity types and instances as seen by the tenancy layer.

mod record;
mod schema;

pub use record::Record;
pub use schema::{BelongsTo, EntitySchema};
