//! State stores: in-memory ephemeral tables and file-backed durable records.

pub mod ephemeral;
pub mod meta;
pub mod users;

pub use ephemeral::EphemeralStore;
pub use meta::{MetaStore, UserMeta};
pub use users::{UserFile, UserRecord};
