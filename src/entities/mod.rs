//! Entity module - Contains the SeaORM entity definitions for the database.
//! The engine stores every record as a serialized value in a single key/value table.

pub mod kv_entry;

pub use kv_entry::{Column as KvEntryColumn, Entity as KvEntry, Model as KvEntryModel};
