//! redb table definitions for the keyed table.

use redb::TableDefinition;

/// Current value per normalized key.
pub const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// Append-only log of upserts keyed by sequence number (JSON `ChangelogRecord`).
pub const CHANGELOG: TableDefinition<u64, &[u8]> = TableDefinition::new("changelog");
