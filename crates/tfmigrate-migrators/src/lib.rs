//! Builtin migrators for the Cloudflare provider, v4 to v5.
//!
//! [`builtin_table`] registers every migrator and merge rule in this crate;
//! build a run's [`Registry`](tfmigrate_core::Registry) from it with
//! [`MigratorTable::build_registry`].
//!
//! ```rust
//! use tfmigrate_core::{SOURCE_VERSION, TARGET_VERSION};
//!
//! let table = tfmigrate_migrators::builtin_table();
//! let registry = table.build_registry(SOURCE_VERSION, TARGET_VERSION, &[]).unwrap();
//! assert!(registry.find("cloudflare_record").is_some());
//! ```

pub mod dns_record;
pub mod list;
pub mod list_item;
pub mod tiered_cache;

pub use dns_record::DnsRecordMigrator;
pub use list::ListMigrator;
pub use list_item::list_item_rule;
pub use tiered_cache::TieredCacheMigrator;

use tfmigrate_core::{MigratorTable, Transformer, SOURCE_VERSION, TARGET_VERSION};

fn dns_record() -> Box<dyn Transformer> {
    Box::new(DnsRecordMigrator::new())
}

fn tiered_cache() -> Box<dyn Transformer> {
    Box::new(TieredCacheMigrator::new())
}

fn list() -> Box<dyn Transformer> {
    Box::new(ListMigrator::new())
}

/// Register the builtin migrators into an existing table.
pub fn register_builtins(table: &mut MigratorTable) {
    let (from, to) = (SOURCE_VERSION, TARGET_VERSION);
    table.register_migrator(dns_record::SOURCE_TYPE, from, to, dns_record);
    table.register_migrator(tiered_cache::SOURCE_TYPE, from, to, tiered_cache);
    table.register_migrator(list::LIST_TYPE, from, to, list);
    table.register_merge_rule(from, to, list_item_rule());
}

/// A table holding every builtin migrator.
pub fn builtin_table() -> MigratorTable {
    let mut table = MigratorTable::new();
    register_builtins(&mut table);
    table
}
