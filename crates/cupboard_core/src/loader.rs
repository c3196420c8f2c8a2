//! Rebuilding the cache from the ledgers.
//!
//! Ledgers are read in [`TableName::ALL`] order so referenced rows exist
//! before the rows that refer to them. Lines that do not decode, lack a
//! required field or break a cache constraint are logged and skipped. A
//! second line with the key of an earlier one replaces it.

use crate::cache::row;
use crate::cache::CacheRow;
use crate::entity::{
    Category, Crumb, CrumbProperty, Link, Metadata, Property, Stash, StashHistory, TableName, Trail,
};
use crate::error::{CoreError, CoreResult};
use crate::mirror::LedgerSet;
use cupboard_ledger::Ledger;
use rusqlite::{Connection, ErrorCode};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Counts for one ledger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoadStats {
    /// Rows written to the cache.
    pub(crate) loaded: usize,
    /// Rows that replaced an earlier line with the same key.
    pub(crate) duplicates: usize,
    /// Lines skipped for any reason.
    pub(crate) skipped: usize,
}

impl std::ops::AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.loaded += other.loaded;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
    }
}

/// Loads every ledger into the cache through `conn`, which should be an
/// open transaction.
pub(crate) fn load_all(conn: &Connection, ledgers: &LedgerSet) -> CoreResult<LoadStats> {
    let mut total = LoadStats::default();
    for table in TableName::ALL {
        let ledger = ledgers.get(table);
        let stats = match table {
            TableName::Properties => load::<Property>(conn, ledger)?,
            TableName::Categories => load::<Category>(conn, ledger)?,
            TableName::Crumbs => load::<Crumb>(conn, ledger)?,
            TableName::CrumbProperties => load::<CrumbProperty>(conn, ledger)?,
            TableName::Trails => load::<Trail>(conn, ledger)?,
            TableName::Links => load::<Link>(conn, ledger)?,
            TableName::Metadata => load::<Metadata>(conn, ledger)?,
            TableName::Stashes => load::<Stash>(conn, ledger)?,
            TableName::StashHistory => load::<StashHistory>(conn, ledger)?,
        };
        if stats.skipped > 0 {
            info!(
                ledger = %table,
                loaded = stats.loaded,
                duplicates = stats.duplicates,
                skipped = stats.skipped,
                "ledger loaded with skipped lines"
            );
        } else {
            debug!(ledger = %table, loaded = stats.loaded, duplicates = stats.duplicates, "ledger loaded");
        }
        total += stats;
    }
    Ok(total)
}

fn load<T: CacheRow>(conn: &Connection, ledger: &Ledger) -> CoreResult<LoadStats> {
    let scan = ledger.scan()?;
    let mut stats = LoadStats {
        skipped: scan.skipped,
        ..LoadStats::default()
    };
    let mut seen = HashSet::new();

    for (index, record) in scan.records.into_iter().enumerate() {
        let entry = index + 1;
        let row: T = match serde_json::from_value(Value::Object(record)) {
            Ok(row) => row,
            Err(err) => {
                warn!(ledger = %T::TABLE, entry, error = %err, "skipping undecodable record");
                stats.skipped += 1;
                continue;
            }
        };
        if row.key().iter().any(|part| part.is_empty()) {
            warn!(ledger = %T::TABLE, entry, "skipping record with empty key");
            stats.skipped += 1;
            continue;
        }

        match row::upsert(conn, &row) {
            Ok(()) => {
                stats.loaded += 1;
                let key: Vec<String> = row.key().into_iter().map(str::to_string).collect();
                if !seen.insert(key) {
                    stats.duplicates += 1;
                }
            }
            Err(CoreError::Cache(rusqlite::Error::SqliteFailure(err, message)))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                warn!(
                    ledger = %T::TABLE,
                    entry,
                    reason = message.as_deref().unwrap_or("constraint violation"),
                    "skipping record rejected by cache"
                );
                stats.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(stats)
}
