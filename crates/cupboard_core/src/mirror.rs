//! Mirroring cache changes to the ledgers.
//!
//! Every write collects the ledger changes it implies in a [`MirrorBatch`]
//! while its cache transaction runs. Once the transaction commits, the batch
//! is handed to the [`Mirror`]:
//!
//! - [`Durability::Immediate`]: the ledgers are rewritten before the call
//!   returns.
//! - [`Durability::Deferred`]: each ledger has one worker thread fed by a
//!   FIFO channel. Jobs carry a snapshot of the records, so later cache
//!   changes never leak into an earlier job. Writes to one ledger never
//!   race on its temp file because only its worker touches it.

use crate::cache::CacheRow;
use crate::config::Durability;
use crate::dir::DataDir;
use crate::entity::TableName;
use crate::error::{CoreError, CoreResult};
use cupboard_ledger::{Ledger, LedgerError, LedgerResult, Record, RecordKey};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// One change to one ledger.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LedgerOp {
    /// Replace or add lines by key.
    Upsert(Vec<(RecordKey, Record)>),
    /// Drop lines by key.
    Remove(Vec<RecordKey>),
    /// Append one line.
    Append(Record),
}

impl LedgerOp {
    fn apply(&self, ledger: &Ledger) -> LedgerResult<()> {
        match self {
            Self::Upsert(entries) => ledger.upsert_many(entries),
            Self::Remove(keys) => ledger.remove_many(keys).map(|_| ()),
            Self::Append(record) => ledger.append(record),
        }
    }
}

/// Ledger changes produced by one write, in order.
#[derive(Debug, Default)]
pub(crate) struct MirrorBatch {
    ops: Vec<(TableName, LedgerOp)>,
}

impl MirrorBatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records that `row` was inserted or updated.
    pub(crate) fn upsert<T: CacheRow>(&mut self, row: &T) -> CoreResult<()> {
        let entry = (row.ledger_key(), row.to_record()?);
        if let Some((table, LedgerOp::Upsert(entries))) = self.ops.last_mut() {
            if *table == T::TABLE {
                match entries.iter_mut().find(|(key, _)| *key == entry.0) {
                    Some(existing) => *existing = entry,
                    None => entries.push(entry),
                }
                return Ok(());
            }
        }
        self.ops.push((T::TABLE, LedgerOp::Upsert(vec![entry])));
        Ok(())
    }

    /// Records that `rows` were deleted.
    pub(crate) fn remove<T: CacheRow>(&mut self, rows: &[T]) {
        if rows.is_empty() {
            return;
        }
        let keys = rows.iter().map(CacheRow::ledger_key);
        if let Some((table, LedgerOp::Remove(existing))) = self.ops.last_mut() {
            if *table == T::TABLE {
                existing.extend(keys);
                return;
            }
        }
        self.ops.push((T::TABLE, LedgerOp::Remove(keys.collect())));
    }

    /// Records that `row` was appended to an append-only table.
    pub(crate) fn append<T: CacheRow>(&mut self, row: &T) -> CoreResult<()> {
        self.ops.push((T::TABLE, LedgerOp::Append(row.to_record()?)));
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Tables touched by this batch, in first-touch order.
    #[cfg(test)]
    pub(crate) fn tables(&self) -> Vec<TableName> {
        let mut tables = Vec::new();
        for (table, _) in &self.ops {
            if !tables.contains(table) {
                tables.push(*table);
            }
        }
        tables
    }

    #[cfg(test)]
    pub(crate) fn ops(&self) -> &[(TableName, LedgerOp)] {
        &self.ops
    }
}

/// The nine ledgers of a data directory.
#[derive(Debug)]
pub(crate) struct LedgerSet {
    ledgers: BTreeMap<TableName, Arc<Ledger>>,
}

impl LedgerSet {
    /// Opens every ledger, creating missing ones as empty files.
    pub(crate) fn open(dir: &DataDir) -> CoreResult<Self> {
        let mut ledgers = BTreeMap::new();
        for table in TableName::ALL {
            let ledger = Ledger::open(&dir.ledger_path(table))?;
            ledgers.insert(table, Arc::new(ledger));
        }
        Ok(Self { ledgers })
    }

    /// Returns the ledger of `table`.
    pub(crate) fn get(&self, table: TableName) -> &Arc<Ledger> {
        // Every table is inserted by `open`.
        &self.ledgers[&table]
    }

    /// Writes every change in `batch` now.
    ///
    /// Every change is attempted even after a failure; the first failure
    /// is returned.
    pub(crate) fn apply(&self, batch: MirrorBatch) -> CoreResult<()> {
        let mut first_error = None;
        for (table, op) in &batch.ops {
            if let Err(err) = op.apply(self.get(*table)) {
                warn!(ledger = %table, error = %err, "ledger write failed; change is not durable");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

enum Job {
    Write(LedgerOp),
    Barrier(Sender<()>),
}

struct Worker {
    sender: Sender<Job>,
    handle: JoinHandle<()>,
}

fn run_worker(
    table: TableName,
    ledger: Arc<Ledger>,
    jobs: Receiver<Job>,
    failures: Arc<Mutex<Vec<LedgerError>>>,
) {
    while let Ok(job) = jobs.recv() {
        match job {
            Job::Write(op) => {
                if let Err(err) = op.apply(&ledger) {
                    warn!(ledger = %table, error = %err, "deferred ledger write failed");
                    failures.lock().push(err);
                }
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(ledger = %table, "ledger worker stopped");
}

/// Queued writers, one thread per ledger.
struct Deferred {
    workers: BTreeMap<TableName, Worker>,
    failures: Arc<Mutex<Vec<LedgerError>>>,
}

impl Deferred {
    fn start(ledgers: &LedgerSet) -> CoreResult<Self> {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let mut workers = BTreeMap::new();
        for table in TableName::ALL {
            let (sender, receiver) = mpsc::channel();
            let ledger = Arc::clone(ledgers.get(table));
            let sink = Arc::clone(&failures);
            let handle = thread::Builder::new()
                .name(format!("cupboard-{table}"))
                .spawn(move || run_worker(table, ledger, receiver, sink))?;
            workers.insert(table, Worker { sender, handle });
        }
        Ok(Self { workers, failures })
    }

    fn send(&self, table: TableName, job: Job) -> CoreResult<()> {
        self.workers[&table]
            .sender
            .send(job)
            .map_err(|_| CoreError::Io(io::Error::other(format!("{table} ledger worker stopped"))))
    }

    fn flush(&self) -> CoreResult<()> {
        let mut waiting = Vec::with_capacity(self.workers.len());
        for table in self.workers.keys() {
            let (done, wait) = mpsc::channel();
            self.send(*table, Job::Barrier(done))?;
            waiting.push((*table, wait));
        }
        for (table, wait) in waiting {
            wait.recv().map_err(|_| {
                CoreError::Io(io::Error::other(format!("{table} ledger worker stopped")))
            })?;
        }

        let failures = std::mem::take(&mut *self.failures.lock());
        if failures.len() > 1 {
            warn!(count = failures.len(), "deferred ledger writes failed since last flush");
        }
        match failures.into_iter().next() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn shutdown(self) -> CoreResult<()> {
        let result = self.flush();
        for (table, worker) in self.workers {
            drop(worker.sender);
            if worker.handle.join().is_err() {
                warn!(ledger = %table, "ledger worker panicked");
            }
        }
        result
    }
}

/// Applies [`MirrorBatch`]es according to the configured durability.
pub(crate) struct Mirror {
    ledgers: LedgerSet,
    deferred: Option<Deferred>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("ledgers", &self.ledgers)
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

impl Mirror {
    pub(crate) fn new(ledgers: LedgerSet, durability: Durability) -> CoreResult<Self> {
        let deferred = match durability {
            Durability::Immediate => None,
            Durability::Deferred => Some(Deferred::start(&ledgers)?),
        };
        Ok(Self { ledgers, deferred })
    }

    #[cfg(test)]
    pub(crate) fn ledgers(&self) -> &LedgerSet {
        &self.ledgers
    }

    /// Writes or queues every change in `batch`.
    pub(crate) fn apply(&self, batch: MirrorBatch) -> CoreResult<()> {
        match &self.deferred {
            Some(deferred) => {
                for (table, op) in batch.ops {
                    deferred.send(table, Job::Write(op))?;
                }
                Ok(())
            }
            None => self.ledgers.apply(batch),
        }
    }

    /// Waits for queued writes and reports the first failure since the
    /// previous flush.
    pub(crate) fn flush(&self) -> CoreResult<()> {
        match &self.deferred {
            Some(deferred) => deferred.flush(),
            None => Ok(()),
        }
    }

    /// Flushes and stops the workers.
    pub(crate) fn shutdown(self) -> CoreResult<()> {
        match self.deferred {
            Some(deferred) => deferred.shutdown(),
            None => Ok(()),
        }
    }
}
