//! A single ledger file.

use crate::codec::{decode_line, encode_record};
use crate::error::{LedgerError, LedgerResult};
use crate::key::RecordKey;
use crate::Record;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of reading a ledger.
#[derive(Debug, Default, Clone)]
pub struct LedgerScan {
    /// Records in file order.
    pub records: Vec<Record>,
    /// Number of non-empty lines that could not be decoded.
    pub skipped: usize,
}

/// A line-delimited JSON ledger on disk.
///
/// Every write other than [`Ledger::append`] produces the complete new
/// content in a sibling temporary file, syncs it, and renames it over the
/// ledger, so a reader never observes a partially written file.
///
/// # Thread Safety
///
/// Writes through one `Ledger` are serialized by an internal mutex so two
/// rewrites never race on the temporary file. Separate `Ledger` values for
/// the same path are not coordinated.
///
/// # Example
///
/// ```no_run
/// use cupboard_ledger::{Ledger, RecordKey};
/// use serde_json::json;
/// use std::path::Path;
///
/// let ledger = Ledger::open(Path::new("crumbs.jsonl")).unwrap();
/// let record = json!({"id": "c1", "name": "Implement X"});
/// ledger.upsert(&RecordKey::id("c1"), record.as_object().unwrap()).unwrap();
/// assert_eq!(ledger.read_records().unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    temp_path: PathBuf,
    name: String,
    write_lock: Mutex<()>,
}

/// Deletes a leftover rewrite file. Anything that is not a regular file is
/// left alone.
fn remove_stale_temp(temp_path: &Path) -> LedgerResult<()> {
    match fs::symlink_metadata(temp_path) {
        Ok(meta) if meta.is_file() => {
            fs::remove_file(temp_path)?;
            warn!(path = %temp_path.display(), "removed unfinished ledger rewrite");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

impl Ledger {
    /// Opens a ledger, creating it as a zero-length file if it is missing.
    ///
    /// A temporary file left by a rewrite that never reached its rename is
    /// deleted; the ledger itself still holds the previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no file name or the file cannot be
    /// created.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| LedgerError::InvalidPath {
                path: path.to_path_buf(),
            })?;

        OpenOptions::new().create(true).append(true).open(path)?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());

        let temp_path = path.with_file_name(format!("{file_name}.tmp"));
        remove_stale_temp(&temp_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            name,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the path to the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the ledger name (the file stem), used in log fields.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads every decodable record, skipping empty and malformed lines.
    ///
    /// Each skipped line is logged with its 1-based line number.
    pub fn scan(&self) -> LedgerResult<LedgerScan> {
        let mut scan = LedgerScan::default();
        for (index, raw) in self.read_lines()?.into_iter().enumerate() {
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim(),
                Err(_) => {
                    warn!(ledger = %self.name, line = index + 1, "skipping non UTF-8 ledger line");
                    scan.skipped += 1;
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match decode_line(line) {
                Ok(record) => scan.records.push(record),
                Err(err) => {
                    warn!(ledger = %self.name, line = index + 1, error = %err, "skipping ledger line");
                    scan.skipped += 1;
                }
            }
        }
        Ok(scan)
    }

    /// Reads every decodable record.
    pub fn read_records(&self) -> LedgerResult<Vec<Record>> {
        Ok(self.scan()?.records)
    }

    /// Replaces the line matching `key` with `record`, or adds it at the end.
    pub fn upsert(&self, key: &RecordKey, record: &Record) -> LedgerResult<()> {
        self.upsert_many(&[(key.clone(), record.clone())])
    }

    /// Upserts several records with a single atomic rewrite.
    ///
    /// A matched record takes the position of the first line its key
    /// matches; further lines with the same key are dropped. Records whose
    /// key matched nothing are added at the end in the given order. When
    /// `entries` repeats a key, the last record for it wins. Lines that
    /// cannot be decoded are carried over unchanged.
    pub fn upsert_many(&self, entries: &[(RecordKey, Record)]) -> LedgerResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut slots: HashMap<&RecordKey, usize> = HashMap::with_capacity(entries.len());
        let mut pending: Vec<(&RecordKey, &Record)> = Vec::with_capacity(entries.len());
        for (key, record) in entries {
            match slots.get(key) {
                Some(&slot) => pending[slot].1 = record,
                None => {
                    slots.insert(key, pending.len());
                    pending.push((key, record));
                }
            }
        }
        let shapes = key_shapes(entries.iter().map(|(key, _)| key));

        let _guard = self.write_lock.lock();
        let mut placed = vec![false; pending.len()];
        let mut out: Vec<Vec<u8>> = Vec::new();

        for raw in self.read_lines()? {
            let Some(record) = decode_raw(&raw) else {
                if !is_blank(&raw) {
                    out.push(raw);
                }
                continue;
            };
            let slot = shapes.iter().find_map(|shape| {
                RecordKey::extract(&record, shape).and_then(|key| slots.get(&key).copied())
            });
            match slot {
                Some(slot) if !placed[slot] => {
                    placed[slot] = true;
                    out.push(encode_record(pending[slot].1)?.into_bytes());
                }
                Some(_) => {}
                None => out.push(raw),
            }
        }

        for (slot, (_, record)) in pending.iter().enumerate() {
            if !placed[slot] {
                out.push(encode_record(record)?.into_bytes());
            }
        }

        self.write_atomic(&out)?;
        debug!(ledger = %self.name, records = pending.len(), "upserted ledger records");
        Ok(())
    }

    /// Removes every line matching `key`. Returns the number removed.
    pub fn remove(&self, key: &RecordKey) -> LedgerResult<usize> {
        self.remove_where(|record| key.matches(record))
    }

    /// Removes every line matching any of `keys`. Returns the number removed.
    pub fn remove_many(&self, keys: &[RecordKey]) -> LedgerResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let wanted: HashSet<&RecordKey> = keys.iter().collect();
        let shapes = key_shapes(keys.iter());
        self.remove_where(|record| {
            shapes.iter().any(|shape| {
                RecordKey::extract(record, shape).is_some_and(|key| wanted.contains(&key))
            })
        })
    }

    /// Removes every decodable line for which `predicate` returns true.
    ///
    /// The file is left untouched when nothing matches.
    pub fn remove_where<F>(&self, predicate: F) -> LedgerResult<usize>
    where
        F: Fn(&Record) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut removed = 0;
        let mut out = Vec::new();

        for raw in self.read_lines()? {
            if is_blank(&raw) {
                continue;
            }
            match decode_raw(&raw) {
                Some(record) if predicate(&record) => removed += 1,
                _ => out.push(raw),
            }
        }

        if removed > 0 {
            self.write_atomic(&out)?;
            debug!(ledger = %self.name, removed, "removed ledger records");
        }
        Ok(removed)
    }

    /// Replaces the whole ledger with `records`.
    pub fn rewrite(&self, records: &[Record]) -> LedgerResult<()> {
        let _guard = self.write_lock.lock();
        let lines = records
            .iter()
            .map(|record| encode_record(record).map(String::into_bytes))
            .collect::<LedgerResult<Vec<_>>>()?;
        self.write_atomic(&lines)
    }

    /// Appends one record without rewriting prior content.
    ///
    /// Used for append-only ledgers. The write is synced before returning.
    /// If the file ends in a torn line the new record starts on a fresh line.
    pub fn append(&self, record: &Record) -> LedgerResult<()> {
        let _guard = self.write_lock.lock();
        let line = encode_record(record)?;

        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let len = file.metadata()?.len();
        let mut data = Vec::with_capacity(line.len() + 2);
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                data.push(b'\n');
            }
        }
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }

    fn read_lines(&self) -> LedgerResult<Vec<Vec<u8>>> {
        let mut data = Vec::new();
        File::open(&self.path)?.read_to_end(&mut data)?;
        Ok(data
            .split(|byte| *byte == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
            .collect())
    }

    /// Write-then-rename:
    /// 1. Write all lines to the temporary file
    /// 2. Sync the temporary file
    /// 3. Rename it over the ledger
    /// 4. Sync the directory so the rename is durable
    fn write_atomic(&self, lines: &[Vec<u8>]) -> LedgerResult<()> {
        let file = File::create(&self.temp_path)?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        let file = writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.path)?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> LedgerResult<()> {
        // NTFS journals the rename; directory handles cannot be fsynced.
        Ok(())
    }
}

/// Distinct field-name lists among `keys`, usually exactly one.
fn key_shapes<'a>(keys: impl Iterator<Item = &'a RecordKey>) -> Vec<Vec<&'a str>> {
    let mut shapes: Vec<Vec<&str>> = Vec::new();
    for key in keys {
        let shape = key.field_names();
        if !shapes.contains(&shape) {
            shapes.push(shape);
        }
    }
    shapes
}

fn is_blank(raw: &[u8]) -> bool {
    raw.iter().all(u8::is_ascii_whitespace)
}

fn decode_raw(raw: &[u8]) -> Option<Record> {
    let line = std::str::from_utf8(raw).ok()?.trim();
    if line.is_empty() {
        return None;
    }
    decode_line(line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn contents(ledger: &Ledger) -> String {
        fs::read_to_string(ledger.path()).unwrap()
    }

    #[test]
    fn open_creates_zero_length_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crumbs.jsonl");

        let ledger = Ledger::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(ledger.name(), "crumbs");
        assert!(ledger.read_records().unwrap().is_empty());
    }

    #[test]
    fn open_keeps_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("links.jsonl");
        fs::write(&path, "{\"id\":\"l1\"}\n").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.read_records().unwrap().len(), 1);
    }

    #[test]
    fn scan_skips_blank_and_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crumbs.jsonl");
        fs::write(
            &path,
            "{\"id\":\"a\"}\n\n{not json\n[1]\n{\"id\":\"b\"}\n   \n",
        )
        .unwrap();

        let scan = Ledger::open(&path).unwrap().scan().unwrap();
        assert_eq!(scan.records.len(), 2);
        assert_eq!(scan.skipped, 2);
        assert_eq!(scan.records[1].get("id"), Some(&json!("b")));
    }

    #[test]
    fn upsert_replaces_in_place_and_appends_new() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("t.jsonl")).unwrap();

        ledger
            .upsert(&RecordKey::id("a"), &record(json!({"id": "a", "v": 1})))
            .unwrap();
        ledger
            .upsert(&RecordKey::id("b"), &record(json!({"id": "b", "v": 1})))
            .unwrap();
        ledger
            .upsert(&RecordKey::id("a"), &record(json!({"id": "a", "v": 2})))
            .unwrap();

        assert_eq!(
            contents(&ledger),
            "{\"id\":\"a\",\"v\":2}\n{\"id\":\"b\",\"v\":1}\n"
        );
    }

    #[test]
    fn upsert_collapses_duplicate_lines_for_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        fs::write(&path, "{\"id\":\"a\",\"v\":1}\n{\"id\":\"a\",\"v\":1}\n").unwrap();
        let ledger = Ledger::open(&path).unwrap();

        ledger
            .upsert(&RecordKey::id("a"), &record(json!({"id": "a", "v": 3})))
            .unwrap();
        assert_eq!(contents(&ledger), "{\"id\":\"a\",\"v\":3}\n");
    }

    #[test]
    fn upsert_preserves_undecodable_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        fs::write(&path, "garbage\n{\"id\":\"a\"}\n").unwrap();
        let ledger = Ledger::open(&path).unwrap();

        ledger
            .upsert(&RecordKey::id("b"), &record(json!({"id": "b"})))
            .unwrap();
        assert_eq!(contents(&ledger), "garbage\n{\"id\":\"a\"}\n{\"id\":\"b\"}\n");
    }

    #[test]
    fn upsert_many_adds_all_in_one_pass() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("cp.jsonl")).unwrap();

        let entries: Vec<_> = ["c1", "c2"]
            .iter()
            .map(|crumb| {
                (
                    RecordKey::composite(("crumb_id", *crumb), ("property_id", "p")),
                    record(json!({"crumb_id": crumb, "property_id": "p", "value": 0})),
                )
            })
            .collect();
        ledger.upsert_many(&entries).unwrap();

        assert_eq!(ledger.read_records().unwrap().len(), 2);
        assert!(!dir.path().join("cp.jsonl.tmp").exists());
    }

    #[test]
    fn open_discards_unfinished_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crumbs.jsonl");
        fs::write(&path, "{\"id\":\"a\"}\n").unwrap();
        fs::write(dir.path().join("crumbs.jsonl.tmp"), "{\"id\":\"half").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert!(!dir.path().join("crumbs.jsonl.tmp").exists());
        assert_eq!(contents(&ledger), "{\"id\":\"a\"}\n");

        ledger
            .upsert(&RecordKey::id("b"), &record(json!({"id": "b"})))
            .unwrap();
        assert_eq!(ledger.read_records().unwrap().len(), 2);
    }

    #[test]
    fn upsert_many_last_entry_wins_for_repeated_key() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("t.jsonl")).unwrap();

        ledger
            .upsert_many(&[
                (RecordKey::id("a"), record(json!({"id": "a", "v": 1}))),
                (RecordKey::id("a"), record(json!({"id": "a", "v": 2}))),
            ])
            .unwrap();
        assert_eq!(contents(&ledger), "{\"id\":\"a\",\"v\":2}\n");
    }

    #[test]
    fn remove_deletes_matching_lines_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        fs::write(&path, "{\"id\":\"a\"}\n{\"id\":\"b\"}\n{\"id\":\"a\"}\n").unwrap();
        let ledger = Ledger::open(&path).unwrap();

        assert_eq!(ledger.remove(&RecordKey::id("a")).unwrap(), 2);
        assert_eq!(contents(&ledger), "{\"id\":\"b\"}\n");
        assert_eq!(ledger.remove(&RecordKey::id("zzz")).unwrap(), 0);
    }

    #[test]
    fn remove_many_and_where() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("links.jsonl");
        fs::write(
            &path,
            "{\"id\":\"1\",\"from_id\":\"x\"}\n{\"id\":\"2\",\"from_id\":\"y\"}\n{\"id\":\"3\",\"from_id\":\"x\"}\n",
        )
        .unwrap();
        let ledger = Ledger::open(&path).unwrap();

        let removed = ledger
            .remove_where(|r| r.get("from_id") == Some(&json!("x")))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            ledger
                .remove_many(&[RecordKey::id("2"), RecordKey::id("9")])
                .unwrap(),
            1
        );
        assert!(ledger.read_records().unwrap().is_empty());
    }

    #[test]
    fn rewrite_replaces_everything() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("t.jsonl")).unwrap();
        ledger.append(&record(json!({"id": "old"}))).unwrap();

        ledger
            .rewrite(&[record(json!({"id": "n1"})), record(json!({"id": "n2"}))])
            .unwrap();
        assert_eq!(contents(&ledger), "{\"id\":\"n1\"}\n{\"id\":\"n2\"}\n");

        ledger.rewrite(&[]).unwrap();
        assert_eq!(contents(&ledger), "");
    }

    #[test]
    fn append_adds_line_and_repairs_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stash_history.jsonl");
        fs::write(&path, "{\"id\":\"h1\"}\n{\"id\":\"h2\"").unwrap();
        let ledger = Ledger::open(&path).unwrap();

        ledger.append(&record(json!({"id": "h3"}))).unwrap();
        assert_eq!(
            contents(&ledger),
            "{\"id\":\"h1\"}\n{\"id\":\"h2\"\n{\"id\":\"h3\"}\n"
        );

        let scan = ledger.scan().unwrap();
        assert_eq!(scan.records.len(), 2);
        assert_eq!(scan.skipped, 1);
    }

    #[test]
    fn handles_crlf_line_endings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        fs::write(&path, "{\"id\":\"a\"}\r\n{\"id\":\"b\"}\r\n").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.read_records().unwrap().len(), 2);
        ledger.remove(&RecordKey::id("a")).unwrap();
        assert_eq!(contents(&ledger), "{\"id\":\"b\"}\n");
    }
}
