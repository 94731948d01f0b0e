use crate::models::grant::AccessGrant;
use crate::models::user::User;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

const BEGIN: &str = "BEGIN";
const COMMIT: &str = "COMMIT";
const NONE: &str = "-";

/// Row-level change recorded in the WAL
#[derive(Debug, Clone, PartialEq)]
pub enum WalOperation {
    /// Insert or replace a user row
    PutUser(User),
    /// Insert or replace a grant row
    PutGrant(AccessGrant),
    DeleteGrant { id: u32 },
}

// Free-text fields are hex encoded so they never collide with the separator
fn encode_text(value: &str) -> String {
    hex::encode(value.as_bytes())
}

fn decode_text(field: &str) -> Result<String> {
    let bytes = hex::decode(field).context("Invalid hex text field")?;
    String::from_utf8(bytes).context("Text field is not UTF-8")
}

fn encode_opt_text(value: &Option<String>) -> String {
    value.as_deref().map_or_else(|| NONE.to_string(), encode_text)
}

fn decode_opt_text(field: &str) -> Result<Option<String>> {
    if field == NONE {
        return Ok(None);
    }
    decode_text(field).map(Some)
}

fn encode_opt_ts(value: Option<i64>) -> String {
    value.map_or_else(|| NONE.to_string(), |ts| ts.to_string())
}

fn decode_opt_ts(field: &str) -> Result<Option<i64>> {
    if field == NONE {
        return Ok(None);
    }
    Ok(Some(field.parse::<i64>().context("Invalid timestamp")?))
}

impl WalOperation {
    fn encode(&self) -> String {
        match self {
            WalOperation::PutUser(user) => format!(
                "PUT_USER|{}|{}|{}|{}|{}|{}|{}|{}|{}",
                user.id,
                encode_text(&user.fullname),
                encode_text(&user.email),
                encode_text(&user.password_hash),
                if user.active { "1" } else { "0" },
                encode_text(&user.created_by),
                user.created_at,
                encode_opt_text(&user.updated_by),
                encode_opt_ts(user.updated_at),
            ),
            WalOperation::PutGrant(grant) => format!(
                "PUT_GRANT|{}|{}|{}|{}|{}|{}|{}",
                grant.id,
                grant.user_id,
                encode_text(&grant.route),
                encode_text(&grant.created_by),
                grant.created_at,
                encode_opt_text(&grant.updated_by),
                encode_opt_ts(grant.updated_at),
            ),
            WalOperation::DeleteGrant { id } => format!("DELETE_GRANT|{}", id),
        }
    }

    fn decode(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split('|').collect();

        match parts.first() {
            Some(&"PUT_USER") => {
                if parts.len() != 10 {
                    bail!("Invalid PUT_USER format");
                }
                Ok(WalOperation::PutUser(User {
                    id: parts[1].parse::<u32>().context("Invalid user ID")?,
                    fullname: decode_text(parts[2])?,
                    email: decode_text(parts[3])?,
                    password_hash: decode_text(parts[4])?,
                    active: parts[5] == "1",
                    created_by: decode_text(parts[6])?,
                    created_at: parts[7].parse::<i64>().context("Invalid created_at")?,
                    updated_by: decode_opt_text(parts[8])?,
                    updated_at: decode_opt_ts(parts[9])?,
                }))
            }
            Some(&"PUT_GRANT") => {
                if parts.len() != 8 {
                    bail!("Invalid PUT_GRANT format");
                }
                Ok(WalOperation::PutGrant(AccessGrant {
                    id: parts[1].parse::<u32>().context("Invalid grant ID")?,
                    user_id: parts[2].parse::<u32>().context("Invalid user ID")?,
                    route: decode_text(parts[3])?,
                    created_by: decode_text(parts[4])?,
                    created_at: parts[5].parse::<i64>().context("Invalid created_at")?,
                    updated_by: decode_opt_text(parts[6])?,
                    updated_at: decode_opt_ts(parts[7])?,
                }))
            }
            Some(&"DELETE_GRANT") => {
                if parts.len() != 2 {
                    bail!("Invalid DELETE_GRANT format");
                }
                let id = parts[1].parse::<u32>().context("Invalid grant ID")?;
                Ok(WalOperation::DeleteGrant { id })
            }
            _ => bail!("Unknown operation type"),
        }
    }
}

/// Append-only journal of committed units of work.
///
/// Each unit of work is written as `BEGIN`, its operations, then `COMMIT`.
/// Replay only returns operations from batches that reached `COMMIT`.
pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
    /// Set when a failed append could not be cut back off the file.
    /// Every later append is refused until the log is reopened.
    failed: AtomicBool,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = open_append(&path)?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
            failed: AtomicBool::new(false),
        })
    }

    /// Open an existing log through a read-only handle, so every append fails
    #[cfg(test)]
    pub(crate) fn read_only(path: PathBuf) -> Result<Self> {
        let file = File::open(&path).context("Failed to open WAL read-only")?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
            failed: AtomicBool::new(false),
        })
    }

    /// Durably append one committed batch.
    ///
    /// On failure the file is truncated back to its previous length, so a
    /// batch the caller rolls back never reappears on replay.
    pub fn log_batch(&self, ops: &[WalOperation]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        if self.failed.load(Ordering::Acquire) {
            bail!("WAL is in a failed state after an unrecoverable write error");
        }

        let buf = encode_batch(ops);
        let mut file = self.file.lock();
        let start = file.metadata().context("Failed to stat WAL")?.len();

        if let Err(e) = append_synced(&mut file, buf.as_bytes()) {
            if let Err(truncate_err) = truncate_to(&file, start) {
                self.failed.store(true, Ordering::Release);
                tracing::error!(
                    error = %truncate_err,
                    length = start,
                    "Failed to remove partial WAL batch, refusing further writes"
                );
            }
            return Err(e);
        }

        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = File::open(&self.path).context("Failed to open WAL for replay")?;
        let reader = BufReader::new(file);
        let mut committed = Vec::new();
        let mut pending: Option<Vec<WalOperation>> = None;

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match line {
                BEGIN => {
                    if pending.is_some() {
                        tracing::warn!(line_num = line_num + 1, "Unterminated WAL batch, discarding");
                    }
                    pending = Some(Vec::new());
                }
                COMMIT => match pending.take() {
                    Some(ops) => committed.extend(ops),
                    None => {
                        tracing::warn!(line_num = line_num + 1, "COMMIT without BEGIN, skipping");
                    }
                },
                _ => match (WalOperation::decode(line), pending.as_mut()) {
                    (Ok(op), Some(ops)) => ops.push(op),
                    (Ok(_), None) => {
                        tracing::warn!(line_num = line_num + 1, "WAL operation outside a batch, skipping");
                    }
                    (Err(e), _) => {
                        // A torn write damages its whole batch. If the next
                        // batch's BEGIN was appended to the torn line, that
                        // batch starts here.
                        let discarded = pending.take().map_or(0, |ops| ops.len());
                        if line.ends_with(BEGIN) {
                            pending = Some(Vec::new());
                        }
                        tracing::warn!(
                            line_num = line_num + 1,
                            error = %e,
                            discarded,
                            "Failed to parse WAL line, discarding its batch"
                        );
                    }
                },
            }
        }

        if let Some(ops) = pending {
            tracing::warn!(
                operations = ops.len(),
                "Discarding uncommitted trailing WAL batch"
            );
        }

        Ok(committed)
    }

    /// Replace the log with a single batch describing the current rows.
    ///
    /// The snapshot is written next to the log and renamed over it, so a crash
    /// leaves either the old or the new file in place.
    pub fn compact(&self, snapshot: &[WalOperation]) -> Result<()> {
        let tmp_path = self.path.with_extension("compact");
        let mut file = self.file.lock();

        {
            let mut tmp = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            if !snapshot.is_empty() {
                tmp.write_all(encode_batch(snapshot).as_bytes())
                    .context("Failed to write WAL snapshot")?;
            }
            tmp.sync_all().context("Failed to sync WAL snapshot")?;
        }

        fs::rename(&tmp_path, &self.path).context("Failed to replace WAL with snapshot")?;
        *file = open_append(&self.path)?;
        Ok(())
    }
}

fn append_synced(file: &mut File, buf: &[u8]) -> Result<()> {
    file.write_all(buf).context("Failed to write to WAL")?;
    file.flush().context("Failed to flush WAL")?;
    file.sync_data().context("Failed to sync WAL")
}

fn truncate_to(file: &File, length: u64) -> Result<()> {
    file.set_len(length).context("Failed to truncate WAL")?;
    file.sync_all().context("Failed to sync truncated WAL")
}

fn open_append(path: &PathBuf) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open WAL file {}", path.display()))
}

fn encode_batch(ops: &[WalOperation]) -> String {
    let mut buf = String::with_capacity(64 * (ops.len() + 2));
    buf.push_str(BEGIN);
    buf.push('\n');
    for op in ops {
        buf.push_str(&op.encode());
        buf.push('\n');
    }
    buf.push_str(COMMIT);
    buf.push('\n');
    buf
}
