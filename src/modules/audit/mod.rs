//! Write-once audit trail of resolved identifiers plus a chat transcript log.
//!
//! The identifier log keeps at most one row per identifier for the lifetime
//! of the store. Dedup runs against an in-memory set seeded from the durable
//! log at startup; the check and the append happen under the same lock so
//! racing lookups for one identifier produce a single row.
//!
//! Durability is best-effort: read and write failures are logged and
//! swallowed, they never fail a lookup.

mod names;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::identifier::Identifier;

pub use names::{UNKNOWN_NAME, extract_display_name};

pub const LOOKUP_HEADER: [&str; 5] = ["Date", "Time", "Identifier", "DisplayName", "Source"];
pub const TRANSCRIPT_HEADER: [&str; 5] = ["Date", "Time", "SessionId", "Question", "Answer"];

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit store i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// How the resolution that triggered an audit row was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditSource {
    Live,
    Cache,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::Live => "live",
            AuditSource::Cache => "cache",
        }
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub date: String,
    pub time: String,
    pub identifier: Identifier,
    pub display_name: String,
    pub source: AuditSource,
}

impl AuditRecord {
    pub fn new(identifier: Identifier, display_name: &str, source: AuditSource) -> Self {
        let (date, time) = date_time(Local::now());
        Self {
            date,
            time,
            identifier,
            display_name: display_name.to_string(),
            source,
        }
    }

    fn to_row(&self) -> String {
        format_row(&[
            &self.date,
            &self.time,
            self.identifier.as_str(),
            &self.display_name,
            self.source.as_str(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTranscriptRecord {
    pub date: String,
    pub time: String,
    pub session_id: String,
    pub question: String,
    pub answer: String,
}

impl ChatTranscriptRecord {
    pub fn new(session_id: &str, question: &str, answer: &str) -> Self {
        let (date, time) = date_time(Local::now());
        Self {
            date,
            time,
            session_id: session_id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    fn to_row(&self) -> String {
        format_row(&[&self.date, &self.time, &self.session_id, &self.question, &self.answer])
    }
}

fn date_time(now: DateTime<Local>) -> (String, String) {
    (now.format("%Y-%m-%d").to_string(), now.format("%H:%M:%S").to_string())
}

/// Capability interface for the audit trail.
///
/// Implementations must make `record_if_new` atomic per identifier.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Seeds the dedup set from durable storage. Called once at startup.
    async fn load_known_identifiers(&self) -> HashSet<Identifier>;

    /// Appends a row unless `identifier` was already audited. Returns whether
    /// a row was written.
    async fn record_if_new(
        &self,
        identifier: &Identifier,
        display_name: &str,
        source: AuditSource,
    ) -> bool;

    async fn record_chat_transcript(&self, session_id: &str, question: &str, answer: &str);

    async fn flush(&self) {}
}

/// Append handle plus the header it must start with.
struct AppendLog {
    path: PathBuf,
    header: &'static [&'static str],
    file: Option<File>,
}

impl AppendLog {
    fn new(path: PathBuf, header: &'static [&'static str]) -> Self {
        Self {
            path,
            header,
            file: None,
        }
    }

    async fn append(&mut self, row: &str) -> Result<(), AuditError> {
        if self.file.is_none() {
            self.file = Some(open_with_header(&self.path, self.header).await?);
        }
        let written = match self.file.as_mut() {
            Some(file) => write_row(file, row).await,
            None => Ok(()),
        };
        if written.is_err() {
            // Reopen next time so a torn row gets terminated before the retry.
            self.file = None;
        }
        written
    }

    async fn flush(&mut self) -> Result<(), AuditError> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
            file.sync_data().await?;
        }
        Ok(())
    }
}

async fn open_with_header(path: &Path, header: &[&str]) -> Result<File, AuditError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await?;
    let len = file.metadata().await?.len();
    if len == 0 {
        write_row(&mut file, &format_row(header)).await?;
    } else if !ends_with_newline(&mut file, len).await? {
        log::warn!("{} ends in a partial row; terminating it", path.display());
        write_row(&mut file, "\n").await?;
    }
    Ok(file)
}

async fn ends_with_newline(file: &mut File, len: u64) -> Result<bool, AuditError> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1)).await?;
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

async fn write_row(file: &mut File, row: &str) -> Result<(), AuditError> {
    file.write_all(row.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

struct LookupLedger {
    known: HashSet<Identifier>,
    log: AppendLog,
}

/// Tabular file-backed audit sink.
pub struct CsvAuditLog {
    lookups: Mutex<LookupLedger>,
    transcripts: Mutex<AppendLog>,
}

impl CsvAuditLog {
    pub fn new(lookups_path: impl Into<PathBuf>, transcripts_path: impl Into<PathBuf>) -> Self {
        Self {
            lookups: Mutex::new(LookupLedger {
                known: HashSet::new(),
                log: AppendLog::new(lookups_path.into(), &LOOKUP_HEADER),
            }),
            transcripts: Mutex::new(AppendLog::new(transcripts_path.into(), &TRANSCRIPT_HEADER)),
        }
    }

    async fn read_known(ledger: &mut LookupLedger) -> Result<HashSet<Identifier>, AuditError> {
        let path = ledger.log.path.clone();
        // Rows re-saved in a legacy encoding must not hide the rest of the ledger.
        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!("audit log {} not found; creating it", path.display());
                ledger.log.file = Some(open_with_header(&path, &LOOKUP_HEADER).await?);
                return Ok(HashSet::new());
            }
            Err(err) => return Err(err.into()),
        };

        let known = parse_rows(&content)
            .into_iter()
            .skip(1)
            .filter_map(|row| row.get(2).and_then(|raw| Identifier::normalize(raw).ok()))
            .collect();
        Ok(known)
    }
}

#[async_trait]
impl AuditSink for CsvAuditLog {
    async fn load_known_identifiers(&self) -> HashSet<Identifier> {
        let mut ledger = self.lookups.lock().await;
        match Self::read_known(&mut ledger).await {
            Ok(known) => {
                log::info!(
                    "audit log {} holds {} identifiers",
                    ledger.log.path.display(),
                    known.len()
                );
                ledger.known.extend(known);
            }
            Err(err) => {
                log::warn!(
                    "could not read audit log {} ({err}); continuing with an empty dedup set",
                    ledger.log.path.display()
                );
            }
        }
        ledger.known.clone()
    }

    async fn record_if_new(
        &self,
        identifier: &Identifier,
        display_name: &str,
        source: AuditSource,
    ) -> bool {
        let mut ledger = self.lookups.lock().await;
        if ledger.known.contains(identifier) {
            return false;
        }

        let record = AuditRecord::new(identifier.clone(), display_name, source);
        match ledger.log.append(&record.to_row()).await {
            Ok(()) => {
                ledger.known.insert(identifier.clone());
                log::debug!("audited {identifier} ({source})");
                true
            }
            Err(err) => {
                log::warn!("failed to audit {identifier}: {err}");
                false
            }
        }
    }

    async fn record_chat_transcript(&self, session_id: &str, question: &str, answer: &str) {
        let record = ChatTranscriptRecord::new(session_id, question, answer);
        let mut log = self.transcripts.lock().await;
        if let Err(err) = log.append(&record.to_row()).await {
            log::warn!("failed to record chat transcript for session {session_id}: {err}");
        }
    }

    async fn flush(&self) {
        if let Err(err) = self.lookups.lock().await.log.flush().await {
            log::warn!("failed to flush audit log: {err}");
        }
        if let Err(err) = self.transcripts.lock().await.flush().await {
            log::warn!("failed to flush transcript log: {err}");
        }
    }
}

#[derive(Default)]
struct MemoryState {
    known: HashSet<Identifier>,
    records: Vec<AuditRecord>,
    transcripts: Vec<ChatTranscriptRecord>,
}

/// In-memory sink with the same dedup semantics as [`CsvAuditLog`].
#[derive(Default)]
pub struct MemoryAuditLog {
    state: StdMutex<MemoryState>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the "durable" side, as if rows already existed on disk.
    pub fn with_existing<I>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = Identifier>,
    {
        let log = Self::new();
        {
            let mut state = log.lock();
            for identifier in identifiers {
                state.records.push(AuditRecord::new(identifier, UNKNOWN_NAME, AuditSource::Live));
            }
        }
        log
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock().records.clone()
    }

    pub fn transcripts(&self) -> Vec<ChatTranscriptRecord> {
        self.lock().transcripts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn load_known_identifiers(&self) -> HashSet<Identifier> {
        let mut state = self.lock();
        let existing: Vec<Identifier> =
            state.records.iter().map(|record| record.identifier.clone()).collect();
        state.known.extend(existing);
        state.known.clone()
    }

    async fn record_if_new(
        &self,
        identifier: &Identifier,
        display_name: &str,
        source: AuditSource,
    ) -> bool {
        let mut state = self.lock();
        if !state.known.insert(identifier.clone()) {
            return false;
        }
        state
            .records
            .push(AuditRecord::new(identifier.clone(), display_name, source));
        true
    }

    async fn record_chat_transcript(&self, session_id: &str, question: &str, answer: &str) {
        self.lock()
            .transcripts
            .push(ChatTranscriptRecord::new(session_id, question, answer));
    }
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn format_row(fields: &[&str]) -> String {
    let mut row = fields
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

/// Splits CSV content into rows, honouring quoted fields that span lines.
fn parse_rows(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        match (quoted, ch) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (true, other) => field.push(other),
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => row.push(std::mem::take(&mut field)),
            (false, '\r') => {}
            (false, '\n') => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            (false, other) => field.push(other),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
