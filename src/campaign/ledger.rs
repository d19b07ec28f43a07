//! Campaign Ledger
//!
//! Delimited recipient list with a header row and a per-row delivery status
//! column. The file is the single source of truth for campaign progress: it is
//! read wholesale at the start of every operation and rewritten wholesale after
//! every state-changing send.

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Reference to a ledger column, either by 0-based position or by header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl ColumnRef {
    fn resolve(&self, header: &[String]) -> Option<usize> {
        match self {
            Self::Index(i) if *i < header.len() => Some(*i),
            Self::Index(_) => None,
            Self::Name(name) => header.iter().position(|h| h == name),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{i}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// What the delivery gate does with a status cell that is neither blank, the
/// pending marker, nor the sent marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnrecognizedStatusPolicy {
    /// Leave the row alone (logged at warn level)
    #[default]
    Skip,
    /// Treat the row as pending
    Send,
    /// Abort the operation with a ledger error
    Reject,
}

/// Layout of a campaign ledger file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSchema {
    /// Field delimiter (single ASCII character)
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Required number of columns; `None` (written `0`) accepts whatever the
    /// header declares
    #[serde(default = "default_expected_columns", with = "column_count")]
    pub expected_columns: Option<usize>,

    /// Column holding the attachment identifier
    #[serde(default = "default_id_column")]
    pub id_column: ColumnRef,

    /// Column holding the destination phone number
    #[serde(default = "default_phone_column")]
    pub phone_column: ColumnRef,

    /// Column holding the delivery status marker
    #[serde(default = "default_status_column")]
    pub status_column: ColumnRef,

    /// Whether the ledger carries a status column at all
    #[serde(default = "default_true")]
    pub track_status: bool,

    #[serde(default = "default_pending_marker")]
    pub pending_marker: String,

    #[serde(default = "default_sent_marker")]
    pub sent_marker: String,

    #[serde(default)]
    pub unrecognized_status: UnrecognizedStatusPolicy,
}

fn default_delimiter() -> char {
    ','
}

fn default_expected_columns() -> Option<usize> {
    Some(6)
}

mod column_count {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.unwrap_or(0) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        Ok(Some(usize::deserialize(d)?).filter(|&n| n > 0))
    }
}

fn default_id_column() -> ColumnRef {
    ColumnRef::Index(0)
}

fn default_phone_column() -> ColumnRef {
    ColumnRef::Index(3)
}

fn default_status_column() -> ColumnRef {
    ColumnRef::Index(5)
}

fn default_true() -> bool {
    true
}

fn default_pending_marker() -> String {
    "pendiente".to_string()
}

fn default_sent_marker() -> String {
    "enviado".to_string()
}

impl Default for LedgerSchema {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            expected_columns: default_expected_columns(),
            id_column: default_id_column(),
            phone_column: default_phone_column(),
            status_column: default_status_column(),
            track_status: true,
            pending_marker: default_pending_marker(),
            sent_marker: default_sent_marker(),
            unrecognized_status: UnrecognizedStatusPolicy::Skip,
        }
    }
}

impl LedgerSchema {
    pub fn delimiter_byte(&self) -> Option<u8> {
        u8::try_from(self.delimiter).ok().filter(u8::is_ascii)
    }

    fn parse_status(&self, raw: &str) -> DeliveryStatus {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == self.pending_marker {
            DeliveryStatus::Pending
        } else if trimmed == self.sent_marker {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Unrecognized(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    /// Any other marker, kept verbatim so a save does not rewrite it
    Unrecognized(String),
}

/// One recipient. `number` is 1-based; the header is row 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRow {
    pub number: usize,
    pub fields: Vec<String>,
    pub status: DeliveryStatus,
}

/// Column positions resolved against the header at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    id: usize,
    phone: usize,
    status: Option<usize>,
}

/// Status counts for a whole ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    pub unrecognized: usize,
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows: {} sent, {} pending",
            self.total, self.sent, self.pending
        )?;
        if self.unrecognized > 0 {
            write!(f, ", {} with unrecognized status", self.unrecognized)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CampaignLedger {
    header: Vec<String>,
    rows: Vec<RecipientRow>,
    schema: LedgerSchema,
    columns: Columns,
}

impl CampaignLedger {
    /// Read a ledger file. The first record is always the header.
    pub fn load(path: &Path, schema: &LedgerSchema) -> Result<Self> {
        let delimiter = schema.delimiter_byte().ok_or_else(|| {
            BotError::ledger_read(path, format!("delimiter {:?} is not ASCII", schema.delimiter))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(false)
            .from_path(path)
            .map_err(|e| BotError::ledger_read(path, e))?;

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(record) => record
                .map_err(|e| BotError::ledger_read(path, e))?
                .iter()
                .map(str::to_string)
                .collect(),
            None => return Err(BotError::ledger_read(path, "file is empty")),
        };

        if let Some(expected) = schema.expected_columns
            && header.len() != expected
        {
            return Err(BotError::ledger_read(
                path,
                format!("header has {} columns, expected {}", header.len(), expected),
            ));
        }

        let columns = Self::resolve_columns(path, &header, schema)?;

        let mut rows = Vec::new();
        for (i, record) in records.enumerate() {
            let record = record.map_err(|e| BotError::ledger_read(path, e))?;
            let fields: Vec<String> = record.iter().map(str::to_string).collect();
            let status = match columns.status {
                Some(col) => schema.parse_status(&fields[col]),
                None => DeliveryStatus::Pending,
            };
            rows.push(RecipientRow {
                number: i + 1,
                fields,
                status,
            });
        }

        tracing::debug!(
            "Loaded ledger {} ({} columns, {} rows)",
            path.display(),
            header.len(),
            rows.len()
        );

        Ok(Self {
            header,
            rows,
            schema: schema.clone(),
            columns,
        })
    }

    fn resolve_columns(path: &Path, header: &[String], schema: &LedgerSchema) -> Result<Columns> {
        let resolve = |what: &str, col: &ColumnRef| {
            col.resolve(header).ok_or_else(|| {
                BotError::ledger_read(path, format!("{what} column {col} not found in header"))
            })
        };
        let status = if schema.track_status {
            Some(resolve("status", &schema.status_column)?)
        } else {
            None
        };
        Ok(Columns {
            id: resolve("id", &schema.id_column)?,
            phone: resolve("phone", &schema.phone_column)?,
            status,
        })
    }

    /// Rewrite the whole file. Writes to a sibling temp file first and renames it
    /// over the original, so an interrupted save leaves the previous ledger intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let delimiter = self
            .schema
            .delimiter_byte()
            .ok_or_else(|| BotError::ledger_write(path, "delimiter is not ASCII"))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| BotError::ledger_write(path, e))?;
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .from_writer(tmp.as_file_mut());
            writer
                .write_record(&self.header)
                .map_err(|e| BotError::ledger_write(path, e))?;
            for row in &self.rows {
                writer
                    .write_record(&row.fields)
                    .map_err(|e| BotError::ledger_write(path, e))?;
            }
            writer.flush().map_err(|e| BotError::ledger_write(path, e))?;
        }
        tmp.as_file_mut()
            .flush()
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| BotError::ledger_write(path, e))?;
        tmp.persist(path)
            .map_err(|e| BotError::ledger_write(path, e.error))?;

        tracing::debug!("Saved ledger {} ({} rows)", path.display(), self.rows.len());
        Ok(())
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[RecipientRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn schema(&self) -> &LedgerSchema {
        &self.schema
    }

    pub fn tracks_status(&self) -> bool {
        self.columns.status.is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Bounds-checked lookup by 1-based row number.
    pub fn row(&self, number: usize) -> Result<&RecipientRow> {
        self.check_bounds(number)?;
        Ok(&self.rows[number - 1])
    }

    pub fn id_of<'a>(&self, row: &'a RecipientRow) -> &'a str {
        &row.fields[self.columns.id]
    }

    pub fn phone_of<'a>(&self, row: &'a RecipientRow) -> &'a str {
        row.fields[self.columns.phone].trim()
    }

    /// Record a confirmed delivery in memory. Callers persist with [`save`].
    ///
    /// [`save`]: CampaignLedger::save
    pub fn mark_sent(&mut self, number: usize) -> Result<()> {
        self.check_bounds(number)?;
        let row = &mut self.rows[number - 1];
        row.status = DeliveryStatus::Sent;
        if let Some(col) = self.columns.status {
            row.fields[col] = self.schema.sent_marker.clone();
        }
        Ok(())
    }

    pub fn summary(&self) -> LedgerSummary {
        let initial = LedgerSummary {
            total: self.rows.len(),
            ..Default::default()
        };
        self.rows.iter().fold(initial, |mut acc, row| {
            match row.status {
                DeliveryStatus::Pending => acc.pending += 1,
                DeliveryStatus::Sent => acc.sent += 1,
                DeliveryStatus::Unrecognized(_) => acc.unrecognized += 1,
            }
            acc
        })
    }

    fn check_bounds(&self, number: usize) -> Result<()> {
        if number == 0 || number > self.rows.len() {
            return Err(BotError::RowIndexOutOfRange {
                row: number,
                len: self.rows.len(),
            });
        }
        Ok(())
    }
}
