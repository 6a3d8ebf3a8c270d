// Self-healing CSV import
//
// Legacy exports contain broken quoting and rows with the wrong number of
// fields. Opening a file heals it once: lines with an odd quote count are
// dropped up front, then every line the parser rejects is removed and the
// parse retried. The healed text is kept and parsed lazily on demand.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use backfill_core::{ColumnType, Value};

use crate::coerce::coerce;

/// Retries allowed at one line number before the file is rejected.
pub const MAX_RETRIES_PER_LINE: u32 = 5;

/// Typed cells of one CSV row, keyed by declared column name.
pub type TypedRow = BTreeMap<String, Value>;

#[derive(Debug)]
pub enum CsvError {
    /// File could not be read.
    Io(String),
    /// Parser error with no usable line number.
    Parse(String),
    /// The same line kept failing after the retry budget was spent.
    RetriesExhausted { line: u64, attempts: u32, message: String },
}

impl fmt::Display for CsvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Parse(msg) => write!(f, "CSV parse error: {msg}"),
            Self::RetriesExhausted { line, attempts, message } => write!(
                f,
                "CSV parse error at line {line} persisted after {attempts} retries: {message}"
            ),
        }
    }
}

impl std::error::Error for CsvError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    /// Odd number of quote characters that cannot open a multi-line field.
    UnbalancedQuotes,
    /// Rejected by the structured parser.
    Parser(String),
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnbalancedQuotes => write!(f, "unbalanced quotes"),
            Self::Parser(msg) => write!(f, "{msg}"),
        }
    }
}

/// A line removed while healing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedLine {
    /// 1-based line number in the text as it was when the line was removed.
    pub line: u64,
    pub content: String,
    pub reason: QuarantineReason,
}

/// Consecutive failures observed at one line number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub last_line: Option<u64>,
    pub attempts: u32,
}

impl RetryState {
    /// Record a failure at `line` and decide whether another attempt is allowed.
    ///
    /// A different line resets the counter. At the same line the counter
    /// grows until it reaches [`MAX_RETRIES_PER_LINE`]; the failure after
    /// that returns `false`.
    pub fn register(&mut self, line: u64) -> bool {
        if self.last_line != Some(line) {
            self.last_line = Some(line);
            self.attempts = 1;
            return true;
        }
        if self.attempts >= MAX_RETRIES_PER_LINE {
            return false;
        }
        self.attempts += 1;
        true
    }
}

/// A CSV file after healing, ready to be read as typed rows.
#[derive(Debug, Clone)]
pub struct HealedCsv {
    text: String,
    columns: Vec<(String, ColumnType)>,
    quarantined: Vec<QuarantinedLine>,
}

impl HealedCsv {
    pub fn open(path: &Path, columns: Vec<(String, ColumnType)>) -> Result<Self, CsvError> {
        log::info!("Parsing CSV file: {}", path.display());
        let content = read_file_as_utf8(path)?;
        Self::from_text(&content, columns)
    }

    pub fn from_text(content: &str, columns: Vec<(String, ColumnType)>) -> Result<Self, CsvError> {
        let (lines, mut quarantined) = prefilter(content);
        let text = heal(lines, &mut quarantined)?;
        if !quarantined.is_empty() {
            log::warn!("quarantined {} malformed line(s)", quarantined.len());
        }
        Ok(Self { text, columns, quarantined })
    }

    pub fn quarantined(&self) -> &[QuarantinedLine] {
        &self.quarantined
    }

    /// Typed rows in file order. Each call starts over from the first row.
    pub fn rows(&self) -> Rows<'_> {
        let mut reader = reader_for(&self.text);
        let headers = reader.headers().cloned().unwrap_or_default();
        let indices = self
            .columns
            .iter()
            .map(|(name, _)| headers.iter().position(|h| h == name))
            .collect();
        Rows {
            records: reader.into_records(),
            columns: &self.columns,
            indices,
        }
    }
}

/// Lazy iterator over the typed rows of a [`HealedCsv`].
pub struct Rows<'a> {
    records: ::csv::StringRecordsIntoIter<&'a [u8]>,
    columns: &'a [(String, ColumnType)],
    indices: Vec<Option<usize>>,
}

impl Iterator for Rows<'_> {
    type Item = TypedRow;

    fn next(&mut self) -> Option<TypedRow> {
        loop {
            match self.records.next()? {
                Ok(record) => {
                    let row = self
                        .columns
                        .iter()
                        .zip(&self.indices)
                        .map(|((name, ty), idx)| {
                            let raw = idx.and_then(|i| record.get(i));
                            (name.clone(), coerce(raw, *ty))
                        })
                        .collect();
                    return Some(row);
                }
                // Healed text parses cleanly; anything else is skipped.
                Err(e) => log::warn!("skipping unreadable row: {e}"),
            }
        }
    }
}

fn reader_for(text: &str) -> ::csv::Reader<&[u8]> {
    ::csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(::csv::Trim::All)
        .from_reader(text.as_bytes())
}

/// Drop lines whose quote count is odd unless they open or close a multi-line field.
pub fn prefilter(content: &str) -> (Vec<String>, Vec<QuarantinedLine>) {
    let mut kept = Vec::new();
    let mut quarantined = Vec::new();
    let mut in_field = false;

    for (i, line) in content.split('\n').enumerate() {
        let quotes: usize = line.split(',').map(|segment| segment.matches('"').count()).sum();
        if quotes % 2 != 0 {
            let tail = line.trim_end_matches('\r');
            let opens = !tail.ends_with('"') || tail.ends_with(",\"");
            if in_field {
                in_field = false;
            } else if opens {
                in_field = true;
            } else {
                log::warn!("REMOVED LINE: {line}");
                quarantined.push(QuarantinedLine {
                    line: i as u64 + 1,
                    content: line.to_string(),
                    reason: QuarantineReason::UnbalancedQuotes,
                });
                continue;
            }
        }
        kept.push(line.to_string());
    }

    (kept, quarantined)
}

/// Remove lines the parser rejects until the text parses cleanly.
fn heal(mut lines: Vec<String>, quarantined: &mut Vec<QuarantinedLine>) -> Result<String, CsvError> {
    let mut retry = RetryState::default();

    loop {
        let text = lines.join("\n");
        let Some((line, message)) = first_parse_error(&text)? else {
            return Ok(text);
        };

        let idx = usize::try_from(line).unwrap_or(0);
        if idx == 0 || idx > lines.len() {
            return Err(CsvError::Parse(format!("line {line}: {message}")));
        }

        let removed = lines.remove(idx - 1);
        log::warn!("REMOVED LINE: {removed}");
        quarantined.push(QuarantinedLine {
            line,
            content: removed,
            reason: QuarantineReason::Parser(message.clone()),
        });

        if !retry.register(line) {
            return Err(CsvError::RetriesExhausted {
                line,
                attempts: retry.attempts,
                message,
            });
        }
    }
}

/// Line number and message of the first parser error, if any.
fn first_parse_error(text: &str) -> Result<Option<(u64, String)>, CsvError> {
    let mut reader = reader_for(text);
    if let Err(e) = reader.headers() {
        return located(e).map(Some);
    }
    for result in reader.records() {
        if let Err(e) = result {
            return located(e).map(Some);
        }
    }
    Ok(None)
}

fn located(e: ::csv::Error) -> Result<(u64, String), CsvError> {
    match e.position() {
        Some(pos) => Ok((pos.line(), e.to_string())),
        None => Err(CsvError::Parse(e.to_string())),
    }
}

/// Read file and convert to UTF-8 if needed (Excel exports are often Windows-1252)
pub fn read_file_as_utf8(path: &Path) -> Result<String, CsvError> {
    let mut file = std::fs::File::open(path).map_err(|e| CsvError::Io(format!("{}: {e}", path.display())))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| CsvError::Io(e.to_string()))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}
