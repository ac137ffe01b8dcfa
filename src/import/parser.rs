//! Delimited text tokenizer.
//!
//! Produces a [`ParsedTable`] (header row plus data rows) from decoded text.
//!
//! # Line handling
//!
//! In the default [`LineMode::Physical`] the input is split into physical
//! lines on `\r?\n` first, blank lines are discarded, and each line is
//! tokenized on its own. A quoted value containing a literal newline is
//! therefore split across two rows. [`LineMode::QuoteAware`] hands the whole
//! input to a `csv` reader instead, which keeps newlines inside quotes as
//! part of the value.
//!
//! # Tokenizing
//!
//! Outside quotes the delimiter ends a field; inside quotes it is literal. A
//! doubled `""` inside quotes is an escaped quote. The opening and closing
//! quote characters are dropped and the value is trimmed.
//!
//! The delimiter is a comma unless the header line has no comma outside
//! quotes but does have a semicolon, in which case semicolon is used.

use crate::import::error::ImportError;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};

/// Header row plus data rows. Rows may be shorter than the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ParsedTable {
    /// Split tokenized records into header and data rows.
    pub fn from_records(mut records: Vec<Vec<String>>) -> Result<Self, ImportError> {
        if records.is_empty() {
            return Err(ImportError::NoColumns);
        }

        let headers = records.remove(0);
        if headers.iter().all(|header| header.is_empty()) {
            return Err(ImportError::NoColumns);
        }
        if records.is_empty() {
            return Err(ImportError::NoDataRows);
        }

        Ok(Self {
            headers,
            rows: records,
        })
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// How record boundaries are found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineMode {
    /// Pre-split on `\r?\n`; newlines inside quotes are not supported.
    #[default]
    Physical,
    /// RFC 4180 reader; newlines inside quotes belong to the value.
    QuoteAware,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedParser {
    mode: LineMode,
}

impl DelimitedParser {
    pub fn new(mode: LineMode) -> Self {
        Self { mode }
    }

    pub fn parse(&self, text: &str) -> Result<ParsedTable, ImportError> {
        let header_line = text
            .split('\n')
            .find(|line| !line.trim().is_empty())
            .ok_or(ImportError::NoColumns)?;
        let delimiter = detect_delimiter(header_line);

        let records = match self.mode {
            LineMode::Physical => text
                .split('\n')
                .map(|line| line.strip_suffix('\r').unwrap_or(line))
                .filter(|line| !line.trim().is_empty())
                .map(|line| tokenize_line(line, delimiter))
                .collect(),
            LineMode::QuoteAware => read_records(text, delimiter)?,
        };

        log::debug!(
            "parsed {} records using {:?} delimiter ({:?} mode)",
            records.len(),
            delimiter,
            self.mode
        );

        ParsedTable::from_records(records)
    }
}

fn detect_delimiter(header_line: &str) -> char {
    let mut in_quotes = false;
    let mut commas = 0usize;
    let mut semicolons = 0usize;

    for c in header_line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semicolons += 1,
            _ => {}
        }
    }

    if commas == 0 && semicolons > 0 { ';' } else { ',' }
}

fn is_blank_record(record: &[String]) -> bool {
    record.len() == 1 && record[0].is_empty()
}

fn read_records(text: &str, delimiter: char) -> Result<Vec<Vec<String>>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter as u8)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ImportError::Malformed(err.to_string()))?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if !is_blank_record(&fields) {
            records.push(fields);
        }
    }
    Ok(records)
}

/// Quote-aware state machine over one physical line.
fn tokenize_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => fields.push(finish_field(&mut current)),
            c => current.push(c),
        }
    }

    fields.push(finish_field(&mut current));
    fields
}

fn finish_field(current: &mut String) -> String {
    let value = std::mem::take(current);
    value.trim().to_string()
}
