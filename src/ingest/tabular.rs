//! Header-first delimited text -> ordered records

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, warn};

use super::Record;

/// Parser for one delimited table
#[derive(Debug, Clone, Copy)]
pub struct TabularIngestor {
    delimiter: u8,
}

impl Default for TabularIngestor {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl TabularIngestor {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Parse `text` into one record per data row.
    ///
    /// Quoted fields may contain the delimiter; surrounding quotes are stripped and every
    /// value is trimmed. Each line is read on its own, so an unterminated quote spoils only
    /// its own row. Rows shorter than the header map missing columns to `""`, extra values
    /// are dropped. Never fails: unreadable rows are skipped with a warning.
    pub fn parse(&self, text: &str) -> Vec<Record> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let Some(header_line) = lines.next() else {
            return Vec::new();
        };

        let headers: Vec<String> = match self.read_line(header_line) {
            Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
            Err(e) => {
                warn!("Unreadable header row, table ignored: {}", e);
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for (n, line) in lines.enumerate() {
            match self.read_line(line) {
                Ok(row) => records.push(to_record(&headers, &row)),
                Err(e) => warn!("Skipping malformed row {}: {}", n + 1, e),
            }
        }

        debug!(
            "Parsed {} rows across {} columns",
            records.len(),
            headers.len()
        );
        records
    }

    fn read_line(&self, line: &str) -> Result<StringRecord, csv::Error> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(line.as_bytes());
        let mut row = StringRecord::new();
        reader.read_record(&mut row)?;
        Ok(row)
    }
}

fn to_record(headers: &[String], row: &StringRecord) -> Record {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| (header.clone(), row.get(i).unwrap_or("").to_string()))
        .collect()
}

/// Parse comma-delimited text with the default ingestor
pub fn parse(text: &str) -> Vec<Record> {
    TabularIngestor::default().parse(text)
}
