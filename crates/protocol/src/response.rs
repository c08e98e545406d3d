//! Parsing of remote script stdout.
//!
//! Both scripts answer with a CSV document: one header row naming the
//! columns, then one row per manifest entry. Empty fields mean "no
//! value" and are normalized to `None`.

use std::collections::HashMap;

use crate::ProtocolError;

/// One parsed CSV row: column name to optional value.
pub type Record = HashMap<String, Option<String>>;

/// Parses a CSV document with a header row into records.
///
/// Handles quoted fields with doubled-quote escapes and CRLF line ends.
/// Rows shorter than the header leave the missing columns absent; extra
/// fields are an error.
pub fn parse_csv(text: &str) -> Result<Vec<Record>, ProtocolError> {
    let mut rows = split_rows(text)?;
    if rows.is_empty() {
        return Err(ProtocolError::MissingHeader);
    }
    let header = rows.remove(0);

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() > header.len() {
            return Err(ProtocolError::MalformedCsv(format!(
                "row has {} fields, header has {}",
                row.len(),
                header.len()
            )));
        }
        let mut record = Record::with_capacity(row.len());
        for (name, value) in header.iter().zip(row) {
            let value = if value.is_empty() { None } else { Some(value) };
            record.insert(name.clone(), value);
        }
        records.push(record);
    }
    Ok(records)
}

/// Re-indexes records into a map keyed by the named column.
///
/// A record without a value in the key column is an error: the engine
/// could not attribute it to any manifest entry.
pub fn index_records(
    records: Vec<Record>,
    key: &str,
) -> Result<HashMap<String, Record>, ProtocolError> {
    let mut indexed = HashMap::with_capacity(records.len());
    for record in records {
        let id = record
            .get(key)
            .and_then(|v| v.clone())
            .ok_or_else(|| ProtocolError::MissingColumn(key.to_string()))?;
        indexed.insert(id, record);
    }
    Ok(indexed)
}

/// Interprets a CSV field as a boolean flag.
///
/// The remote shell prints booleans as `True`/`False`; absent fields stay
/// absent.
pub fn parse_flag(value: Option<&str>) -> Option<bool> {
    value.map(|v| v.eq_ignore_ascii_case("true"))
}

fn split_rows(text: &str) -> Result<Vec<Vec<String>>, ProtocolError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut saw_field = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                saw_field = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                saw_field = true;
            }
            '\r' => {}
            '\n' => {
                if saw_field || !field.is_empty() {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                saw_field = false;
            }
            _ => {
                field.push(c);
                saw_field = true;
            }
        }
    }
    if in_quotes {
        return Err(ProtocolError::MalformedCsv("unterminated quote".into()));
    }
    if saw_field || !field.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}
