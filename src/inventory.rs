//! Device inventory: maps OLT names to their management addresses.
//!
//! The inventory is read from a CSV file with an `olt` and an `ip` column,
//! e.g.
//!
//! ```text
//! olt,ip
//! OLT-1,10.0.0.5
//! OLT-2,10.0.0.6
//! ```
//!
//! Lookups never fail: an unknown name, or an inventory that could not be
//! loaded, simply yields no address.

use std::collections::HashMap;
use std::path::Path;

use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Column holding the device name.
pub const NAME_COLUMN: &str = "olt";

/// Column holding the device address.
pub const ADDRESS_COLUMN: &str = "ip";

/// A single inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceRecord {
    pub name: String,
    pub address: String,
}

/// Name-to-address table, kept in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInventory {
    records: Vec<DeviceRecord>,
    index: HashMap<String, usize>,
}

impl DeviceInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an inventory from a CSV file.
    ///
    /// A missing, unreadable or malformed file is logged and yields an empty
    /// inventory.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(inventory) => inventory,
            Err(err) => {
                warn!("Error: device inventory {} not loaded: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Loads an inventory from a CSV file, reporting why it could not be read.
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_csv_str(&text)
    }

    /// Parses CSV text whose header names an `olt` and an `ip` column.
    ///
    /// Blank lines are skipped, as are rows missing either value. A later row
    /// with the same name replaces the earlier address.
    pub fn from_csv_str(text: &str) -> Result<Self, SessionError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut rows = parse_rows(text).into_iter();

        let columns = rows
            .next()
            .ok_or_else(|| SessionError::InventoryFormatError("missing header row".to_string()))?;
        let column = |name: &str| {
            columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    SessionError::InventoryFormatError(format!("header has no '{name}' column"))
                })
        };
        let name_idx = column(NAME_COLUMN)?;
        let address_idx = column(ADDRESS_COLUMN)?;

        let mut inventory = Self::new();
        for (row_no, fields) in rows.enumerate() {
            let name = fields.get(name_idx).map(String::as_str).unwrap_or("");
            let address = fields.get(address_idx).map(String::as_str).unwrap_or("");
            if name.is_empty() || address.is_empty() {
                warn!("skipping incomplete inventory row {}: {:?}", row_no + 1, fields);
                continue;
            }
            inventory.insert(name, address);
        }
        Ok(inventory)
    }

    /// Adds or replaces a device.
    pub fn insert(&mut self, name: impl Into<String>, address: impl Into<String>) {
        let name = name.into();
        let address = address.into();
        match self.index.get(&name) {
            Some(&idx) => self.records[idx].address = address,
            None => {
                self.index.insert(name.clone(), self.records.len());
                self.records.push(DeviceRecord { name, address });
            }
        }
    }

    /// Address of the named device, if known.
    pub fn address(&self, name: &str) -> Option<&str> {
        self.index
            .get(name)
            .map(|&idx| self.records[idx].address.as_str())
    }

    /// Device names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Splits CSV text into rows of fields.
///
/// Fields may be double-quoted, in which case they can hold commas, line
/// breaks and `""` escapes. Unquoted fields are trimmed. Blank lines yield
/// no row.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = FieldBuf::default();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if field.in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.text.push('"');
                }
                '"' => field.in_quotes = false,
                _ => field.text.push(c),
            }
            continue;
        }
        match c {
            '"' if !field.quoted && field.text.trim().is_empty() => {
                field.text.clear();
                field.quoted = true;
                field.in_quotes = true;
            }
            ',' => row.push(field.finish()),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' => {
                row.push(field.finish());
                push_row(&mut rows, std::mem::take(&mut row));
            }
            // Whitespace between a closing quote and the separator.
            _ if field.quoted && c.is_whitespace() => {}
            _ => field.text.push(c),
        }
    }
    if field.quoted || !field.text.is_empty() || !row.is_empty() {
        row.push(field.finish());
        push_row(&mut rows, row);
    }
    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if !(row.len() == 1 && row[0].is_empty()) {
        rows.push(row);
    }
}

#[derive(Default)]
struct FieldBuf {
    text: String,
    quoted: bool,
    in_quotes: bool,
}

impl FieldBuf {
    fn finish(&mut self) -> String {
        let text = std::mem::take(&mut self.text);
        let quoted = std::mem::take(&mut self.quoted);
        self.in_quotes = false;
        if quoted { text } else { text.trim().to_string() }
    }
}
