//! Query-related backend messages.

use std::mem::size_of;

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{ensure_consumed, read_bytes, read_cstr, read_nullable_bytes, read_u16};
use crate::protocol::types::{FormatCode, Oid};

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct FieldDescriptionTail {
    table_oid: U32BE,
    column_id: I16BE,
    type_oid: U32BE,
    type_size: I16BE,
    type_modifier: I32BE,
    format: U16BE,
}

/// Field description within a RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Field name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
    /// Format code (0=text, 1=binary)
    pub format: FormatCode,
}

/// RowDescription message - describes the columns in a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescription {
    fields: Vec<FieldDescription>,
}

impl RowDescription {
    /// Create from field descriptions.
    pub fn new(fields: Vec<FieldDescription>) -> Self {
        Self { fields }
    }

    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

        let (num_fields, mut data) = read_u16(payload)?;
        let mut fields = Vec::with_capacity(num_fields as usize);

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (tail_bytes, rest) = read_bytes(rest, TAIL_SIZE)?;
            let tail = FieldDescriptionTail::read_from_bytes(tail_bytes)
                .map_err(|e| Error::Decode(format!("FieldDescription tail: {e:?}")))?;

            fields.push(FieldDescription {
                name: name.to_string(),
                table_oid: tail.table_oid.get(),
                column_id: tail.column_id.get(),
                type_oid: tail.type_oid.get(),
                type_size: tail.type_size.get(),
                type_modifier: tail.type_modifier.get(),
                format: FormatCode::from_u16(tail.format.get()),
            });

            data = rest;
        }
        ensure_consumed("RowDescription", data)?;

        Ok(Self { fields })
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get field descriptions.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Iterate over field descriptions.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescription> {
        self.fields.iter()
    }

    /// Index of the first field named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// DataRow message - contains a single row of data.
///
/// Column values are raw bytes in the format announced by the RowDescription;
/// `None` represents SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    columns: Vec<Option<Vec<u8>>>,
}

impl DataRow {
    /// Create from column values.
    pub fn new(columns: Vec<Option<Vec<u8>>>) -> Self {
        Self { columns }
    }

    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_columns, mut data) = read_u16(payload)?;
        let mut columns = Vec::with_capacity(num_columns as usize);

        for _ in 0..num_columns {
            let (value, rest) = read_nullable_bytes(data)?;
            columns.push(value.map(<[u8]>::to_vec));
            data = rest;
        }
        ensure_consumed("DataRow", data)?;

        Ok(Self { columns })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get a column value by index.
    ///
    /// Returns `None` if out of range, `Some(None)` if the column is NULL.
    pub fn get(&self, index: usize) -> Option<Option<&[u8]>> {
        self.columns.get(index).map(|c| c.as_deref())
    }

    /// Iterate over column values.
    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.columns.iter().map(|c| c.as_deref())
    }

    /// Take the column values.
    pub fn into_columns(self) -> Vec<Option<Vec<u8>>> {
        self.columns
    }
}

/// CommandComplete message - indicates successful completion of a command.
///
/// The tag is split into the command name and the counts it carries:
/// - `"INSERT 0 1"` → command `INSERT`, oid `0`, rows `1`
/// - `"SELECT 5"` / `"UPDATE 10"` → command and rows
/// - `"CREATE TABLE"` → the whole tag is the command, no counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandComplete {
    tag: String,
    command: String,
    oid: Option<Oid>,
    rows: Option<u64>,
}

impl CommandComplete {
    /// Parse a CommandComplete message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (tag, rest) = read_cstr(payload)?;
        ensure_consumed("CommandComplete", rest)?;
        Ok(Self::from_tag(tag))
    }

    /// Interpret a command tag.
    pub fn from_tag(tag: &str) -> Self {
        let parts: Vec<&str> = tag.split_whitespace().collect();

        let parsed = match parts.as_slice() {
            ["INSERT", oid, rows] => match (oid.parse::<Oid>().ok(), rows.parse::<u64>().ok()) {
                (Some(oid), Some(rows)) => Some(("INSERT", Some(oid), Some(rows))),
                _ => None,
            },
            [command @ ("DELETE" | "UPDATE" | "MOVE" | "FETCH" | "COPY" | "SELECT"), rows] => {
                rows.parse::<u64>().ok().map(|rows| (*command, None, Some(rows)))
            }
            _ => None,
        };

        match parsed {
            Some((command, oid, rows)) => Self {
                tag: tag.to_string(),
                command: command.to_string(),
                oid,
                rows,
            },
            None => Self {
                tag: tag.to_string(),
                command: tag.to_string(),
                oid: None,
                rows: None,
            },
        }
    }

    /// Raw command tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Command name (e.g. `INSERT`, `SELECT`, `CREATE TABLE`).
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Object id reported by INSERT.
    pub fn oid(&self) -> Option<Oid> {
        self.oid
    }

    /// Number of rows affected or returned.
    pub fn rows(&self) -> Option<u64> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_complete_insert() {
        let cc = CommandComplete::parse(b"INSERT 0 1\0").unwrap();
        assert_eq!(cc.command(), "INSERT");
        assert_eq!(cc.oid(), Some(0));
        assert_eq!(cc.rows(), Some(1));
    }

    #[test]
    fn command_complete_select() {
        let cc = CommandComplete::parse(b"SELECT 5\0").unwrap();
        assert_eq!(cc.command(), "SELECT");
        assert_eq!(cc.oid(), None);
        assert_eq!(cc.rows(), Some(5));
    }

    #[test]
    fn command_complete_without_count() {
        let cc = CommandComplete::parse(b"CREATE TABLE\0").unwrap();
        assert_eq!(cc.command(), "CREATE TABLE");
        assert_eq!(cc.oid(), None);
        assert_eq!(cc.rows(), None);
    }

    #[test]
    fn command_complete_row_count_commands() {
        for (tag, command, rows) in [
            ("DELETE 3", "DELETE", 3),
            ("UPDATE 10", "UPDATE", 10),
            ("MOVE 2", "MOVE", 2),
            ("FETCH 4", "FETCH", 4),
            ("COPY 7", "COPY", 7),
        ] {
            let cc = CommandComplete::from_tag(tag);
            assert_eq!(cc.command(), command);
            assert_eq!(cc.rows(), Some(rows));
            assert_eq!(cc.oid(), None);
        }
    }

    #[test]
    fn data_row_with_null() {
        let mut payload = 2_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&1_i32.to_be_bytes());
        payload.push(b'7');
        payload.extend_from_slice(&(-1_i32).to_be_bytes());

        let row = DataRow::parse(&payload).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(Some(&b"7"[..])));
        assert_eq!(row.get(1), Some(None));
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn data_row_truncated_value() {
        let mut payload = 1_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&5_i32.to_be_bytes());
        payload.extend_from_slice(b"ab");
        assert!(matches!(DataRow::parse(&payload), Err(Error::Decode(_))));
    }

    #[test]
    fn row_description_fields() {
        let mut payload = 1_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"num\0");
        payload.extend_from_slice(&0_u32.to_be_bytes());
        payload.extend_from_slice(&0_i16.to_be_bytes());
        payload.extend_from_slice(&23_u32.to_be_bytes());
        payload.extend_from_slice(&4_i16.to_be_bytes());
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&0_u16.to_be_bytes());

        let desc = RowDescription::parse(&payload).unwrap();
        assert_eq!(desc.len(), 1);
        let field = &desc.fields()[0];
        assert_eq!(field.name, "num");
        assert_eq!(field.type_oid, 23);
        assert_eq!(field.type_size, 4);
        assert_eq!(field.format, FormatCode::Text);
        assert_eq!(desc.index_of("num"), Some(0));

        // A short tail must not panic.
        assert!(RowDescription::parse(&payload[..payload.len() - 3]).is_err());
    }
}
