//! Value format codecs for catalog entries.
//!
//! Every format implements the same pair of contracts:
//!
//! - [`OutputFormat`]: `write_start(columns)`, then `write_row(values)` per
//!   row, then `write_end()`.
//! - [`InputFormat`]: `read_header()`, then `read_row()` until it returns
//!   `None`. [`rows`] wraps an input as a forward-only iterator.
//!
//! Codecs own their sink or source, so dropping a codec closes it on every
//! exit path. The declared [`ValueType`] of each column decides whether a
//! cell travels as text or as bytes.

mod binary;
mod bson;
mod csv;
mod xml;

use std::fmt;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

pub use self::binary::{BinaryInput, BinaryOutput};
pub use self::bson::{BsonInput, BsonOutput};
pub use self::csv::{CsvInput, CsvOutput};
pub use self::xml::{XmlInput, XmlOutput};

use crate::core::value::{Value, ValueType};
use crate::error::{MigrateError, Result};

/// Supported entry formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    #[default]
    Csv,
    Xml,
    Bson,
    Bin,
}

impl FormatType {
    pub const ALL: [FormatType; 4] = [FormatType::Csv, FormatType::Xml, FormatType::Bson, FormatType::Bin];

    /// Name used in the catalog manifest and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            FormatType::Csv => "csv",
            FormatType::Xml => "xml",
            FormatType::Bson => "bson",
            FormatType::Bin => "bin",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.name()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(FormatType::Csv),
            "xml" => Some(FormatType::Xml),
            "bson" => Some(FormatType::Bson),
            "bin" | "binary" => Some(FormatType::Bin),
            _ => None,
        }
    }

    /// Encoder for `entry` writing into `sink`.
    pub fn output<'w>(self, entry: &str, sink: impl Write + Send + 'w) -> Box<dyn OutputFormat + 'w> {
        match self {
            FormatType::Csv => Box::new(CsvOutput::new(entry, sink)),
            FormatType::Xml => Box::new(XmlOutput::new(entry, sink)),
            FormatType::Bson => Box::new(BsonOutput::new(entry, sink)),
            FormatType::Bin => Box::new(BinaryOutput::new(entry, sink)),
        }
    }

    /// Decoder for `entry` reading from `source`.
    ///
    /// `declared` supplies column variants for formats whose header carries
    /// names only (CSV); self-describing formats ignore it.
    pub fn input<'r>(
        self,
        entry: &str,
        source: impl Read + Send + 'r,
        declared: &[FormatColumn],
    ) -> Box<dyn InputFormat + 'r> {
        match self {
            FormatType::Csv => Box::new(CsvInput::new(entry, source, declared)),
            FormatType::Xml => Box::new(XmlInput::new(entry, source)),
            FormatType::Bson => Box::new(BsonInput::new(entry, source)),
            FormatType::Bin => Box::new(BinaryInput::new(entry, source)),
        }
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A column as recorded in an entry header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatColumn {
    pub name: String,
    #[serde(default)]
    pub value_type: ValueType,
}

impl FormatColumn {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::String)
    }
}

pub trait OutputFormat: Send {
    fn format_type(&self) -> FormatType;

    fn write_start(&mut self, columns: &[FormatColumn]) -> Result<()>;

    fn write_row(&mut self, values: &[Value]) -> Result<()>;

    /// Terminate the entry and flush the sink.
    fn write_end(&mut self) -> Result<()>;
}

pub trait InputFormat: Send {
    fn format_type(&self) -> FormatType;

    /// Read the entry header. Must be called once before the first row.
    fn read_header(&mut self) -> Result<Vec<FormatColumn>>;

    /// Next row, or `None` once the entry is exhausted.
    fn read_row(&mut self) -> Result<Option<Vec<Value>>>;
}

/// Forward-only row sequence over an input whose header was read.
pub struct Rows<'a> {
    input: &'a mut dyn InputFormat,
    done: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.input.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub fn rows(input: &mut dyn InputFormat) -> Rows<'_> {
    Rows { input, done: false }
}

fn check_width(entry: &str, columns: usize, values: usize) -> Result<()> {
    if columns != values {
        return Err(MigrateError::format(
            entry,
            format!("row has {} values, header declares {} columns", values, columns),
        ));
    }
    Ok(())
}

/// Bitmap with bit `i` set when value `i` is NULL; `None` when nothing is NULL.
fn null_bitmap(values: &[Value]) -> Option<Vec<u8>> {
    if !values.iter().any(Value::is_null) {
        return None;
    }
    let mut bitmap = vec![0u8; values.len().div_ceil(8)];
    for (i, value) in values.iter().enumerate() {
        if value.is_null() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    Some(bitmap)
}

fn is_null_at(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

/// Fill `buf` unless the source is already at its end; returns bytes read.
fn read_prefix(source: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read `len` bytes announced by a length prefix. The buffer only grows
/// with data actually present, so a corrupt prefix ends in a format error
/// rather than a huge allocation.
fn read_sized(entry: &str, source: &mut impl Read, len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    source.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(MigrateError::format(
            entry,
            format!("truncated data: expected {} bytes, found {}", len, bytes.len()),
        ));
    }
    Ok(bytes)
}

/// Text form of a cell: hex for binary columns.
fn encode_text(value: &Value, value_type: ValueType) -> Option<String> {
    match value_type {
        ValueType::Binary => value.as_bytes().map(hex::encode),
        ValueType::String => value.as_str().map(|s| s.into_owned()),
    }
}

fn decode_text(entry: &str, text: &str, value_type: ValueType) -> Result<Value> {
    match value_type {
        ValueType::Binary => hex::decode(text.trim())
            .map(Value::Binary)
            .map_err(|e| MigrateError::format(entry, format!("invalid hex payload: {}", e))),
        ValueType::String => Ok(Value::string(text)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that stays readable after the codec consumed it.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn columns() -> Vec<FormatColumn> {
        vec![
            FormatColumn::string("id"),
            FormatColumn::string("note"),
            FormatColumn::new("payload", ValueType::Binary),
        ]
    }

    pub(crate) fn sample_rows() -> Vec<Vec<Value>> {
        vec![
            vec![Value::string("1"), Value::string("plain"), Value::binary(vec![0u8, 1, 2])],
            vec![Value::string("2"), Value::string(""), Value::Null],
            vec![Value::string("3"), Value::Null, Value::binary(b"<a&b>\0".to_vec())],
            vec![
                Value::string("4"),
                Value::string("<tag attr=\"x\"> & 'quotes', comma\nnew line"),
                Value::binary(Vec::new()),
            ],
            vec![Value::string("5"), Value::string("\\N"), Value::binary(vec![0xff, 0x00])],
            vec![Value::Null, Value::Null, Value::Null],
        ]
    }

    pub(crate) fn encode(format: FormatType, columns: &[FormatColumn], rows: &[Vec<Value>]) -> Vec<u8> {
        let buffer = SharedBuffer::default();
        let mut output = format.output("test", buffer.clone());
        output.write_start(columns).unwrap();
        for row in rows {
            output.write_row(row).unwrap();
        }
        output.write_end().unwrap();
        drop(output);
        buffer.bytes()
    }

    #[test]
    fn test_round_trip_every_format() {
        let rows = sample_rows();
        for format in FormatType::ALL {
            let bytes = encode(format, &columns(), &rows);
            let mut input = format.input("test", bytes.as_slice(), &columns());
            assert_eq!(input.format_type(), format);
            assert_eq!(input.read_header().unwrap(), columns(), "{format} header");
            let decoded: Vec<Vec<Value>> = super::rows(input.as_mut()).collect::<Result<_>>().unwrap();
            assert_eq!(decoded, rows, "{format} rows");
        }
    }

    #[test]
    fn test_empty_entry_round_trip() {
        for format in FormatType::ALL {
            let bytes = encode(format, &columns(), &[]);
            let mut input = format.input("test", bytes.as_slice(), &columns());
            assert_eq!(input.read_header().unwrap().len(), 3);
            assert!(input.read_row().unwrap().is_none(), "{format}");
            assert!(input.read_row().unwrap().is_none(), "{format} stays exhausted");
        }
    }

    #[test]
    fn test_row_width_is_checked() {
        for format in FormatType::ALL {
            let mut output = format.output("orders", Vec::new());
            output.write_start(&columns()).unwrap();
            let err = output.write_row(&[Value::string("1")]).unwrap_err();
            assert!(matches!(err, MigrateError::Format { ref entry, .. } if entry == "orders"), "{format}");
        }
    }

    #[test]
    fn test_null_bitmap() {
        assert_eq!(null_bitmap(&[Value::string("a"), Value::string("b")]), None);
        let values: Vec<Value> = (0..10)
            .map(|i| if i == 1 || i == 9 { Value::Null } else { Value::string("x") })
            .collect();
        let bitmap = null_bitmap(&values).unwrap();
        assert_eq!(bitmap, vec![0b0000_0010, 0b0000_0010]);
        assert!(is_null_at(&bitmap, 9));
        assert!(!is_null_at(&bitmap, 8));
        assert!(!is_null_at(&bitmap, 40));
    }

    #[test]
    fn test_format_names() {
        for format in FormatType::ALL {
            assert_eq!(FormatType::from_name(format.name()), Some(format));
        }
        assert_eq!(FormatType::from_name("BINARY"), Some(FormatType::Bin));
        assert_eq!(FormatType::from_name("parquet"), None);
    }
}
