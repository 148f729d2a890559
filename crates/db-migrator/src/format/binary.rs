//! Compact binary entries.
//!
//! Layout, integers big endian:
//!
//! ```text
//! "DBMB" version:u8 columns:u32 { name_len:u32 name variant:u8 }*
//! { ROW { len:u32 bytes }* | ROW_WITH_NULLS bitmap { len:u32 bytes }* }*
//! END
//! ```
//!
//! The null bitmap (`ceil(columns / 8)` bytes) follows the row marker only
//! when the row holds a NULL; values are written for non-null cells only.

use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};

use super::{
    check_width, is_null_at, null_bitmap, read_prefix, read_sized, FormatColumn, FormatType, InputFormat,
    OutputFormat,
};
use crate::core::value::{Value, ValueType};
use crate::error::{MigrateError, Result};

const MAGIC: &[u8; 4] = b"DBMB";
const VERSION: u8 = 1;

const ROW: u8 = 0x01;
const ROW_WITH_NULLS: u8 = 0x02;
const END: u8 = 0xff;

fn variant_code(value_type: ValueType) -> u8 {
    match value_type {
        ValueType::String => 0,
        ValueType::Binary => 1,
    }
}

pub struct BinaryOutput<W: Write> {
    entry: String,
    sink: W,
    columns: usize,
    buffer: BytesMut,
}

impl<W: Write> BinaryOutput<W> {
    pub fn new(entry: &str, sink: W) -> Self {
        Self {
            entry: entry.to_string(),
            sink,
            columns: 0,
            buffer: BytesMut::with_capacity(8 * 1024),
        }
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| MigrateError::format(&self.entry, format!("value of {} bytes is too large", bytes.len())))?;
        self.buffer.put_u32(len);
        self.buffer.put_slice(bytes);
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        self.sink.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write + Send> OutputFormat for BinaryOutput<W> {
    fn format_type(&self) -> FormatType {
        FormatType::Bin
    }

    fn write_start(&mut self, columns: &[FormatColumn]) -> Result<()> {
        self.columns = columns.len();
        self.buffer.put_slice(MAGIC);
        self.buffer.put_u8(VERSION);
        self.buffer.put_u32(columns.len() as u32);
        for column in columns {
            self.put_bytes(column.name.as_bytes())?;
            self.buffer.put_u8(variant_code(column.value_type));
        }
        self.flush_buffer()
    }

    fn write_row(&mut self, values: &[Value]) -> Result<()> {
        check_width(&self.entry, self.columns, values.len())?;
        match null_bitmap(values) {
            Some(bitmap) => {
                self.buffer.put_u8(ROW_WITH_NULLS);
                self.buffer.put_slice(&bitmap);
            }
            None => self.buffer.put_u8(ROW),
        }
        for value in values {
            if let Some(bytes) = value.as_bytes() {
                self.put_bytes(bytes)?;
            }
        }
        self.flush_buffer()
    }

    fn write_end(&mut self) -> Result<()> {
        self.buffer.put_u8(END);
        self.flush_buffer()?;
        self.sink.flush()?;
        Ok(())
    }
}

pub struct BinaryInput<R: Read> {
    entry: String,
    source: R,
    value_types: Vec<ValueType>,
    finished: bool,
}

impl<R: Read> BinaryInput<R> {
    pub fn new(entry: &str, source: R) -> Self {
        Self {
            entry: entry.to_string(),
            source,
            value_types: Vec::new(),
            finished: false,
        }
    }

    fn error(&self, message: impl ToString) -> MigrateError {
        MigrateError::format(&self.entry, message)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if read_prefix(&mut self.source, buf)? != buf.len() {
            return Err(self.error("truncated data"));
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        read_sized(&self.entry, &mut self.source, len)
    }
}

impl<R: Read + Send> InputFormat for BinaryInput<R> {
    fn format_type(&self) -> FormatType {
        FormatType::Bin
    }

    fn read_header(&mut self) -> Result<Vec<FormatColumn>> {
        let mut magic = [0u8; 4];
        if read_prefix(&mut self.source, &mut magic)? != magic.len() || &magic != MAGIC {
            return Err(self.error("not a binary catalog entry"));
        }
        let version = self.read_u8()?;
        if version != VERSION {
            return Err(self.error(format!("unsupported version {}", version)));
        }
        let count = self.read_u32()?;
        let mut columns = Vec::new();
        for _ in 0..count {
            let name = String::from_utf8(self.read_bytes()?).map_err(|e| self.error(e))?;
            let value_type = match self.read_u8()? {
                1 => ValueType::Binary,
                _ => ValueType::String,
            };
            columns.push(FormatColumn::new(name, value_type));
        }
        self.value_types = columns.iter().map(|c| c.value_type).collect();
        Ok(columns)
    }

    fn read_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.finished {
            return Ok(None);
        }
        let mut marker = [0u8; 1];
        if read_prefix(&mut self.source, &mut marker)? == 0 {
            return Err(self.error("entry ends without its end marker"));
        }
        let bitmap = match marker[0] {
            ROW => Vec::new(),
            ROW_WITH_NULLS => {
                let mut bitmap = vec![0u8; self.value_types.len().div_ceil(8)];
                self.read_exact(&mut bitmap)?;
                bitmap
            }
            END => {
                self.finished = true;
                return Ok(None);
            }
            other => return Err(self.error(format!("unexpected row marker {:#04x}", other))),
        };
        let mut values = Vec::with_capacity(self.value_types.len());
        for i in 0..self.value_types.len() {
            if is_null_at(&bitmap, i) {
                values.push(Value::Null);
                continue;
            }
            let bytes = self.read_bytes()?;
            let value = match self.value_types[i] {
                ValueType::Binary => Value::Binary(bytes),
                ValueType::String => Value::String(String::from_utf8(bytes).map_err(|e| self.error(e))?),
            };
            values.push(value);
        }
        Ok(Some(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{columns, encode};

    fn header_len() -> usize {
        // magic, version, count, then (len + name + variant) per column
        4 + 1 + 4 + columns().iter().map(|c| 4 + c.name.len() + 1).sum::<usize>()
    }

    #[test]
    fn test_row_without_nulls_has_no_bitmap() {
        let row = vec![Value::string("1"), Value::string("a"), Value::binary(vec![0u8])];
        let bytes = encode(FormatType::Bin, &columns(), &[row]);
        let body = &bytes[header_len()..];
        assert_eq!(body[0], ROW);
        // marker, three length-prefixed values, end marker
        assert_eq!(body.len(), 1 + (4 + 1) * 3 + 1);
        assert_eq!(body[body.len() - 1], END);
    }

    #[test]
    fn test_row_with_nulls_carries_bitmap() {
        let row = vec![Value::string("1"), Value::Null, Value::binary(vec![0u8])];
        let bytes = encode(FormatType::Bin, &columns(), &[row]);
        let body = &bytes[header_len()..];
        assert_eq!(body[0], ROW_WITH_NULLS);
        assert_eq!(body[1], 0b0000_0010);
        assert_eq!(body.len(), 1 + 1 + (4 + 1) * 2 + 1);
    }

    #[test]
    fn test_rejects_foreign_data() {
        let mut input = BinaryInput::new("t", "id,name\n".as_bytes());
        assert!(matches!(input.read_header(), Err(MigrateError::Format { .. })));
    }

    #[test]
    fn test_missing_end_marker_is_an_error() {
        let row = vec![Value::string("1"), Value::string("a"), Value::binary(vec![0u8])];
        let bytes = encode(FormatType::Bin, &columns(), &[row.clone()]);
        // Cut right after the last row.
        let mut input = BinaryInput::new("t", &bytes[..bytes.len() - 1]);
        assert_eq!(input.read_header().unwrap().len(), 3);
        assert_eq!(input.read_row().unwrap(), Some(row));
        match input.read_row() {
            Err(MigrateError::Format { entry, message }) => {
                assert_eq!(entry, "t");
                assert!(message.contains("end marker"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_length_is_a_format_error() {
        let mut bytes = encode(FormatType::Bin, &columns(), &[]);
        bytes.truncate(header_len());
        bytes.push(ROW);
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(b"abc");
        let mut input = BinaryInput::new("t", bytes.as_slice());
        input.read_header().unwrap();
        assert!(matches!(input.read_row(), Err(MigrateError::Format { .. })));

        // A huge column count runs out of data instead of memory.
        let mut header = b"DBMB\x01".to_vec();
        header.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut input = BinaryInput::new("t", header.as_slice());
        assert!(matches!(input.read_header(), Err(MigrateError::Format { .. })));
    }
}
