//! BSON entries: a header document followed by one document per row.
//!
//! Header: `{ "columns": [ { "name": .., "variant": .. }, .. ] }`.
//! Row: `{ "n": null | <binary null bitmap>, "v": [ non-null values ] }`.
//! The bitmap is present only when the row has at least one NULL.

use std::io::{Read, Write};

use ::bson::spec::BinarySubtype;
use ::bson::{Binary, Bson, Document};

use super::{check_width, is_null_at, null_bitmap, read_prefix, read_sized, FormatColumn, FormatType, InputFormat, OutputFormat};
use crate::core::value::{Value, ValueType};
use crate::error::{MigrateError, Result};

const COLUMNS: &str = "columns";
const NAME: &str = "name";
const VARIANT: &str = "variant";
const NULLS: &str = "n";
const VALUES: &str = "v";

fn document<const N: usize>(fields: [(&str, Bson); N]) -> Document {
    let mut document = Document::new();
    for (key, value) in fields {
        document.insert(key, value);
    }
    document
}

fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    })
}

pub struct BsonOutput<W: Write> {
    entry: String,
    sink: W,
    value_types: Vec<ValueType>,
}

impl<W: Write> BsonOutput<W> {
    pub fn new(entry: &str, sink: W) -> Self {
        Self {
            entry: entry.to_string(),
            sink,
            value_types: Vec::new(),
        }
    }

    fn write_document(&mut self, document: &Document) -> Result<()> {
        document
            .to_writer(&mut self.sink)
            .map_err(|e| MigrateError::format(&self.entry, e))
    }
}

impl<W: Write + Send> OutputFormat for BsonOutput<W> {
    fn format_type(&self) -> FormatType {
        FormatType::Bson
    }

    fn write_start(&mut self, columns: &[FormatColumn]) -> Result<()> {
        self.value_types = columns.iter().map(|c| c.value_type).collect();
        let columns: Vec<Bson> = columns
            .iter()
            .map(|c| {
                Bson::Document(document([
                    (NAME, Bson::from(c.name.as_str())),
                    (VARIANT, Bson::from(c.value_type.as_str())),
                ]))
            })
            .collect();
        self.write_document(&document([(COLUMNS, Bson::Array(columns))]))
    }

    fn write_row(&mut self, values: &[Value]) -> Result<()> {
        check_width(&self.entry, self.value_types.len(), values.len())?;
        let nulls = match null_bitmap(values) {
            Some(bitmap) => binary(bitmap),
            None => Bson::Null,
        };
        let mut payload = Vec::with_capacity(values.len());
        for (value, value_type) in values.iter().zip(&self.value_types) {
            let bson = match (value, value_type) {
                (Value::Null, _) => continue,
                (value, ValueType::Binary) => binary(value.as_bytes().unwrap_or_default().to_vec()),
                (value, ValueType::String) => Bson::String(value.as_str().unwrap_or_default().into_owned()),
            };
            payload.push(bson);
        }
        self.write_document(&document([(NULLS, nulls), (VALUES, Bson::Array(payload))]))
    }

    fn write_end(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

pub struct BsonInput<R: Read> {
    entry: String,
    source: R,
    value_types: Vec<ValueType>,
}

impl<R: Read> BsonInput<R> {
    pub fn new(entry: &str, source: R) -> Self {
        Self {
            entry: entry.to_string(),
            source,
            value_types: Vec::new(),
        }
    }

    fn error(&self, message: impl ToString) -> MigrateError {
        MigrateError::format(&self.entry, message)
    }

    /// Next length-prefixed document, `None` at a clean end of stream.
    fn read_document(&mut self) -> Result<Option<Document>> {
        let mut prefix = [0u8; 4];
        match read_prefix(&mut self.source, &mut prefix)? {
            0 => return Ok(None),
            4 => {}
            _ => return Err(self.error("truncated document length")),
        }
        let size = i32::from_le_bytes(prefix);
        if size < 5 {
            return Err(self.error(format!("invalid document length {}", size)));
        }
        let body = read_sized(&self.entry, &mut self.source, size as usize - 4)?;
        let mut buf = Vec::with_capacity(size as usize);
        buf.extend_from_slice(&prefix);
        buf.extend_from_slice(&body);
        let mut slice = buf.as_slice();
        Document::from_reader(&mut slice).map(Some).map_err(|e| self.error(e))
    }

    fn decode(&self, document: &Document) -> Result<Vec<Value>> {
        let bitmap: &[u8] = match document.get(NULLS) {
            None | Some(Bson::Null) => &[],
            Some(Bson::Binary(b)) => &b.bytes,
            Some(other) => return Err(self.error(format!("unexpected null bitmap {}", other))),
        };
        let payload = document.get_array(VALUES).map_err(|e| self.error(e))?;
        let mut payload = payload.iter();
        let mut values = Vec::with_capacity(self.value_types.len());
        for (i, value_type) in self.value_types.iter().enumerate() {
            if is_null_at(bitmap, i) {
                values.push(Value::Null);
                continue;
            }
            let value = match (payload.next(), value_type) {
                (Some(Bson::Binary(b)), ValueType::Binary) => Value::Binary(b.bytes.clone()),
                (Some(Bson::Binary(b)), ValueType::String) => {
                    Value::String(String::from_utf8_lossy(&b.bytes).into_owned())
                }
                (Some(Bson::String(s)), ValueType::String) => Value::String(s.clone()),
                (Some(Bson::String(s)), ValueType::Binary) => Value::Binary(s.clone().into_bytes()),
                (Some(other), _) => return Err(self.error(format!("unexpected value {} in column {}", other, i))),
                (None, _) => return Err(self.error(format!("row is missing a value for column {}", i))),
            };
            values.push(value);
        }
        if payload.next().is_some() {
            return Err(self.error("row has more values than columns"));
        }
        Ok(values)
    }
}

impl<R: Read + Send> InputFormat for BsonInput<R> {
    fn format_type(&self) -> FormatType {
        FormatType::Bson
    }

    fn read_header(&mut self) -> Result<Vec<FormatColumn>> {
        let header = self
            .read_document()?
            .ok_or_else(|| self.error("missing header document"))?;
        let columns = header.get_array(COLUMNS).map_err(|e| self.error(e))?;
        let mut result = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column
                .as_document()
                .ok_or_else(|| self.error("column descriptor is not a document"))?;
            let name = column.get_str(NAME).map_err(|e| self.error(e))?;
            let variant = column.get_str(VARIANT).ok();
            result.push(FormatColumn::new(name, ValueType::from_alias(variant)));
        }
        self.value_types = result.iter().map(|c| c.value_type).collect();
        Ok(result)
    }

    fn read_row(&mut self) -> Result<Option<Vec<Value>>> {
        match self.read_document()? {
            Some(document) => self.decode(&document).map(Some),
            None => Ok(None),
        }
    }
}
