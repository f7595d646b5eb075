use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Fixed payload size of a `Text` field. The on-disk slot reserves this many
/// bytes after the length prefix regardless of the actual string length.
pub const TEXT_LEN: usize = 128;

/// Data types supported by the storage engine. All types are fixed-width so
/// that every slot on a page occupies the same number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    Text,
}

impl DataType {
    /// Serialized width of a field of this type, in bytes.
    pub fn width(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Text => 4 + TEXT_LEN,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Text(_) => DataType::Text,
        }
    }

    /// Writes this value in its fixed-width big-endian form.
    pub fn serialize<W: Write>(&self, w: &mut W) -> StorageResult<()> {
        match self {
            Value::Int(v) => w.write_i32::<BigEndian>(*v)?,
            Value::Text(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > TEXT_LEN {
                    return Err(StorageError::IntegrityViolation(format!(
                        "text value of {} bytes exceeds the {} byte field width",
                        bytes.len(),
                        TEXT_LEN
                    )));
                }
                w.write_u32::<BigEndian>(bytes.len() as u32)?;
                w.write_all(bytes)?;
                // Pad the slot out to its fixed width.
                let padding = [0u8; TEXT_LEN];
                w.write_all(&padding[..TEXT_LEN - bytes.len()])?;
            }
        }
        Ok(())
    }

    /// Reads a value of the given type from its fixed-width form.
    pub fn deserialize<R: Read>(ty: DataType, r: &mut R) -> StorageResult<Value> {
        match ty {
            DataType::Int => Ok(Value::Int(r.read_i32::<BigEndian>()?)),
            DataType::Text => {
                let len = r.read_u32::<BigEndian>()? as usize;
                if len > TEXT_LEN {
                    return Err(StorageError::IntegrityViolation(format!(
                        "text length prefix {} exceeds the {} byte field width",
                        len, TEXT_LEN
                    )));
                }
                let mut buf = vec![0u8; TEXT_LEN];
                r.read_exact(&mut buf)?;
                buf.truncate(len);
                let s = String::from_utf8(buf).map_err(|e| {
                    StorageError::IntegrityViolation(format!("text field is not UTF-8: {}", e))
                })?;
                Ok(Value::Text(s))
            }
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}
