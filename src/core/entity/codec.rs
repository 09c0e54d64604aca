//! Binary entity codec
//!
//! Serializes a field map to an opaque little-endian byte blob and back.
//! The primary key is not part of the blob; `deserialize` reattaches it.
//!
//! Layout: `u32` field count, then per field `u32` name length + UTF-8 name +
//! one tag byte + payload. Float vectors are a `u32` element count followed
//! by little-endian `f32`s.

use crate::core::common::PolystoreError;
use crate::core::entity::{Entity, Value};

const TAG_NULL: u8 = 0;
const TAG_STR: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_FLOAT_VEC: u8 = 5;

// Guard against corrupt length prefixes allocating unbounded buffers.
const MAX_SEGMENT_LEN: usize = 256 * 1024 * 1024;

/// Serialize an entity's field map (the PK is deliberately excluded).
#[must_use]
pub fn serialize(entity: &Entity) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + entity.len() * 16);
    write_u32(&mut out, entity.len() as u32);
    for (name, value) in entity.fields() {
        write_u32(&mut out, name.len() as u32);
        out.extend_from_slice(name.as_bytes());
        match value {
            Value::Null => out.push(TAG_NULL),
            Value::Str(s) => {
                out.push(TAG_STR);
                write_u32(&mut out, s.len() as u32);
                out.extend_from_slice(s.as_bytes());
            }
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Double(d) => {
                out.push(TAG_DOUBLE);
                out.extend_from_slice(&d.to_le_bytes());
            }
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Value::FloatVec(v) => {
                out.push(TAG_FLOAT_VEC);
                write_u32(&mut out, v.len() as u32);
                for f in v {
                    out.extend_from_slice(&f.to_le_bytes());
                }
            }
        }
    }
    out
}

/// Reconstruct an entity from its primary key and a serialized field map.
///
/// # Errors
///
/// Returns `PolystoreError::Deserialization` on truncated or malformed input.
pub fn deserialize(pk: impl Into<String>, bytes: &[u8]) -> Result<Entity, PolystoreError> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let field_count = cursor.read_u32()? as usize;
    let mut entity = Entity::new(pk);

    for _ in 0..field_count {
        let name_len = cursor.read_len()?;
        let name = String::from_utf8(cursor.read_bytes(name_len)?.to_vec())?;
        let tag = cursor.read_u8()?;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_STR => {
                let len = cursor.read_len()?;
                Value::Str(String::from_utf8(cursor.read_bytes(len)?.to_vec())?)
            }
            TAG_INT => Value::Int(i64::from_le_bytes(cursor.read_array::<8>()?)),
            TAG_DOUBLE => Value::Double(f64::from_le_bytes(cursor.read_array::<8>()?)),
            TAG_BOOL => Value::Bool(cursor.read_u8()? != 0),
            TAG_FLOAT_VEC => {
                let count = cursor.read_len()?;
                let mut v = Vec::with_capacity(count.min(MAX_SEGMENT_LEN / 4));
                for _ in 0..count {
                    v.push(f32::from_le_bytes(cursor.read_array::<4>()?));
                }
                Value::FloatVec(v)
            }
            other => {
                return Err(PolystoreError::Deserialization(format!(
                    "unknown value tag {other}"
                )))
            }
        };
        entity.set(name, value);
    }

    if cursor.pos != bytes.len() {
        return Err(PolystoreError::Deserialization(format!(
            "{} trailing bytes after last field",
            bytes.len() - cursor.pos
        )));
    }
    Ok(entity)
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PolystoreError> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            PolystoreError::Deserialization("length overflow".to_string())
        })?;
        if end > self.bytes.len() {
            return Err(PolystoreError::Deserialization(format!(
                "truncated input: need {len} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PolystoreError> {
        let slice = self.read_bytes(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(slice);
        Ok(arr)
    }

    fn read_u8(&mut self) -> Result<u8, PolystoreError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, PolystoreError> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    fn read_len(&mut self) -> Result<usize, PolystoreError> {
        let len = self.read_u32()? as usize;
        if len > MAX_SEGMENT_LEN {
            return Err(PolystoreError::Deserialization(format!(
                "segment length {len} exceeds maximum allowed size"
            )));
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_variants() {
        let entity = Entity::new("pk1")
            .with_field("s", Value::Str("hello world".to_string()))
            .with_field("i", Value::Int(-42))
            .with_field("d", Value::Double(3.14159))
            .with_field("b", Value::Bool(true))
            .with_field("n", Value::Null)
            .with_field("v", Value::FloatVec(vec![1.0, -2.5, 0.0, f32::MAX]));

        let bytes = serialize(&entity);
        let decoded = deserialize("pk1", &bytes).unwrap();
        assert_eq!(decoded, entity);
    }

    #[test]
    fn test_round_trip_empty_entity() {
        let entity = Entity::new("empty");
        let bytes = serialize(&entity);
        assert_eq!(deserialize("empty", &bytes).unwrap(), entity);
    }

    #[test]
    fn test_pk_not_in_blob() {
        let a = Entity::new("a").with_field("x", Value::Int(1));
        let b = Entity::new("b").with_field("x", Value::Int(1));
        assert_eq!(serialize(&a), serialize(&b));

        let decoded = deserialize("b", &serialize(&a)).unwrap();
        assert_eq!(decoded.pk(), "b");
    }

    #[test]
    fn test_unicode_fields() {
        let entity = Entity::new("u")
            .with_field("grüße", Value::Str("héllo wörld ✓".to_string()));
        let decoded = deserialize("u", &serialize(&entity)).unwrap();
        assert_eq!(decoded, entity);
    }

    #[test]
    fn test_truncated_input_rejected() {
        let entity = Entity::new("t").with_field("v", Value::FloatVec(vec![1.0, 2.0]));
        let mut bytes = serialize(&entity);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            deserialize("t", &bytes),
            Err(PolystoreError::Deserialization(_))
        ));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let entity = Entity::new("t").with_field("i", Value::Int(7));
        let mut bytes = serialize(&entity);
        bytes.push(0xFF);
        assert!(matches!(
            deserialize("t", &bytes),
            Err(PolystoreError::Deserialization(_))
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'x');
        bytes.push(99); // bogus tag
        assert!(matches!(
            deserialize("t", &bytes),
            Err(PolystoreError::Deserialization(_))
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes()); // absurd name length
        assert!(matches!(
            deserialize("t", &bytes),
            Err(PolystoreError::Deserialization(_))
        ));
    }
}
