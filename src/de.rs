//! Serde deserializers that read entities straight from row cells.
//!
//! Cells keep their SQLite storage class until the target type asks for
//! something, so an `INTEGER` 0/1 can fill a `bool` and a `BLOB` can fill a
//! `Vec<u8>`.

use indexmap::IndexMap;
use serde::de::value::{Error, SeqDeserializer};
use serde::de::{DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, Visitor};
use serde::forward_to_deserialize_any;

use crate::value::Value;

/// A row presented to serde as a map of field name to cell.
pub(crate) struct RowDeserializer<'a> {
    cells: indexmap::map::IntoIter<&'a str, Value>,
    pending: Option<Value>,
}

impl<'a> RowDeserializer<'a> {
    pub(crate) fn new(cells: IndexMap<&'a str, Value>) -> Self {
        Self {
            cells: cells.into_iter(),
            pending: None,
        }
    }
}

impl<'de> Deserializer<'de> for RowDeserializer<'_> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_map(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

impl<'de> MapAccess<'de> for RowDeserializer<'_> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        match self.cells.next() {
            Some((field, value)) => {
                self.pending = Some(value);
                seed.deserialize(field.into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let value = self.pending.take().unwrap_or(Value::Null);
        seed.deserialize(ValueDeserializer(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.cells.len())
    }
}

/// One cell presented to serde.
pub(crate) struct ValueDeserializer(pub(crate) Value);

impl<'de> Deserializer<'de> for ValueDeserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::Null => visitor.visit_unit(),
            Value::Integer(v) => visitor.visit_i64(v),
            Value::Real(v) => visitor.visit_f64(v),
            Value::Text(v) => visitor.visit_string(v),
            Value::Blob(v) => visitor.visit_byte_buf(v),
        }
    }

    // SQLite has no boolean storage class.
    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::Integer(v) => visitor.visit_bool(v != 0),
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(ValueDeserializer(other)),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.0 {
            Value::Blob(bytes) => {
                let mut seq = SeqDeserializer::<_, Error>::new(bytes.into_iter());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.0 {
            Value::Text(v) => v.into_deserializer().deserialize_enum(name, variants, visitor),
            other => ValueDeserializer(other).deserialize_any(visitor),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct tuple tuple_struct map struct
        identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[allow(dead_code)]
    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(rename_all = "lowercase")]
    enum Status {
        Open,
        Closed,
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        active: bool,
        score: f64,
        status: Status,
        payload: Vec<u8>,
        note: Option<String>,
    }

    #[test]
    fn cells_fill_typed_fields() {
        let row = IndexMap::from([
            ("active", Value::Integer(1)),
            ("score", Value::Integer(4)),
            ("status", Value::from("closed")),
            ("payload", Value::Blob(vec![1, 2])),
            ("note", Value::Null),
        ]);
        let sample = Sample::deserialize(RowDeserializer::new(row)).unwrap();
        assert!(sample.active);
        assert_eq!(sample.score, 4.0);
        assert_eq!(sample.status, Status::Closed);
        assert_eq!(sample.payload, [1, 2]);
        assert_eq!(sample.note, None);
    }

    #[test]
    fn text_does_not_become_bool() {
        assert!(bool::deserialize(ValueDeserializer(Value::from("yes"))).is_err());
        assert!(!bool::deserialize(ValueDeserializer(Value::Integer(0))).unwrap());
    }
}
