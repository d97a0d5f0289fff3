//! Decoded value trees and the ordered, insert-once value container.

use crate::Error;
use bytes::Bytes;
use paste::paste;
use std::collections::HashMap;

/// A single decoded value.
///
/// Scalars carry exactly the width they were declared with; enumerations
/// decode to their underlying integer variant. [`Value::Absent`] marks a
/// conditional field whose predicate was false, which is distinct from the
/// field not being present in the container at all.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    Record(Record),
    Absent,
}

// Typed accessors and `From` conversions for every scalar variant.
macro_rules! impl_value_scalar {
    ($variant:ident, $type:ident) => {
        paste! {
            impl Value {
                #[doc = "Returns the value if it is a `" $variant "`."]
                pub fn [<as_ $type>](&self) -> Option<$type> {
                    match self {
                        Self::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }

            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Self::$variant(v)
                }
            }
        }
    };
}

impl_value_scalar!(U8, u8);
impl_value_scalar!(U16, u16);
impl_value_scalar!(U32, u32);
impl_value_scalar!(U64, u64);
impl_value_scalar!(I8, i8);
impl_value_scalar!(I16, i16);
impl_value_scalar!(I32, i32);
impl_value_scalar!(I64, i64);
impl_value_scalar!(F32, f32);
impl_value_scalar!(F64, f64);
impl_value_scalar!(Bool, bool);

impl Value {
    /// Returns any integer variant widened to an `i64`.
    ///
    /// This is the conversion used for sibling length references and
    /// predicate arguments. A `u64` too large for an `i64` returns `None`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::U8(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::U64(v) => i64::try_from(*v).ok(),
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value if it is a byte string.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value if it is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the value if it is a nested record.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns true for the absence marker of a skipped conditional field.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Self::Record(r)
    }
}

#[derive(Clone, Debug)]
struct Entry {
    name: &'static str,
    value: Value,
    hidden: bool,
}

/// The ordered, read-only result of decoding one schema instance.
///
/// Entries are inserted exactly once, in schema order, and the container is
/// immutable once built. Lookup by [`Record::get`] reaches every stored
/// field, including hidden ones (cross-field length and condition references
/// need them); iteration, length, and equality expose only the non-hidden
/// entries.
#[derive(Clone, Debug, Default)]
pub struct Record {
    entries: Vec<Entry>,
    index: HashMap<&'static str, usize>,
}

impl Record {
    /// Builds a container from `(name, value)` pairs, preserving order.
    ///
    /// This is the construction path for encoding values that did not come
    /// from a decode. Fails with [`Error::DuplicateField`] if a name repeats.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Result<Self, Error> {
        let mut record = Self::default();
        for (name, value) in entries {
            record.insert(name, value, false)?;
        }
        Ok(record)
    }

    /// Returns the value stored under `name`, hidden fields included.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index
            .get(name)
            .and_then(|&i| self.entries.get(i))
            .map(|entry| &entry.value)
    }

    /// Returns true if a value is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates the non-hidden entries in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries
            .iter()
            .filter(|entry| !entry.hidden)
            .map(|entry| (entry.name, &entry.value))
    }

    /// Number of non-hidden entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.hidden).count()
    }

    /// Returns true if there are no non-hidden entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a value under `name`, failing if the name is already present.
    ///
    /// Only the decode engine inserts; the container is read-only to callers.
    pub(crate) fn insert(
        &mut self,
        name: &'static str,
        value: Value,
        hidden: bool,
    ) -> Result<(), Error> {
        if self.index.contains_key(name) {
            return Err(Error::DuplicateField(name));
        }
        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            name,
            value,
            hidden,
        });
        Ok(())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}
