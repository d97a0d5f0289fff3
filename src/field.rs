//! The field descriptor catalog.
//!
//! A [`Field`] is one named position in a schema's binary layout: a fixed
//! header, a little-endian scalar, an enumeration, a length-prefixed string,
//! a length-governed byte string or array, a nested schema, or a conditional.
//! Every descriptor knows how to decode itself from a [`Buf`] cursor and
//! encode a [`Value`] back to a [`BufMut`] sink, given the enclosing
//! schema's already-resolved values.
//!
//! Declaration order is fixed at construction time by a global monotonic
//! counter, so schema composition is deterministic no matter how the fields
//! are collected (see [`crate::schema`]).

use crate::{util::at_least, Error, Record, Value};
use bytes::{Buf, BufMut, Bytes};
use paste::paste;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::schema::Schema;

/// Assigns each descriptor its declaration-order index, exactly once.
static FIELD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Width and signedness of a fixed-size numeric field.
///
/// All scalars are encoded little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scalar {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Scalar {
    /// Encoded width in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Returns true for integer kinds, which are the only legal inline
    /// length scalars.
    pub(crate) const fn is_integer(&self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }

    pub(crate) fn decode(&self, buf: &mut impl Buf) -> Result<Value, Error> {
        at_least(buf, self.size())?;
        Ok(match self {
            Self::U8 => Value::U8(buf.get_u8()),
            Self::U16 => Value::U16(buf.get_u16_le()),
            Self::U32 => Value::U32(buf.get_u32_le()),
            Self::U64 => Value::U64(buf.get_u64_le()),
            Self::I8 => Value::I8(buf.get_i8()),
            Self::I16 => Value::I16(buf.get_i16_le()),
            Self::I32 => Value::I32(buf.get_i32_le()),
            Self::I64 => Value::I64(buf.get_i64_le()),
            Self::F32 => Value::F32(buf.get_f32_le()),
            Self::F64 => Value::F64(buf.get_f64_le()),
        })
    }

    pub(crate) fn encode(
        &self,
        name: &'static str,
        value: &Value,
        buf: &mut impl BufMut,
    ) -> Result<(), Error> {
        match (self, value) {
            (Self::U8, Value::U8(v)) => buf.put_u8(*v),
            (Self::U16, Value::U16(v)) => buf.put_u16_le(*v),
            (Self::U32, Value::U32(v)) => buf.put_u32_le(*v),
            (Self::U64, Value::U64(v)) => buf.put_u64_le(*v),
            (Self::I8, Value::I8(v)) => buf.put_i8(*v),
            (Self::I16, Value::I16(v)) => buf.put_i16_le(*v),
            (Self::I32, Value::I32(v)) => buf.put_i32_le(*v),
            (Self::I64, Value::I64(v)) => buf.put_i64_le(*v),
            (Self::F32, Value::F32(v)) => buf.put_f32_le(*v),
            (Self::F64, Value::F64(v)) => buf.put_f64_le(*v),
            _ => {
                return Err(Error::UnexpectedType {
                    field: name,
                    expected: self.type_name(),
                })
            }
        }
        Ok(())
    }

    /// Reads an inline length value, widened to `i64`.
    pub(crate) fn decode_int(
        &self,
        name: &'static str,
        buf: &mut impl Buf,
    ) -> Result<i64, Error> {
        self.decode(buf)?.as_int().ok_or(Error::UnexpectedType {
            field: name,
            expected: "integer",
        })
    }

    /// Writes an inline length value, failing if it does not fit the width.
    pub(crate) fn encode_int(&self, len: usize, buf: &mut impl BufMut) -> Result<(), Error> {
        macro_rules! put {
            ($type:ty, $put:ident) => {{
                let v = <$type>::try_from(len)
                    .map_err(|_| Error::LengthExceeded(len, <$type>::MAX as usize))?;
                buf.$put(v);
            }};
        }
        match self {
            Self::U8 => put!(u8, put_u8),
            Self::U16 => put!(u16, put_u16_le),
            Self::U32 => put!(u32, put_u32_le),
            Self::U64 => put!(u64, put_u64_le),
            Self::I8 => put!(i8, put_i8),
            Self::I16 => put!(i16, put_i16_le),
            Self::I32 => put!(i32, put_i32_le),
            Self::I64 => put!(i64, put_i64_le),
            Self::F32 | Self::F64 => {
                return Err(Error::MalformedSchema(
                    "inline length scalar must be an integer".into(),
                ))
            }
        }
        Ok(())
    }
}

/// A pure affine length transform: `n * scale + offset`.
///
/// Covers the shapes concrete formats use: pools sized `cursor - 1`,
/// connection tables sized `(cursor - 1) * 16`, byte runs sized `count * k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transform {
    scale: i64,
    offset: i64,
}

impl Transform {
    /// `n * k`
    pub const fn scale(k: i64) -> Self {
        Self { scale: k, offset: 0 }
    }

    /// `n + d`
    pub const fn offset(d: i64) -> Self {
        Self { scale: 1, offset: d }
    }

    /// `n - 1`
    pub const fn decrement() -> Self {
        Self {
            scale: 1,
            offset: -1,
        }
    }

    /// `(n - 1) * k`
    pub const fn decrement_scaled(k: i64) -> Self {
        Self {
            scale: k,
            offset: -k,
        }
    }

    pub fn apply(&self, n: i64) -> i64 {
        n.saturating_mul(self.scale).saturating_add(self.offset)
    }
}

/// How a byte string or array determines its length.
#[derive(Clone, Debug)]
pub enum Length {
    /// An integer length field read inline, immediately before the payload.
    /// On encode the length is re-derived from the value and re-emitted.
    Inline(Scalar),
    /// The already-decoded value of an earlier sibling field, optionally
    /// passed through a [`Transform`]. The count is carried by the sibling
    /// and never re-emitted; on encode the value's actual length must match
    /// it exactly.
    Sibling {
        name: &'static str,
        transform: Option<Transform>,
    },
}

impl Length {
    pub fn sibling(name: &'static str) -> Self {
        Self::Sibling {
            name,
            transform: None,
        }
    }

    pub fn sibling_with(name: &'static str, transform: Transform) -> Self {
        Self::Sibling {
            name,
            transform: Some(transform),
        }
    }
}

/// A condition over named sibling field values.
///
/// The named fields must be declared (and therefore decoded) earlier in the
/// same schema; the closure receives their values in the order named.
#[derive(Clone)]
pub struct Predicate {
    args: Vec<&'static str>,
    test: Arc<dyn Fn(&[Value]) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new<F>(args: &[&'static str], test: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        Self {
            args: args.to_vec(),
            test: Arc::new(test),
        }
    }

    /// True when the named integer field is at least `version`. The common
    /// gate for fields added in later format revisions.
    pub fn min_version(field: &'static str, version: i64) -> Self {
        Self::new(&[field], move |values| {
            values[0].as_int().is_some_and(|v| v >= version)
        })
    }

    /// True when the named integer field equals `expected`.
    pub fn equals(field: &'static str, expected: i64) -> Self {
        Self::new(&[field], move |values| {
            values[0].as_int().is_some_and(|v| v == expected)
        })
    }

    /// Field names this predicate reads.
    pub fn args(&self) -> &[&'static str] {
        &self.args
    }

    pub(crate) fn eval(&self, record: &Record) -> Result<bool, Error> {
        let mut values = Vec::with_capacity(self.args.len());
        for name in &self.args {
            let value = record.get(name).ok_or(Error::MissingField(name))?;
            values.push(value.clone());
        }
        Ok((self.test)(&values))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.args).finish()
    }
}

/// The closed set of field kinds.
#[derive(Clone, Debug)]
pub enum Kind {
    /// A constant byte sequence; any difference fails the decode.
    Header(&'static [u8]),
    /// A fixed-size little-endian number.
    Scalar(Scalar),
    /// An integer reinterpreted through an informational symbol table.
    /// Unknown integers are not an error; the underlying value is stored.
    Enum {
        repr: Scalar,
        symbols: &'static [(i64, &'static str)],
    },
    /// One unsigned byte, 0 or 1.
    Bool,
    /// One unsigned length byte followed by that many UTF-8 bytes.
    String,
    /// A raw byte run governed by a [`Length`].
    Bytes(Length),
    /// Zero or more items of one uniform kind, governed by a [`Length`].
    Array { item: Box<Kind>, len: Length },
    /// Delegates to another complete schema, producing a sub-[`Record`].
    Nested(Arc<Schema>),
    /// Wraps one inner kind; decoded only when the predicate holds, stored
    /// as [`Value::Absent`] otherwise.
    Conditional { inner: Box<Kind>, pred: Predicate },
    /// Opens a run of plain fields gated by one shared predicate.
    BlockStart(Predicate),
    /// Closes the innermost conditional block.
    BlockEnd,
}

impl Kind {
    /// Looks up the symbolic name for an enumeration value, if the kind is
    /// an enumeration and the value is mapped.
    pub fn symbol(&self, value: i64) -> Option<&'static str> {
        match self {
            Self::Enum { symbols, .. } => symbols
                .iter()
                .find(|(v, _)| *v == value)
                .map(|(_, name)| *name),
            _ => None,
        }
    }

    pub(crate) fn decode(
        &self,
        name: &'static str,
        buf: &mut impl Buf,
        record: &Record,
    ) -> Result<Value, Error> {
        match self {
            Self::Header(expected) => {
                at_least(buf, expected.len())?;
                let mut found = vec![0u8; expected.len()];
                buf.copy_to_slice(&mut found);
                if found != *expected {
                    return Err(Error::HeaderMismatch(name));
                }
                Ok(Value::Bytes(Bytes::from_static(expected)))
            }
            Self::Scalar(scalar) => scalar.decode(buf),
            Self::Enum { repr, .. } => repr.decode(buf),
            Self::Bool => {
                at_least(buf, 1)?;
                match buf.get_u8() {
                    0 => Ok(Value::Bool(false)),
                    1 => Ok(Value::Bool(true)),
                    _ => Err(Error::InvalidBool(name)),
                }
            }
            Self::String => {
                at_least(buf, 1)?;
                let len = buf.get_u8() as usize;
                if buf.remaining() < len {
                    return Err(Error::TruncatedInput(name));
                }
                let raw = buf.copy_to_bytes(len);
                let text = std::str::from_utf8(&raw).map_err(|_| Error::InvalidUtf8(name))?;
                Ok(Value::String(text.to_owned()))
            }
            Self::Bytes(len) => {
                let len = resolve_length(name, len, buf, record)?;
                if buf.remaining() < len {
                    return Err(Error::TruncatedInput(name));
                }
                Ok(Value::Bytes(buf.copy_to_bytes(len)))
            }
            Self::Array { item, len } => {
                let len = resolve_length(name, len, buf, record)?;
                // The count is untrusted; never allocate more than the
                // stream could possibly hold.
                let mut items = Vec::with_capacity(len.min(buf.remaining()));
                for _ in 0..len {
                    match item.decode(name, buf, record) {
                        Ok(value) => items.push(value),
                        Err(Error::UnexpectedEndOfInput { .. }) => {
                            return Err(Error::TruncatedInput(name))
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok(Value::Array(items))
            }
            Self::Nested(schema) => Ok(Value::Record(schema.read(buf)?)),
            Self::Conditional { inner, pred } => {
                if pred.eval(record)? {
                    inner.decode(name, buf, record)
                } else {
                    Ok(Value::Absent)
                }
            }
            Self::BlockStart(_) | Self::BlockEnd => Err(Error::MalformedSchema(format!(
                "block marker {name} is not a decodable field"
            ))),
        }
    }

    pub(crate) fn encode(
        &self,
        name: &'static str,
        value: &Value,
        buf: &mut impl BufMut,
        record: &Record,
    ) -> Result<(), Error> {
        match self {
            Self::Header(expected) => {
                buf.put_slice(expected);
                Ok(())
            }
            Self::Scalar(scalar) => scalar.encode(name, value, buf),
            Self::Enum { repr, .. } => repr.encode(name, value, buf),
            Self::Bool => match value {
                Value::Bool(b) => {
                    buf.put_u8(u8::from(*b));
                    Ok(())
                }
                _ => Err(Error::UnexpectedType {
                    field: name,
                    expected: "bool",
                }),
            },
            Self::String => {
                let text = value.as_str().ok_or(Error::UnexpectedType {
                    field: name,
                    expected: "string",
                })?;
                if text.len() > u8::MAX as usize {
                    return Err(Error::LengthExceeded(text.len(), u8::MAX as usize));
                }
                buf.put_u8(text.len() as u8);
                buf.put_slice(text.as_bytes());
                Ok(())
            }
            Self::Bytes(len) => {
                let data = value.as_bytes().ok_or(Error::UnexpectedType {
                    field: name,
                    expected: "bytes",
                })?;
                emit_length(name, len, data.len(), buf, record)?;
                buf.put_slice(data);
                Ok(())
            }
            Self::Array { item, len } => {
                let items = value.as_array().ok_or(Error::UnexpectedType {
                    field: name,
                    expected: "array",
                })?;
                emit_length(name, len, items.len(), buf, record)?;
                for item_value in items {
                    item.encode(name, item_value, buf, record)?;
                }
                Ok(())
            }
            Self::Nested(schema) => {
                let nested = value.as_record().ok_or(Error::UnexpectedType {
                    field: name,
                    expected: "record",
                })?;
                schema.write(nested, buf)
            }
            Self::Conditional { inner, pred } => {
                if !pred.eval(record)? {
                    // Legitimately writes nothing.
                    return Ok(());
                }
                if value.is_absent() {
                    return Err(Error::MissingField(name));
                }
                inner.encode(name, value, buf, record)
            }
            Self::BlockStart(_) | Self::BlockEnd => Err(Error::MalformedSchema(format!(
                "block marker {name} is not an encodable field"
            ))),
        }
    }
}

/// Resolves the length of a byte string or array during decode.
fn resolve_length(
    name: &'static str,
    len: &Length,
    buf: &mut impl Buf,
    record: &Record,
) -> Result<usize, Error> {
    let raw = match len {
        Length::Inline(scalar) => scalar.decode_int(name, buf)?,
        Length::Sibling {
            name: sibling,
            transform,
        } => {
            let value = record.get(sibling).ok_or(Error::MissingField(sibling))?;
            let n = value.as_int().ok_or(Error::UnexpectedType {
                field: sibling,
                expected: "integer",
            })?;
            match transform {
                Some(t) => t.apply(n),
                None => n,
            }
        }
    };
    usize::try_from(raw).map_err(|_| Error::LengthUnderflow {
        field: name,
        length: raw,
    })
}

/// Emits (or verifies) the length of a byte string or array during encode.
///
/// An inline length is re-derived from the value. A sibling length was
/// already committed to the container and is the single source of truth:
/// the value's actual length must match it, and nothing is re-emitted.
fn emit_length(
    name: &'static str,
    len: &Length,
    actual: usize,
    buf: &mut impl BufMut,
    record: &Record,
) -> Result<(), Error> {
    match len {
        Length::Inline(scalar) => scalar.encode_int(actual, buf),
        Length::Sibling {
            name: sibling,
            transform,
        } => {
            let value = record.get(sibling).ok_or(Error::MissingField(sibling))?;
            let n = value.as_int().ok_or(Error::UnexpectedType {
                field: sibling,
                expected: "integer",
            })?;
            let raw = match transform {
                Some(t) => t.apply(n),
                None => n,
            };
            let expected = usize::try_from(raw).map_err(|_| Error::LengthUnderflow {
                field: name,
                length: raw,
            })?;
            if expected != actual {
                return Err(Error::LengthMismatch {
                    field: name,
                    expected,
                    actual,
                });
            }
            Ok(())
        }
    }
}

/// A named, ordered unit of schema.
#[derive(Clone, Debug)]
pub struct Field {
    name: &'static str,
    order: u64,
    hidden: bool,
    stores_value: bool,
    always_decoded: bool,
    kind: Kind,
}

// Scalar constructor helpers, one per width.
macro_rules! impl_field_scalar {
    ($type:ident, $variant:ident) => {
        paste! {
            impl Field {
                #[doc = "A little-endian `" $type "` field."]
                pub fn $type(name: &'static str) -> Self {
                    Self::new(name, Kind::Scalar(Scalar::$variant))
                }
            }
        }
    };
}

impl_field_scalar!(u8, U8);
impl_field_scalar!(u16, U16);
impl_field_scalar!(u32, U32);
impl_field_scalar!(u64, U64);
impl_field_scalar!(i8, I8);
impl_field_scalar!(i16, I16);
impl_field_scalar!(i32, I32);
impl_field_scalar!(i64, I64);
impl_field_scalar!(f32, F32);
impl_field_scalar!(f64, F64);

impl Field {
    /// Creates a descriptor and assigns its declaration-order index.
    ///
    /// The index comes from a process-wide monotonic counter and is never
    /// reassigned, so two descriptors can never share one.
    pub fn new(name: &'static str, kind: Kind) -> Self {
        let order = FIELD_COUNTER.fetch_add(1, Ordering::Relaxed);
        let marker = matches!(kind, Kind::BlockStart(_) | Kind::BlockEnd);
        Self {
            name,
            order,
            hidden: marker,
            stores_value: !marker,
            always_decoded: marker,
            kind,
        }
    }

    /// A constant header that must match exactly.
    pub fn header(name: &'static str, header: &'static [u8]) -> Self {
        Self::new(name, Kind::Header(header))
    }

    /// A 4-byte signed enumeration with an informational symbol table.
    pub fn enumeration(
        name: &'static str,
        symbols: &'static [(i64, &'static str)],
    ) -> Self {
        Self::new(
            name,
            Kind::Enum {
                repr: Scalar::I32,
                symbols,
            },
        )
    }

    /// A single-byte boolean.
    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, Kind::Bool)
    }

    /// A length-prefixed UTF-8 string.
    pub fn string(name: &'static str) -> Self {
        Self::new(name, Kind::String)
    }

    /// A raw byte run governed by `len`.
    pub fn bytes(name: &'static str, len: Length) -> Self {
        Self::new(name, Kind::Bytes(len))
    }

    /// An array of uniform `item` kinds governed by `len`.
    pub fn array(name: &'static str, item: Kind, len: Length) -> Self {
        Self::new(
            name,
            Kind::Array {
                item: Box::new(item),
                len,
            },
        )
    }

    /// A field decoded by another complete schema.
    pub fn nested(name: &'static str, schema: Arc<Schema>) -> Self {
        Self::new(name, Kind::Nested(schema))
    }

    /// A single field present only when `pred` holds.
    pub fn conditional(name: &'static str, inner: Kind, pred: Predicate) -> Self {
        Self::new(
            name,
            Kind::Conditional {
                inner: Box::new(inner),
                pred,
            },
        )
    }

    /// Opens a conditional block gated by `pred`.
    pub fn block_start(name: &'static str, pred: Predicate) -> Self {
        Self::new(name, Kind::BlockStart(pred))
    }

    /// Closes the innermost conditional block.
    pub fn block_end(name: &'static str) -> Self {
        Self::new(name, Kind::BlockEnd)
    }

    /// Excludes this field from the container's external view. The value is
    /// still decoded and reachable by name for cross-field references.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Decodes this field even while an enclosing conditional block is
    /// skipping.
    pub fn always_decoded(mut self) -> Self {
        self.always_decoded = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declaration-order index, unique across all descriptors.
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_stored(&self) -> bool {
        self.stores_value
    }

    pub fn is_always_decoded(&self) -> bool {
        self.always_decoded
    }
}
