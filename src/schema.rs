//! Schema aggregation, ordering, and the decode/encode engines.
//!
//! A [`Schema`] is an ordered, immutable list of [`Field`] descriptors.
//! [`Builder::build`] fixes the order with a stable sort over each
//! descriptor's declaration-order index and statically validates the layout,
//! so every schema that exists is well-formed: block markers are balanced
//! and every sibling reference points at an earlier, value-storing field.

use crate::{
    field::{Field, Kind, Length, Predicate},
    Error, Record, Value,
};
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashSet;

/// An ordered, immutable list of field descriptors describing one
/// structure's binary layout.
///
/// Schemas are read-only after construction and `Send + Sync`; wrap one in
/// an `Arc` to nest it in other schemas via [`Field::nested`]. Independent
/// decodes of the same schema over independent buffers need no coordination.
#[derive(Clone, Debug)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Starts an empty schema declaration.
    pub fn builder() -> Builder {
        Builder { fields: Vec::new() }
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Decodes one instance from the cursor, leaving it positioned
    /// immediately after the schema's bytes.
    ///
    /// The walk is strictly sequential and forward-only. A stack of active
    /// flags tracks nested conditional blocks: a block whose predicate is
    /// false skips every interior field (no bytes consumed, container marked
    /// [`Value::Absent`]) except those declared `always_decoded`. A block
    /// opened under an already-false block is inactive without evaluating
    /// its predicate, since the values it reads were never decoded.
    pub fn read(&self, buf: &mut impl Buf) -> Result<Record, Error> {
        let mut record = Record::default();
        let mut blocks: Vec<bool> = Vec::new();
        for field in &self.fields {
            match field.kind() {
                Kind::BlockStart(pred) => {
                    let parent = blocks.last().copied().unwrap_or(true);
                    let active = parent && pred.eval(&record)?;
                    blocks.push(active);
                }
                Kind::BlockEnd => {
                    if blocks.pop().is_none() {
                        return Err(Error::MalformedSchema(format!(
                            "unmatched block end {}",
                            field.name()
                        )));
                    }
                }
                kind => {
                    let active = blocks.last().copied().unwrap_or(true);
                    if !active && !field.is_always_decoded() {
                        if field.is_stored() {
                            record.insert(field.name(), Value::Absent, field.is_hidden())?;
                        }
                        continue;
                    }
                    let value = kind.decode(field.name(), buf, &record)?;
                    if field.is_stored() {
                        record.insert(field.name(), value, field.is_hidden())?;
                    }
                }
            }
        }
        if !blocks.is_empty() {
            return Err(Error::MalformedSchema(
                "unclosed conditional block".to_string(),
            ));
        }
        Ok(record)
    }

    /// Decodes one instance, requiring the buffer to be fully consumed.
    pub fn decode(&self, mut buf: impl Buf) -> Result<Record, Error> {
        let record = self.read(&mut buf)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(record)
    }

    /// Encodes a container to the sink, byte-symmetric to [`Schema::read`].
    ///
    /// The traversal and block stack mirror decode exactly, but predicates
    /// are re-evaluated against the fully populated container.
    pub fn write(&self, record: &Record, buf: &mut impl BufMut) -> Result<(), Error> {
        let mut blocks: Vec<bool> = Vec::new();
        for field in &self.fields {
            match field.kind() {
                Kind::BlockStart(pred) => {
                    let parent = blocks.last().copied().unwrap_or(true);
                    let active = parent && pred.eval(record)?;
                    blocks.push(active);
                }
                Kind::BlockEnd => {
                    if blocks.pop().is_none() {
                        return Err(Error::MalformedSchema(format!(
                            "unmatched block end {}",
                            field.name()
                        )));
                    }
                }
                kind => {
                    let active = blocks.last().copied().unwrap_or(true);
                    if !active && !field.is_always_decoded() {
                        continue;
                    }
                    let value = record
                        .get(field.name())
                        .ok_or(Error::MissingField(field.name()))?;
                    kind.encode(field.name(), value, buf, record)?;
                }
            }
        }
        if !blocks.is_empty() {
            return Err(Error::MalformedSchema(
                "unclosed conditional block".to_string(),
            ));
        }
        Ok(())
    }

    /// Encodes a container to a fresh buffer.
    pub fn encode(&self, record: &Record) -> Result<BytesMut, Error> {
        let mut buf = BytesMut::new();
        self.write(record, &mut buf)?;
        Ok(buf)
    }
}

/// Collects field descriptors for one schema.
#[derive(Debug, Default)]
pub struct Builder {
    fields: Vec<Field>,
}

impl Builder {
    /// Seeds a builder with a base schema's fields.
    ///
    /// Inherited descriptors keep their original declaration-order indices,
    /// so fields added afterwards (constructed later, hence with larger
    /// indices) sort after every inherited field.
    pub fn inherit(base: &Schema) -> Self {
        Self {
            fields: base.fields.clone(),
        }
    }

    /// Adds one field declaration.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Fixes the field order and validates the layout.
    ///
    /// Ordering is a stable sort by declaration-order index; indices are
    /// globally unique, so the order is total regardless of how the fields
    /// were collected. Fails with [`Error::MalformedSchema`] on duplicate
    /// names, unbalanced block markers, forward or unknown sibling
    /// references, non-integer inline length scalars, or block markers used
    /// inside arrays and conditionals.
    pub fn build(mut self) -> Result<Schema, Error> {
        self.fields.sort_by_key(Field::order);

        let mut declared: HashSet<&'static str> = HashSet::new();
        let mut depth = 0usize;
        for field in &self.fields {
            match field.kind() {
                Kind::BlockStart(pred) => {
                    check_predicate(field.name(), pred, &declared)?;
                    depth += 1;
                }
                Kind::BlockEnd => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        Error::MalformedSchema(format!(
                            "block end {} has no matching start",
                            field.name()
                        ))
                    })?;
                }
                kind => {
                    check_kind(field.name(), kind, &declared)?;
                    if field.is_stored() {
                        if !declared.insert(field.name()) {
                            return Err(Error::MalformedSchema(format!(
                                "duplicate field name {}",
                                field.name()
                            )));
                        }
                    }
                }
            }
        }
        if depth > 0 {
            return Err(Error::MalformedSchema(
                "unclosed conditional block".to_string(),
            ));
        }

        Ok(Schema {
            fields: self.fields,
        })
    }
}

fn check_predicate(
    field: &'static str,
    pred: &Predicate,
    declared: &HashSet<&'static str>,
) -> Result<(), Error> {
    for arg in pred.args() {
        if !declared.contains(arg) {
            return Err(Error::MalformedSchema(format!(
                "{field} references {arg}, which is not declared earlier"
            )));
        }
    }
    Ok(())
}

fn check_length(
    field: &'static str,
    len: &Length,
    declared: &HashSet<&'static str>,
) -> Result<(), Error> {
    match len {
        Length::Inline(scalar) if !scalar.is_integer() => Err(Error::MalformedSchema(format!(
            "{field} has a non-integer inline length scalar"
        ))),
        Length::Inline(_) => Ok(()),
        Length::Sibling { name, .. } => {
            if !declared.contains(name) {
                return Err(Error::MalformedSchema(format!(
                    "{field} references {name}, which is not declared earlier"
                )));
            }
            Ok(())
        }
    }
}

fn check_kind(
    field: &'static str,
    kind: &Kind,
    declared: &HashSet<&'static str>,
) -> Result<(), Error> {
    match kind {
        Kind::Bytes(len) => check_length(field, len, declared),
        Kind::Array { item, len } => {
            check_length(field, len, declared)?;
            if matches!(**item, Kind::BlockStart(_) | Kind::BlockEnd) {
                return Err(Error::MalformedSchema(format!(
                    "{field} uses a block marker as an array item"
                )));
            }
            check_kind(field, item, declared)
        }
        Kind::Conditional { inner, pred } => {
            check_predicate(field, pred, declared)?;
            if matches!(**inner, Kind::BlockStart(_) | Kind::BlockEnd) {
                return Err(Error::MalformedSchema(format!(
                    "{field} wraps a block marker in a conditional"
                )));
            }
            check_kind(field, inner, declared)
        }
        _ => Ok(()),
    }
}
