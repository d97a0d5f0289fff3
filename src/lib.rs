//! Declarative schemas for decoding and encoding versioned binary save files.
//!
//! # Overview
//!
//! A schema is an ordered sequence of typed field declarations. From that
//! single declaration the engine mechanically derives both a decoder (bytes
//! to a structured value tree) and an encoder (value tree back to bytes),
//! including conditional fields whose presence depends on previously decoded
//! values, variable-length arrays and byte strings sized by sibling fields,
//! nested sub-structures, and enumerations backed by fixed-width integers.
//!
//! Successful decodes round-trip byte-exactly: encoding the resulting
//! [`Record`] reproduces the input, and field order in the container always
//! equals declaration order, independent of how schemas are composed or
//! inherited.
//!
//! # Wire format
//!
//! - All multi-byte numbers are little-endian.
//! - Strings are one unsigned length byte followed by that many UTF-8 bytes.
//! - Booleans are one byte, 0 or 1.
//! - Fixed headers are compared byte-for-byte.
//! - An array or byte string sized by a sibling field carries no redundant
//!   count of its own; the sibling, written earlier in the same schema, is
//!   the single source of truth.
//!
//! # Example
//!
//! A structure whose layout grew across format revisions, with a run of
//! fields gated on the version and an array sized by a sibling count:
//!
//! ```
//! use savefield::{Field, Kind, Length, Predicate, Scalar, Schema};
//!
//! let schema = Schema::builder()
//!     .field(Field::i32("version"))
//!     .field(Field::i32("id"))
//!     .field(Field::block_start("sinceV1", Predicate::min_version("version", 1)))
//!     .field(Field::i32("previous"))
//!     .field(Field::i32("next"))
//!     .field(Field::block_end("sinceV1End"))
//!     .field(Field::i32("gridSize"))
//!     .field(Field::array(
//!         "grids",
//!         Kind::Scalar(Scalar::I32),
//!         Length::sibling("gridSize"),
//!     ))
//!     .build()?;
//!
//! let bytes: Vec<u8> = [1i32, 7, -1, 3, 2, 10, 20]
//!     .iter()
//!     .flat_map(|v| v.to_le_bytes())
//!     .collect();
//!
//! let record = schema.decode(&bytes[..])?;
//! assert_eq!(record.get("next").and_then(|v| v.as_i32()), Some(3));
//! assert_eq!(schema.encode(&record)?, &bytes[..]);
//!
//! // A version 0 file simply omits the gated run.
//! let old: Vec<u8> = [0i32, 7, 0].iter().flat_map(|v| v.to_le_bytes()).collect();
//! let record = schema.decode(&old[..])?;
//! assert!(record.get("previous").unwrap().is_absent());
//! # Ok::<(), savefield::Error>(())
//! ```
//!
//! # Example (nested schemas)
//!
//! Larger formats compose by nesting complete schemas; containers built by
//! hand encode the same way decoded ones do:
//!
//! ```
//! use bytes::Bytes;
//! use savefield::{Field, Kind, Length, Record, Schema, Value};
//! use std::sync::Arc;
//!
//! let grid = Arc::new(
//!     Schema::builder()
//!         .field(Field::i32("itemId"))
//!         .field(Field::i32("count"))
//!         .build()?,
//! );
//! let component = Schema::builder()
//!     .field(Field::header("magic", b"GRID"))
//!     .field(Field::i32("gridSize"))
//!     .field(Field::array(
//!         "grids",
//!         Kind::Nested(grid),
//!         Length::sibling("gridSize"),
//!     ))
//!     .build()?;
//!
//! let record = Record::from_entries([
//!     ("magic", Value::Bytes(Bytes::from_static(b"GRID"))),
//!     ("gridSize", Value::I32(1)),
//!     ("grids", Value::Array(vec![Value::Record(Record::from_entries([
//!         ("itemId", Value::I32(1001)),
//!         ("count", Value::I32(5)),
//!     ])?)])),
//! ])?;
//!
//! let bytes = component.encode(&record)?;
//! assert_eq!(component.decode(&bytes[..])?, record);
//! # Ok::<(), savefield::Error>(())
//! ```

pub mod error;
pub mod field;
pub mod schema;
pub mod value;
mod util;

// Re-export main types.
pub use error::Error;
pub use field::{Field, Kind, Length, Predicate, Scalar, Transform};
pub use schema::{Builder, Schema};
pub use value::{Record, Value};
