//! End-to-end decode/encode tests over declared schemas.

use bytes::{Buf, Bytes};
use savefield::{Error, Field, Kind, Length, Predicate, Record, Scalar, Schema, Transform, Value};
use std::sync::Arc;

fn i32s(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Header, count, then count items.
fn counted_schema() -> Schema {
    Schema::builder()
        .field(Field::header("magic", b"OK"))
        .field(Field::i32("count"))
        .field(Field::array(
            "items",
            Kind::Scalar(Scalar::I32),
            Length::sibling("count"),
        ))
        .build()
        .unwrap()
}

#[test]
fn test_counted_array_concrete_bytes() {
    let schema = counted_schema();
    let mut bytes = b"OK".to_vec();
    bytes.extend(i32s(&[2, 1, 2]));

    let record = schema.decode(&bytes[..]).unwrap();
    assert_eq!(record.get("count"), Some(&Value::I32(2)));
    assert_eq!(
        record.get("items"),
        Some(&Value::Array(vec![Value::I32(1), Value::I32(2)]))
    );

    // Re-encoding yields exactly the input bytes.
    assert_eq!(schema.encode(&record).unwrap(), &bytes[..]);
}

#[test]
fn test_header_mismatch_aborts() {
    let schema = counted_schema();
    let mut bytes = b"NO".to_vec();
    bytes.extend(i32s(&[0]));
    assert_eq!(
        schema.decode(&bytes[..]).unwrap_err(),
        Error::HeaderMismatch("magic")
    );
}

#[test]
fn test_length_reference_integrity() {
    let schema = counted_schema();

    // count=3 decodes exactly 3 items, no more.
    let mut bytes = b"OK".to_vec();
    bytes.extend(i32s(&[3, 10, 20, 30]));
    let record = schema.decode(&bytes[..]).unwrap();
    assert_eq!(record.get("items").unwrap().as_array().unwrap().len(), 3);

    // Encoding 5 items against count=3 fails; the sibling count is the
    // single source of truth and is never re-derived from the data.
    let record = Record::from_entries([
        ("magic", Value::Bytes(Bytes::from_static(b"OK"))),
        ("count", Value::I32(3)),
        (
            "items",
            Value::Array((0..5).map(Value::I32).collect()),
        ),
    ])
    .unwrap();
    assert_eq!(
        schema.encode(&record).unwrap_err(),
        Error::LengthMismatch {
            field: "items",
            expected: 3,
            actual: 5
        }
    );
}

#[test]
fn test_truncated_array() {
    let schema = counted_schema();
    let mut bytes = b"OK".to_vec();
    bytes.extend(i32s(&[3, 10]));
    assert_eq!(
        schema.decode(&bytes[..]).unwrap_err(),
        Error::TruncatedInput("items")
    );
}

#[test]
fn test_corrupt_huge_count() {
    // A corrupt count far beyond what the stream holds must fail like any
    // other truncation, not abort on allocation.
    let schema = Schema::builder()
        .field(Field::i64("count"))
        .field(Field::array(
            "items",
            Kind::Scalar(Scalar::I32),
            Length::sibling("count"),
        ))
        .build()
        .unwrap();
    let bytes = i64::MAX.to_le_bytes();
    assert_eq!(
        schema.decode(&bytes[..]).unwrap_err(),
        Error::TruncatedInput("items")
    );
}

#[test]
fn test_string_max_length_roundtrip() {
    let schema = Schema::builder().field(Field::string("name")).build().unwrap();
    let text = "x".repeat(255);
    let mut bytes = vec![255u8];
    bytes.extend(text.as_bytes());
    let record = schemaless_roundtrip(&schema, &bytes);
    assert_eq!(record.get("name"), Some(&Value::String(text)));
}

#[test]
fn test_scalar_truncation_consumes_nothing() {
    let schema = Schema::builder().field(Field::i32("value")).build().unwrap();
    let mut buf: &[u8] = &[0x01, 0x02];
    assert_eq!(
        schema.read(&mut buf).unwrap_err(),
        Error::UnexpectedEndOfInput {
            needed: 4,
            remaining: 2
        }
    );
    assert_eq!(buf.remaining(), 2);
}

#[test]
fn test_extra_data_rejected() {
    let schema = Schema::builder().field(Field::i32("value")).build().unwrap();
    let bytes = i32s(&[1, 2]);
    assert_eq!(schema.decode(&bytes[..]).unwrap_err(), Error::ExtraData(4));
}

fn gated_schema() -> Schema {
    Schema::builder()
        .field(Field::i32("version"))
        .field(Field::block_start(
            "sinceV1",
            Predicate::min_version("version", 1),
        ))
        .field(Field::i32("a"))
        .field(Field::i32("b"))
        .field(Field::block_end("sinceV1End"))
        .build()
        .unwrap()
}

#[test]
fn test_conditional_block_skipped() {
    let schema = gated_schema();

    // version=0: the interior fields consume no bytes, and the cursor lands
    // directly on whatever follows the schema.
    let mut bytes = i32s(&[0]);
    bytes.extend(b"NEXT");
    let mut buf = &bytes[..];
    let record = schema.read(&mut buf).unwrap();
    assert_eq!(buf, b"NEXT");
    assert!(record.get("a").unwrap().is_absent());
    assert!(record.get("b").unwrap().is_absent());

    // Encoding the skipped container writes only the version.
    assert_eq!(schema.encode(&record).unwrap(), &i32s(&[0])[..]);
}

#[test]
fn test_conditional_block_taken() {
    let schema = gated_schema();
    let bytes = i32s(&[1, 5, 6]);
    let record = schema.decode(&bytes[..]).unwrap();
    assert_eq!(record.get("a"), Some(&Value::I32(5)));
    assert_eq!(record.get("b"), Some(&Value::I32(6)));
    assert_eq!(schema.encode(&record).unwrap(), &bytes[..]);
}

#[test]
fn test_always_decoded_inside_false_block() {
    let schema = Schema::builder()
        .field(Field::i32("version"))
        .field(Field::block_start(
            "sinceV1",
            Predicate::min_version("version", 1),
        ))
        .field(Field::i32("skipped"))
        .field(Field::i32("kept").always_decoded())
        .field(Field::block_end("sinceV1End"))
        .field(Field::i32("tail"))
        .build()
        .unwrap();

    let bytes = i32s(&[0, 42, 9]);
    let record = schema.decode(&bytes[..]).unwrap();
    assert!(record.get("skipped").unwrap().is_absent());
    assert_eq!(record.get("kept"), Some(&Value::I32(42)));
    assert_eq!(record.get("tail"), Some(&Value::I32(9)));
    assert_eq!(schema.encode(&record).unwrap(), &bytes[..]);
}

#[test]
fn test_single_conditional_roundtrip() {
    let schema = Schema::builder()
        .field(Field::i32("version"))
        .field(Field::conditional(
            "bans",
            Kind::Scalar(Scalar::I32),
            Predicate::min_version("version", 1),
        ))
        .build()
        .unwrap();

    let with = i32s(&[1, -4]);
    let record = schema.decode(&with[..]).unwrap();
    assert_eq!(record.get("bans"), Some(&Value::I32(-4)));
    assert_eq!(schema.encode(&record).unwrap(), &with[..]);

    let without = i32s(&[0]);
    let record = schema.decode(&without[..]).unwrap();
    assert!(record.get("bans").unwrap().is_absent());
    assert_eq!(schema.encode(&record).unwrap(), &without[..]);
}

#[test]
fn test_missing_field_on_encode() {
    let schema = counted_schema();
    let record = Record::from_entries([
        ("magic", Value::Bytes(Bytes::from_static(b"OK"))),
        ("count", Value::I32(0)),
    ])
    .unwrap();
    assert_eq!(
        schema.encode(&record).unwrap_err(),
        Error::MissingField("items")
    );
}

#[test]
fn test_inline_length_roundtrip() {
    let schema = Schema::builder()
        .field(Field::bytes("payload", Length::Inline(Scalar::I32)))
        .field(Field::string("name"))
        .build()
        .unwrap();

    let mut bytes = i32s(&[3]);
    bytes.extend(b"\xDE\xAD\xBE");
    bytes.extend(b"\x04base");

    let record = schema.decode(&bytes[..]).unwrap();
    assert_eq!(
        record.get("payload"),
        Some(&Value::Bytes(Bytes::from_static(b"\xDE\xAD\xBE")))
    );
    assert_eq!(record.get("name"), Some(&Value::from("base")));
    assert_eq!(schema.encode(&record).unwrap(), &bytes[..]);
}

#[test]
fn test_length_underflow() {
    // A pool sized `cursor - 1` underflows when cursor is 0.
    let schema = Schema::builder()
        .field(Field::i32("cursor"))
        .field(Field::array(
            "pool",
            Kind::Scalar(Scalar::I32),
            Length::sibling_with("cursor", Transform::decrement()),
        ))
        .build()
        .unwrap();
    let bytes = i32s(&[0]);
    assert_eq!(
        schema.decode(&bytes[..]).unwrap_err(),
        Error::LengthUnderflow {
            field: "pool",
            length: -1
        }
    );
}

#[test]
fn test_scaled_sibling_length() {
    // A connection table sized `(cursor - 1) * 4`.
    let schema = Schema::builder()
        .field(Field::i32("cursor"))
        .field(Field::bytes(
            "conns",
            Length::sibling_with("cursor", Transform::decrement_scaled(4)),
        ))
        .build()
        .unwrap();
    let mut bytes = i32s(&[3]);
    bytes.extend([0xAA; 8]);
    let record = schema.decode(&bytes[..]).unwrap();
    assert_eq!(record.get("conns").unwrap().as_bytes().unwrap().len(), 8);
    assert_eq!(schema.encode(&record).unwrap(), &bytes[..]);
}

#[test]
fn test_hidden_length_source() {
    let schema = Schema::builder()
        .field(Field::i32("count").hidden())
        .field(Field::bytes("data", Length::sibling("count")))
        .build()
        .unwrap();

    let mut bytes = i32s(&[2]);
    bytes.extend(b"hi");
    let record = schema.decode(&bytes[..]).unwrap();

    // The hidden count is reachable by name but not part of the view.
    assert_eq!(record.get("count"), Some(&Value::I32(2)));
    let names: Vec<_> = record.iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["data"]);

    assert_eq!(schema.encode(&record).unwrap(), &bytes[..]);
}

#[test]
fn test_order_invariant_under_inheritance() {
    let base = Schema::builder()
        .field(Field::i32("version"))
        .field(Field::i32("id"))
        .build()
        .unwrap();
    let derived = savefield::Builder::inherit(&base)
        .field(Field::i32("entityId"))
        .field(Field::f32("x"))
        .build()
        .unwrap();

    let mut bytes = i32s(&[1, 7, 9]);
    bytes.extend(1.5f32.to_le_bytes());
    let record = derived.decode(&bytes[..]).unwrap();
    let names: Vec<_> = record.iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["version", "id", "entityId", "x"]);
    assert_eq!(schemaless_roundtrip(&derived, &bytes), record);
}

fn schemaless_roundtrip(schema: &Schema, bytes: &[u8]) -> Record {
    let record = schema.decode(bytes).unwrap();
    let encoded = schema.encode(&record).unwrap();
    assert_eq!(encoded, bytes);
    schema.decode(&encoded[..]).unwrap()
}

#[test]
fn test_nested_failure_propagates() {
    let inner = Arc::new(
        Schema::builder()
            .field(Field::header("magic", b"IN"))
            .field(Field::i32("value"))
            .build()
            .unwrap(),
    );
    let outer = Schema::builder()
        .field(Field::i32("count"))
        .field(Field::array(
            "entries",
            Kind::Nested(inner),
            Length::sibling("count"),
        ))
        .build()
        .unwrap();

    let mut bytes = i32s(&[2]);
    bytes.extend(b"IN");
    bytes.extend(i32s(&[1]));
    bytes.extend(b"XX");
    bytes.extend(i32s(&[2]));
    assert_eq!(
        outer.decode(&bytes[..]).unwrap_err(),
        Error::HeaderMismatch("magic")
    );
}

/// A storage-component shaped schema: version-gated slots, an enumeration,
/// a conditional field, and an array of nested grids sized by a sibling.
fn storage_component() -> Schema {
    const STORAGE_TYPE: &[(i64, &str)] = &[(0, "Default"), (1, "Fuel"), (9, "Filtered")];
    let grid = Arc::new(
        Schema::builder()
            .field(Field::i32("itemId"))
            .field(Field::i32("filter"))
            .field(Field::i32("count"))
            .field(Field::i32("stackSize"))
            .build()
            .unwrap(),
    );
    Schema::builder()
        .field(Field::i32("version"))
        .field(Field::i32("id"))
        .field(Field::i32("entityId"))
        .field(Field::block_start(
            "sinceV1",
            Predicate::min_version("version", 1),
        ))
        .field(Field::i32("previous"))
        .field(Field::i32("next"))
        .field(Field::i32("bottom"))
        .field(Field::i32("top"))
        .field(Field::block_end("sinceV1End"))
        .field(Field::enumeration("storageType", STORAGE_TYPE))
        .field(Field::i32("gridSize"))
        .field(Field::conditional(
            "bans",
            Kind::Scalar(Scalar::I32),
            Predicate::min_version("version", 1),
        ))
        .field(Field::array(
            "grids",
            Kind::Nested(grid),
            Length::sibling("gridSize"),
        ))
        .build()
        .unwrap()
}

#[test]
fn test_storage_component_roundtrip_v1() {
    let schema = storage_component();
    let bytes = i32s(&[
        1, 100, 2001, // version, id, entityId
        -1, 101, 0, 0, // previous, next, bottom, top
        9,  // storageType (Filtered)
        2,  // gridSize
        -2, // bans
        1001, 0, 10, 100, // grid 0
        1002, 1002, 0, 50, // grid 1
    ]);
    let record = schemaless_roundtrip(&schema, &bytes);
    assert_eq!(record.get("storageType"), Some(&Value::I32(9)));
    let grids = record.get("grids").unwrap().as_array().unwrap();
    assert_eq!(
        grids[1].as_record().unwrap().get("filter"),
        Some(&Value::I32(1002))
    );
}

#[test]
fn test_storage_component_roundtrip_v0() {
    let schema = storage_component();
    let bytes = i32s(&[
        0, 100, 2001, // version, id, entityId; gated slots absent
        0, // storageType
        1, // gridSize; bans absent
        1001, 0, 10, 100, // grid 0
    ]);
    let record = schemaless_roundtrip(&schema, &bytes);
    assert!(record.get("previous").unwrap().is_absent());
    assert!(record.get("bans").unwrap().is_absent());
    assert_eq!(record.get("gridSize"), Some(&Value::I32(1)));
}

#[test]
fn test_nested_blocks() {
    // The outer gate decides alone when it is false; the inner predicate is
    // only consulted once the outer block is active.
    let schema = Schema::builder()
        .field(Field::i32("version"))
        .field(Field::i32("flags"))
        .field(Field::block_start(
            "outer",
            Predicate::min_version("version", 1),
        ))
        .field(Field::i32("a"))
        .field(Field::block_start("inner", Predicate::equals("flags", 1)))
        .field(Field::i32("b"))
        .field(Field::block_end("innerEnd"))
        .field(Field::i32("c"))
        .field(Field::block_end("outerEnd"))
        .build()
        .unwrap();

    // Outer false: everything inside is skipped.
    let bytes = i32s(&[0, 1]);
    let record = schemaless_roundtrip(&schema, &bytes);
    assert!(record.get("a").unwrap().is_absent());
    assert!(record.get("b").unwrap().is_absent());
    assert!(record.get("c").unwrap().is_absent());

    // Outer true, inner false: only `b` is skipped.
    let bytes = i32s(&[1, 0, 5, 7]);
    let record = schemaless_roundtrip(&schema, &bytes);
    assert_eq!(record.get("a"), Some(&Value::I32(5)));
    assert!(record.get("b").unwrap().is_absent());
    assert_eq!(record.get("c"), Some(&Value::I32(7)));

    // Both true.
    let bytes = i32s(&[1, 1, 5, 6, 7]);
    let record = schemaless_roundtrip(&schema, &bytes);
    assert_eq!(record.get("b"), Some(&Value::I32(6)));
}

#[test]
fn test_mixed_scalar_roundtrip() {
    let schema = Schema::builder()
        .field(Field::u8("flags"))
        .field(Field::i16("dx"))
        .field(Field::u64("tick"))
        .field(Field::f64("energy"))
        .field(Field::boolean("sandbox"))
        .field(Field::string("name"))
        .build()
        .unwrap();

    let mut bytes = vec![0x80];
    bytes.extend((-5i16).to_le_bytes());
    bytes.extend(123_456_789u64.to_le_bytes());
    bytes.extend(2.5f64.to_le_bytes());
    bytes.push(1);
    bytes.extend(b"\x06savegm");

    let record = schemaless_roundtrip(&schema, &bytes);
    assert_eq!(record.get("flags"), Some(&Value::U8(0x80)));
    assert_eq!(record.get("dx"), Some(&Value::I16(-5)));
    assert_eq!(record.get("tick"), Some(&Value::U64(123_456_789)));
    assert_eq!(record.get("energy"), Some(&Value::F64(2.5)));
    assert_eq!(record.get("sandbox"), Some(&Value::Bool(true)));
    assert_eq!(record.get("name"), Some(&Value::from("savegm")));
}
