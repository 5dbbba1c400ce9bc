//! Wire-level decoding tests against hand-built documents.

use sereal::decode::ErrorKind;
use sereal::{Decoder, Value};

/// Frame a body as a v1 document (legacy magic, no user header).
fn v1(body: &[u8]) -> Vec<u8> {
	let mut doc = vec![0x3D, 0x73, 0x72, 0x6C, 0x01, 0x00];
	doc.extend_from_slice(body);
	doc
}

/// Frame a body as a v2 document (legacy magic, no user header).
fn v2(body: &[u8]) -> Vec<u8> {
	let mut doc = vec![0x3D, 0x73, 0x72, 0x6C, 0x02, 0x00];
	doc.extend_from_slice(body);
	doc
}

/// Frame a body as a v3 document (high-bit magic, no user header).
fn v3(body: &[u8]) -> Vec<u8> {
	let mut doc = vec![0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00];
	doc.extend_from_slice(body);
	doc
}

fn varint(mut value: u64) -> Vec<u8> {
	let mut out = Vec::new();
	while value >= 0x80 {
		out.push((value & 0x7F) as u8 | 0x80);
		value >>= 7;
	}
	out.push(value as u8);
	out
}

fn kind_of(err: sereal::Error) -> ErrorKind {
	err.kind().expect("error must carry a kind").clone()
}

#[test]
fn empty_array() {
	for doc in [v1(&[0x40]), v2(&[0x40]), v3(&[0x40])] {
		let decoded = Decoder::new().decode_body(&doc).expect("valid document");
		assert!(matches!(decoded.root().value(), Value::Seq(items) if items.is_empty()));
	}
}

#[test]
fn high_bit_magic_with_v1_version_is_rejected() {
	let err = Decoder::new()
		.decode_body(&[0x3D, 0xF3, 0x72, 0x6C, 0x21, 0x00, 0x40])
		.expect_err("mixed framing must fail");
	assert_eq!(kind_of(err), ErrorKind::UnsupportedVersion(1));
}

#[test]
fn small_integers() {
	let doc = v1(&[0x44, 0x00, 0x01, 0x02, 0x05]);
	let values: Vec<i64> = Decoder::new().decode_body_as(&doc).expect("valid");
	assert_eq!(values, [0, 1, 2, 5]);
}

#[test]
fn small_negative_integers() {
	let doc = v1(&[0x42, 0x10, 0x1F]);
	let values: Vec<i64> = Decoder::new().decode_body_as(&doc).expect("valid");
	assert_eq!(values, [-16, -1]);
}

#[test]
fn varint_values() {
	let mut body = vec![0x20];
	body.extend(varint(500));
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().as_i64(), Some(500));
}

#[test]
fn varint_overflowing_i64_stays_unsigned() {
	let mut body = vec![0x20];
	body.extend(varint(u64::MAX));
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().value(), &Value::UInt(u64::MAX));
}

#[test]
fn zigzag_values() {
	let mut body = vec![0x21];
	body.extend(varint(33));
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().as_i64(), Some(-17));

	let decoded = Decoder::new().decode_body(&v1(&[0x21, 0x01])).expect("valid");
	assert_eq!(decoded.root().as_i64(), Some(-1));
}

#[test]
fn floats() {
	let mut body = vec![0x22];
	body.extend(1.5f32.to_le_bytes());
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().value(), &Value::Float(1.5));

	let mut body = vec![0x23];
	body.extend((-2.5f64).to_le_bytes());
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().as_f64(), Some(-2.5));
}

#[test]
fn booleans_and_undef() {
	let doc = v1(&[0x43, 0x3B, 0x3C, 0x25]);
	let decoded = Decoder::new().decode_body(&doc).expect("valid");
	let items: Vec<_> = decoded.root().items().collect();
	assert_eq!(items[0].as_bool(), Some(true));
	assert_eq!(items[1].as_bool(), Some(false));
	assert!(items[2].is_undef());
}

#[test]
fn canonical_undef_distinct_only_in_compat() {
	let doc = v1(&[0x3A]);
	let decoded = Decoder::new().decode_body(&doc).expect("valid");
	assert_eq!(decoded.root().value(), &Value::Undef);

	let decoded = Decoder::new().compat(true).decode_body(&doc).expect("valid");
	assert_eq!(decoded.root().value(), &Value::CanonicalUndef);
}

#[test]
fn strings() {
	// SHORT_BINARY_3
	let decoded = Decoder::new()
		.decode_body(&v1(&[0x63, b'a', b'b', b'c']))
		.expect("valid");
	assert_eq!(decoded.root().as_str(), Some("abc"));

	// BINARY with varint length
	let decoded = Decoder::new()
		.decode_body(&v1(&[0x26, 0x03, b'x', b'y', b'z']))
		.expect("valid");
	assert_eq!(decoded.root().value(), &Value::Bytes(b"xyz".to_vec()));

	// STR_UTF8
	let text = "héllo";
	let mut body = vec![0x27];
	body.extend(varint(text.len() as u64));
	body.extend_from_slice(text.as_bytes());
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().value(), &Value::Str(text.to_owned()));
}

#[test]
fn invalid_utf8_in_text_token() {
	let err = Decoder::new()
		.decode_body(&v1(&[0x27, 0x02, 0xFF, 0xFE]))
		.expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::InvalidUtf8);
}

#[test]
fn hash_entries() {
	let doc = v1(&[0x51, 0x61, b'a', 0x01]);
	let decoded = Decoder::new().decode_body(&doc).expect("valid");
	let entries: Vec<_> = decoded.root().entries().collect();
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].0.as_str(), Some("a"));
	assert_eq!(entries[0].1.as_i64(), Some(1));
}

#[test]
fn hash_key_must_be_stringish() {
	let err = Decoder::new()
		.decode_body(&v1(&[0x51, 0x01, 0x02]))
		.expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::ExpectedStringish);
}

#[test]
fn string_dedup_via_copy() {
	// ARRAYREF_2 at offset 1, SHORT_BINARY_3 "abc" at offset 2, COPY -> 2.
	let body = [0x42, 0x63, b'a', b'b', b'c', 0x2F, 0x02];
	let values: Vec<String> = Decoder::new().decode_body_as(&v2(&body)).expect("valid");
	assert_eq!(values, ["abc", "abc"]);
}

#[test]
fn copy_as_hash_key() {
	// HASHREF_2: "ab" => 1 (key at offset 2), COPY(2) => 2. Same key twice,
	// so the later entry wins in a map destination.
	let body = [0x52, 0x62, b'a', b'b', 0x01, 0x2F, 0x02, 0x02];
	let decoded = Decoder::new().decode_body(&v2(&body)).expect("valid");
	let entries: Vec<_> = decoded.root().entries().collect();
	assert_eq!(entries.len(), 2);
	assert_eq!(entries[0].0.as_str(), Some("ab"));
	assert_eq!(entries[1].0.as_str(), Some("ab"));
	assert_eq!(entries[1].1.as_i64(), Some(2));
}

#[test]
fn hash_key_may_be_a_back_reference() {
	// ARRAYREF_2 of a tracked SHORT_BINARY at offset 2 and a HASHREF_1
	// whose key is a REFP back to it.
	let body = [0x42, 0xE2, b'a', b'b', 0x51, 0x29, 0x02, 0x05];
	let decoded = Decoder::new().decode_body(&v2(&body)).expect("valid");
	let items: Vec<_> = decoded.root().items().collect();
	let entries: Vec<_> = items[1].entries().collect();
	assert_eq!(
		entries[0].0.resolved().expect("resolvable").as_str(),
		Some("ab"),
	);
	assert_eq!(entries[0].1.as_i64(), Some(5));
}

#[test]
fn hash_key_may_be_a_reference_in_compat_mode() {
	// HASHREF_1 whose key is REFN SHORT_BINARY_1: compat mode keeps the
	// reference wrapper on the key node.
	let body = [0x51, 0x28, 0x61, b'k', 0x05];
	let decoded = Decoder::new().compat(true).decode_body(&v1(&body)).expect("valid");
	let map = decoded.root().resolved().expect("resolvable");
	let entries: Vec<_> = map.entries().collect();
	assert!(matches!(entries[0].0.value(), Value::Ref(_)));
	assert_eq!(
		entries[0].0.resolved().expect("resolvable").as_str(),
		Some("k"),
	);
}

#[test]
fn refp_shares_identity() {
	// Track-flagged SHORT_BINARY at offset 2, then REFP back to it.
	let body = [0x42, 0xE3, b'a', b'b', b'c', 0x29, 0x02];
	let decoded = Decoder::new().decode_body(&v2(&body)).expect("valid");
	let items: Vec<_> = decoded.root().items().collect();
	let shared = items[1].resolved().expect("resolvable");
	assert_eq!(shared.node(), items[0].node());
	assert_eq!(shared.as_str(), Some("abc"));
}

#[test]
fn alias_splices_the_same_node() {
	let body = [0x42, 0xE3, b'a', b'b', b'c', 0x2E, 0x02];
	let decoded = Decoder::new().decode_body(&v2(&body)).expect("valid");
	let items: Vec<_> = decoded.root().items().collect();
	assert_eq!(items[0].node(), items[1].node());
}

#[test]
fn refp_to_untracked_offset() {
	let err = Decoder::new()
		.decode_body(&v2(&[0x29, 0x01]))
		.expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::UntrackedOffset(1));
}

#[test]
fn refp_offset_out_of_bounds() {
	let err = Decoder::new()
		.decode_body(&v2(&[0x29, 0xC8, 0x01]))
		.expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::BadOffset(200));
}

#[test]
fn cyclic_structure_via_refp() {
	// Track-flagged ARRAYREF_1 at offset 1 holding a track-flagged REFN
	// whose child points back at the array.
	let body = [0xC1, 0xA8, 0x29, 0x01];

	// Compat mode: the element aliases the outer array.
	let decoded = Decoder::new()
		.compat(true)
		.decode_body(&v2(&body))
		.expect("valid");
	let array = decoded.root().resolved().expect("resolvable");
	let items: Vec<_> = array.items().collect();
	assert_eq!(
		items[0].resolved().expect("resolvable").node(),
		array.node(),
	);

	// Default mode flattens the inner reference but keeps the cycle
	// representable in the graph.
	let decoded = Decoder::new().decode_body(&v2(&body)).expect("valid");
	let array = decoded.root();
	let items: Vec<_> = array.items().collect();
	assert_eq!(
		items[0].resolved().expect("resolvable").node(),
		array.node(),
	);
}

#[test]
fn arrayref_wraps_in_compat_mode() {
	let decoded = Decoder::new()
		.compat(true)
		.decode_body(&v1(&[0x40]))
		.expect("valid");
	assert!(matches!(decoded.root().value(), Value::Ref(_)));
	let inner = decoded.root().resolved().expect("resolvable");
	assert!(matches!(inner.value(), Value::Seq(items) if items.is_empty()));
}

#[test]
fn weaken_wraps_only_in_compat_mode() {
	let body = [0x30, 0x28, 0x01];
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().as_i64(), Some(1));

	let decoded = Decoder::new().compat(true).decode_body(&v1(&body)).expect("valid");
	assert!(matches!(decoded.root().value(), Value::Weak(_)));
	let inner = decoded.root().resolved().expect("resolvable");
	assert_eq!(inner.as_i64(), Some(1));
}

#[test]
fn object_discards_class_by_default() {
	let body = [0x2C, 0x63, b'F', b'o', b'o', 0x01];
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(decoded.root().as_i64(), Some(1));
}

#[test]
fn object_wraps_in_compat_mode() {
	let body = [0x2C, 0x63, b'F', b'o', b'o', 0x01];
	let decoded = Decoder::new().compat(true).decode_body(&v1(&body)).expect("valid");
	let Value::Object { class, value } = decoded.root().value() else {
		panic!("expected an object value");
	};
	assert_eq!(decoded.root().at(*class).as_str(), Some("Foo"));
	assert_eq!(decoded.root().at(*value).as_i64(), Some(1));
}

#[test]
fn objectv_reuses_class_name() {
	// ARRAYREF_2 of OBJECT "Foo" 1 and OBJECTV (offset of "Foo") 2.
	let body = [0x42, 0x2C, 0x63, b'F', b'o', b'o', 0x01, 0x2D, 0x03, 0x02];
	let values: Vec<i64> = Decoder::new().decode_body_as(&v2(&body)).expect("valid");
	assert_eq!(values, [1, 2]);

	let decoded = Decoder::new().compat(true).decode_body(&v2(&body)).expect("valid");
	let root = decoded.root().resolved().expect("resolvable");
	for item in root.items() {
		let Value::Object { class, .. } = item.value() else {
			panic!("expected an object value");
		};
		assert_eq!(item.at(*class).as_str(), Some("Foo"));
	}
}

#[test]
fn object_class_must_be_stringish() {
	let err = Decoder::new()
		.decode_body(&v1(&[0x2C, 0x01, 0x01]))
		.expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::ExpectedStringish);
}

#[test]
fn object_freeze_without_unmarshaler_stays_frozen() {
	let body = [0x32, 0x63, b'F', b'o', b'o', 0x61, b'x'];
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	assert_eq!(
		decoded.root().value(),
		&Value::Frozen {
			class: "Foo".to_owned(),
			payload: b"x".to_vec(),
		},
	);
}

#[test]
fn objectv_freeze_reuses_class_name() {
	let body = [
		0x42, // ARRAYREF_2 at offset 1
		0x32, 0x63, b'F', b'o', b'o', 0x61, b'x', // OBJECT_FREEZE, class at offset 3
		0x33, 0x03, 0x61, b'y', // OBJECTV_FREEZE -> 3
	];
	let decoded = Decoder::new().decode_body(&v2(&body)).expect("valid");
	let items: Vec<_> = decoded.root().items().collect();
	for (item, payload) in items.iter().zip([b"x", b"y"]) {
		assert_eq!(
			item.value(),
			&Value::Frozen {
				class: "Foo".to_owned(),
				payload: payload.to_vec(),
			},
		);
	}
}

#[test]
fn regexp() {
	let body = [0x31, 0x63, b'a', b'b', b'c', 0x61, b'i'];
	let decoded = Decoder::new().decode_body(&v1(&body)).expect("valid");
	let Value::Regexp { pattern, flags } = decoded.root().value() else {
		panic!("expected a regexp value");
	};
	assert_eq!(decoded.root().at(*pattern).as_str(), Some("abc"));
	assert_eq!(decoded.root().at(*flags).as_str(), Some("i"));
}

#[test]
fn pad_bytes_are_skipped() {
	let decoded = Decoder::new()
		.decode_body(&v1(&[0x3F, 0xBF, 0x3F, 0x01]))
		.expect("valid");
	assert_eq!(decoded.root().as_i64(), Some(1));
}

#[test]
fn nested_copy_target_must_be_stringish() {
	// ARRAYREF_3: POS_1 at offset 2, COPY -> 2, COPY -> 3 (the first COPY).
	let body = [0x43, 0x01, 0x2F, 0x02, 0x2F, 0x03];
	let err = Decoder::new().decode_body(&v2(&body)).expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::NestedCopyNotStringish);
}

#[test]
fn top_level_copy_of_non_string_is_fine() {
	let body = [0x42, 0x01, 0x2F, 0x02];
	let values: Vec<i64> = Decoder::new().decode_body_as(&v2(&body)).expect("valid");
	assert_eq!(values, [1, 1]);
}

#[test]
fn copy_may_not_point_forward() {
	let body = [0x42, 0x2F, 0x04, 0x01];
	let err = Decoder::new().decode_body(&v2(&body)).expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::BadOffset(4));
}

#[test]
fn unknown_tags() {
	for tag in [0x24u8, 0x34, 0x3E] {
		let err = Decoder::new().decode_body(&v1(&[tag])).expect_err("must fail");
		assert_eq!(kind_of(err), ErrorKind::UnknownTag(tag));
	}
}

#[test]
fn bad_varint() {
	let mut body = vec![0x20];
	body.extend([0x80; 10]);
	let err = Decoder::new().decode_body(&v1(&body)).expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::BadVarint);
}

#[test]
fn utf8_contaminated_magic() {
	let err = Decoder::new()
		.decode_body(&[0x3D, 0xC3, 0xB3, 0x72, 0x6C, 0x01, 0x00, 0x40])
		.expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::Utf8ContaminatedHeader);
}

#[test]
fn truncation_sweep() {
	let doc = v1(&[0x44, 0x00, 0x01, 0x02, 0x05]);
	for len in 0..doc.len() {
		let err = Decoder::new().decode_body(&doc[..len]).expect_err("must fail");
		assert_eq!(kind_of(err), ErrorKind::Truncated, "prefix of {len} bytes");
	}
	assert!(Decoder::new().decode_body(&doc).is_ok());
}

#[test]
fn depth_limit() {
	let mut body = vec![0x28; 40];
	body.push(0x01);
	let err = Decoder::new()
		.max_depth(16)
		.decode_body(&v1(&body))
		.expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::DepthLimit);

	let ok = Decoder::new().decode_body(&v1(&body)).expect("within default cap");
	assert_eq!(ok.root().as_i64(), Some(1));
}

#[test]
fn snappy_v1_whole_tail() {
	let plain = [0x42, 0x01, 0x02];
	let blob = snap::raw::Encoder::new()
		.compress_vec(&plain)
		.expect("compressible");
	let mut doc = vec![0x3D, 0x73, 0x72, 0x6C, 0x11, 0x00];
	doc.extend_from_slice(&blob);
	let values: Vec<i64> = Decoder::new().decode_body_as(&doc).expect("valid");
	assert_eq!(values, [1, 2]);
}

#[test]
fn snappy_incremental_preserves_offsets() {
	// Plaintext body with a COPY back-reference; offsets must survive the
	// decompression splice.
	let plain = [0x42, 0x62, b'a', b'b', 0x2F, 0x02];
	let blob = snap::raw::Encoder::new()
		.compress_vec(&plain)
		.expect("compressible");
	let mut doc = vec![0x3D, 0x73, 0x72, 0x6C, 0x22, 0x00];
	doc.extend(varint(blob.len() as u64));
	doc.extend_from_slice(&blob);
	let values: Vec<String> = Decoder::new().decode_body_as(&doc).expect("valid");
	assert_eq!(values, ["ab", "ab"]);
}

#[test]
fn zlib_v3() {
	use flate2::write::ZlibEncoder;
	use flate2::Compression;
	use std::io::Write;

	let mut plain = vec![0x20];
	plain.extend(varint(42));
	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(&plain).expect("compressible");
	let blob = encoder.finish().expect("compressible");

	let mut doc = vec![0x3D, 0xF3, 0x72, 0x6C, 0x33, 0x00];
	doc.extend(varint(plain.len() as u64));
	doc.extend(varint(blob.len() as u64));
	doc.extend_from_slice(&blob);

	let decoded = Decoder::new().decode_body(&doc).expect("valid");
	assert_eq!(decoded.root().as_i64(), Some(42));
}

#[test]
fn zlib_length_mismatch() {
	use flate2::write::ZlibEncoder;
	use flate2::Compression;
	use std::io::Write;

	let plain = [0x01u8];
	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(&plain).expect("compressible");
	let blob = encoder.finish().expect("compressible");

	let mut doc = vec![0x3D, 0xF3, 0x72, 0x6C, 0x33, 0x00];
	doc.extend(varint(9)); // wrong uncompressed length
	doc.extend(varint(blob.len() as u64));
	doc.extend_from_slice(&blob);

	let err = Decoder::new().decode_body(&doc).expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::Decompress);
}

#[test]
fn corrupt_zlib_stream() {
	let mut doc = vec![0x3D, 0xF3, 0x72, 0x6C, 0x33, 0x00];
	doc.extend(varint(2)); // claimed uncompressed length
	doc.extend(varint(4)); // compressed length
	doc.extend([0x01, 0x02, 0x03, 0x04]); // not a zlib stream

	let err = Decoder::new().decode_body(&doc).expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::Decompress);
}

#[test]
fn user_header_decode() {
	// v2 document: user header is flag byte + VARINT 42, body is TRUE.
	let mut doc = vec![0x3D, 0x73, 0x72, 0x6C, 0x02];
	doc.push(0x03); // user header length
	doc.extend([0x01, 0x20, 0x2A]); // flag, VARINT, 42
	doc.push(0x3B); // body: TRUE

	let header = Decoder::new().decode_header(&doc).expect("valid");
	assert_eq!(header.root().as_i64(), Some(42));

	let body = Decoder::new().decode_body(&doc).expect("valid");
	assert_eq!(body.root().as_bool(), Some(true));
}

#[test]
fn user_header_with_back_reference() {
	// Suffix data uses offsets relative to the flag byte: the tracked
	// SHORT_BINARY sits at offset 2.
	let suffix = [0x01, 0x42, 0xE2, b'h', b'i', 0x29, 0x02];
	let mut doc = vec![0x3D, 0x73, 0x72, 0x6C, 0x02];
	doc.push(suffix.len() as u8);
	doc.extend(suffix);
	doc.push(0x25); // body: UNDEF

	let header = Decoder::new().decode_header(&doc).expect("valid");
	let items: Vec<_> = header.root().items().collect();
	assert_eq!(
		items[1].resolved().expect("resolvable").node(),
		items[0].node(),
	);
}

#[test]
fn user_header_missing() {
	let doc = v1(&[0x40]);
	let err = Decoder::new().decode_header(&doc).expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::BadHeader);
}

#[test]
fn user_header_not_encoded() {
	let mut doc = vec![0x3D, 0x73, 0x72, 0x6C, 0x02];
	doc.push(0x02);
	doc.extend([0x00, 0x2A]); // flag byte with low bit clear
	doc.push(0x3B);
	let err = Decoder::new().decode_header(&doc).expect_err("must fail");
	assert_eq!(kind_of(err), ErrorKind::BadHeader);
}

#[test]
fn sniffing() {
	assert!(sereal::looks_like_sereal(&v1(&[0x40])));
	assert!(sereal::looks_like_sereal(&v3(&[0x40])));
	assert!(!sereal::looks_like_sereal(b"{\"json\":true}"));
}
