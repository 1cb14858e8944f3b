//! Data envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde_json::Value;

use courier_core::{TypedEnvelope, TypedValue};

use vector_loader::load;

fn assert_field(env: &TypedEnvelope, name: &str, ex: &Value, description: &str) {
    let tag = ex["type"].as_str().unwrap();
    assert_eq!(env.tag_of(name).unwrap().as_str(), tag, "vector={description} field={name}");

    let v = &ex["value"];
    match env.value(name).unwrap() {
        TypedValue::Object(bytes) => {
            let want: Vec<u8> = v
                .as_array()
                .unwrap()
                .iter()
                .map(|b| b.as_u64().unwrap() as u8)
                .collect();
            assert_eq!(bytes.to_vec(), want, "vector={description} field={name}");
        }
        TypedValue::Double(d) => assert_eq!(*d, v.as_f64().unwrap(), "vector={description}"),
        TypedValue::Float(f) => assert_eq!(*f, v.as_f64().unwrap() as f32, "vector={description}"),
        TypedValue::Long(x) => assert_eq!(*x, v.as_i64().unwrap(), "vector={description}"),
        TypedValue::Int(x) => assert_eq!(*x as i64, v.as_i64().unwrap(), "vector={description}"),
        TypedValue::Short(x) => assert_eq!(*x as i64, v.as_i64().unwrap(), "vector={description}"),
        TypedValue::Byte(x) => assert_eq!(*x as i64, v.as_i64().unwrap(), "vector={description}"),
        TypedValue::String(s) => assert_eq!(s, v.as_str().unwrap(), "vector={description}"),
        TypedValue::Char(c) => {
            assert_eq!(Some(*c), v.as_str().unwrap().chars().next(), "vector={description}")
        }
        TypedValue::Boolean(b) => assert_eq!(*b, v.as_bool().unwrap(), "vector={description}"),
    }
}

#[test]
fn data_vectors() {
    let files = [
        "data_all_tags.json",
        "data_object_signed_bytes.json",
        "data_empty.json",
        "data_byte_out_of_range.json",
        "data_float_out_of_range.json",
        "data_double_out_of_range.json",
        "data_unknown_tag.json",
        "data_char_too_long.json",
        "data_object_byte_overflow.json",
        "data_missing_id.json",
        "data_not_json.json",
    ];

    for f in files {
        let v = load(f);
        let res = TypedEnvelope::from_json(&v.input_text());

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.id(), ex["id"].as_str().unwrap(), "vector={}", v.description);
        let fields = ex["fields"].as_object().unwrap();
        assert_eq!(env.len(), fields.len(), "vector={}", v.description);
        for (name, field) in fields {
            assert_field(&env, name, field, &v.description);
        }
    }
}

#[test]
fn float_overflow_names_the_field() {
    let too_wide = r#"{"id":"x","data":{"ratio":{"type":"FLOAT","data":-3.5e38}}}"#;
    let e = TypedEnvelope::from_json(too_wide).expect_err("must not decode to -inf");
    assert_eq!(e.code().as_str(), "CODEC");
    assert!(e.to_string().contains("ratio"), "{e}");

    // Largest finite f32 still decodes.
    let widest = r#"{"id":"x","data":{"ratio":{"type":"FLOAT","data":3.4028235e38}}}"#;
    let ok = TypedEnvelope::from_json(widest).unwrap();
    assert_eq!(ok.get::<f32>("ratio").unwrap(), f32::MAX);
}

#[test]
fn reencoded_vector_decodes_to_same_envelope() {
    let v = load("data_all_tags.json");
    let env = TypedEnvelope::from_json(&v.input_text()).unwrap();

    let again = TypedEnvelope::from_json(&env.to_json().unwrap()).unwrap();
    assert_eq!(env, again);
}
