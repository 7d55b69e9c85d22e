use indexmap::IndexMap;
use pipeline_convert::core::convert::flexible::{
    render_scalar, FlexibleValue, Scalar, Settings, ShapeHint,
};
use proptest::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};

type Loose = FlexibleValue<IndexMap<String, Value>>;

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
struct RunBody {
    command: String,
    #[serde(default)]
    name: Option<String>,
}

fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<String>().prop_map(Value::String),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        (-1.0e6f64..1.0e6f64)
            .prop_filter("fractional", |f| f.fract() != 0.0)
            .prop_map(Value::from),
    ]
}

fn value_tree() -> impl Strategy<Value = Value> {
    scalar_value().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 1..4).prop_map(|pairs| {
                Value::Object(pairs.into_iter().collect())
            }),
        ]
    })
}

proptest! {
    #[test]
    fn decode_then_encode_returns_the_input(raw in value_tree()) {
        let decoded = Loose::decode(&raw, ShapeHint::Any).unwrap();
        prop_assert_eq!(decoded.encode(), raw);
    }

    #[test]
    fn string_hint_commits_every_scalar_as_text(raw in scalar_value()) {
        let decoded = Loose::decode(&raw, ShapeHint::String).unwrap();
        prop_assert_eq!(decoded.as_str().map(str::to_string), render_scalar(&raw));
    }
}

#[test]
fn run_step_shapes_commit_to_one_variant() {
    let short = FlexibleValue::<RunBody>::decode(&json!("make test"), ShapeHint::Any).unwrap();
    assert_eq!(short.as_str(), Some("make test"));

    let long = FlexibleValue::<RunBody>::decode(
        &json!({"command": "make test", "name": "Test"}),
        ShapeHint::Any,
    )
    .unwrap();
    assert_eq!(
        long.as_struct(),
        Some(&RunBody {
            command: "make test".into(),
            name: Some("Test".into()),
        })
    );
}

#[test]
fn map_not_matching_the_structured_form_is_unsupported() {
    let err = FlexibleValue::<RunBody>::decode(&json!({"name": "no command"}), ShapeHint::Any)
        .unwrap_err();
    assert_eq!(err.found, "object");
    assert!(err.to_string().contains("unsupported shape"));
}

#[test]
fn null_is_never_a_valid_shape() {
    assert!(Loose::decode(&Value::Null, ShapeHint::Any).is_err());
}

#[test]
fn integers_stay_integers_without_a_hint() {
    let decoded = Loose::decode(&json!(42), ShapeHint::Any).unwrap();
    assert_eq!(decoded, FlexibleValue::Literal(Scalar::Int(42)));
    assert_eq!(decoded.as_i64(), Some(42));
    assert_eq!(decoded.as_str(), None);
}

#[test]
fn integers_above_i64_keep_their_exact_value() {
    let raw = json!(18446744073709551615u64);
    let decoded = Loose::decode(&raw, ShapeHint::Any).unwrap();
    assert_eq!(decoded, FlexibleValue::Literal(Scalar::UInt(u64::MAX)));
    assert_eq!(decoded.encode(), raw);
    assert_eq!(decoded.as_i64(), None);
    assert_eq!(decoded.as_string().as_deref(), Some("18446744073709551615"));
}

#[test]
fn string_or_list_collapses_to_a_list() {
    let single = Loose::decode(&json!("node_modules"), ShapeHint::Any).unwrap();
    let many = Loose::decode(&json!(["a", 1]), ShapeHint::Any).unwrap();
    assert_eq!(single.string_list(), Some(vec!["node_modules".to_string()]));
    assert_eq!(many.string_list(), Some(vec!["a".to_string(), "1".to_string()]));
}

#[test]
fn settings_accessors_read_typed_values() {
    let settings = Settings::from_value(&json!({
        "rebuild": true,
        "restore": "false",
        "cache_key": "deps",
        "mount": ["node_modules"]
    }));
    assert_eq!(settings.get_bool("rebuild"), Some(true));
    assert_eq!(settings.get_bool("restore"), Some(false));
    assert_eq!(settings.get_str("cache_key"), Some("deps"));
    assert_eq!(settings.get_bool("missing"), None);
    assert_eq!(settings.len(), 4);
}
