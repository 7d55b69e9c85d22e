use indexmap::IndexMap;
use pipeline_convert::core::convert::matrix::{
    combination_bindings, combination_label, matches_exclusion, MatrixSpec,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn os_arch() -> MatrixSpec {
    MatrixSpec::new()
        .axis("os", vec![json!("linux"), json!("windows")])
        .axis("arch", vec![json!("amd64"), json!("arm64")])
}

fn assignment(pairs: &[(&str, &str)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(axis, value)| (axis.to_string(), json!(value)))
        .collect()
}

#[test]
fn full_product_without_exclusions() {
    let combinations = os_arch().expand();
    assert_eq!(combinations.len(), 4);
    assert_eq!(os_arch().product_size(), 4);
}

#[test]
fn full_exclusion_removes_exactly_one_combination() {
    let spec = os_arch().exclusion(assignment(&[("os", "windows"), ("arch", "arm64")]));
    let labels: Vec<String> = spec.expand().iter().map(combination_label).collect();
    assert_eq!(labels, vec!["linux-amd64", "linux-arm64", "windows-amd64"]);
}

#[test]
fn exclusion_on_unknown_axis_matches_nothing() {
    let spec = os_arch().exclusion(assignment(&[("python", "3.9")]));
    assert_eq!(spec.expand().len(), 4);
}

#[test]
fn no_axes_yield_a_single_empty_combination() {
    let combinations = MatrixSpec::new().expand();
    assert_eq!(combinations.len(), 1);
    assert!(combinations[0].is_empty());
    assert_eq!(combination_label(&combinations[0]), "");
}

#[test]
fn empty_axis_yields_nothing() {
    let spec = MatrixSpec::new()
        .axis("os", vec![json!("linux")])
        .axis("arch", vec![]);
    assert!(spec.expand().is_empty());
}

#[test]
fn combinations_bind_rendered_options() {
    let spec = MatrixSpec::new()
        .axis("node", vec![json!(18)])
        .axis("lts", vec![json!(true)]);
    let bindings = combination_bindings(&spec.expand()[0]);
    assert_eq!(bindings.get("node").map(String::as_str), Some("18"));
    assert_eq!(bindings.get("lts").map(String::as_str), Some("true"));
}

#[test]
fn matrix_spec_reads_from_json() {
    let spec: MatrixSpec = serde_json::from_value(json!({
        "axes": {"os": ["linux", "mac"]},
        "exclude": [{"os": "mac"}],
        "max_concurrency": 2
    }))
    .unwrap();
    assert_eq!(spec.max_concurrency, Some(2));
    assert_eq!(spec.expand().len(), 1);
}

fn axes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..4, 0..4)
}

proptest! {
    #[test]
    fn cardinality_is_product_minus_excluded(sizes in axes(), picks in prop::collection::vec(0usize..16, 0..3)) {
        let mut spec = MatrixSpec::new();
        for (index, size) in sizes.iter().enumerate() {
            let options = (0..*size).map(|option| json!(format!("o{}", option))).collect();
            spec = spec.axis(format!("a{}", index), options);
        }
        let product = spec.product_size();
        prop_assert_eq!(product, sizes.iter().product::<usize>());

        let full = spec.expand();
        prop_assert_eq!(full.len(), product);

        // Exclusions are complete assignments lifted from the product itself.
        if !sizes.is_empty() {
            for pick in &picks {
                spec = spec.exclusion(full[pick % full.len()].clone());
            }
        }
        let kept = spec.expand();
        let excluded = full
            .iter()
            .filter(|combination| spec.exclude.iter().any(|exclusion| matches_exclusion(combination, exclusion)))
            .count();
        prop_assert_eq!(kept.len(), product - excluded);

        for combination in &kept {
            prop_assert!(spec.exclude.iter().all(|exclusion| !matches_exclusion(combination, exclusion)));
        }
    }
}
