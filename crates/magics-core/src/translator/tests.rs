//! Unit tests for command translation.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::device::{DeviceRef, simulated_devices};
use crate::namespace::NamespaceValue;
use crate::registry::{JobRegistry, build_deployment};

#[fixture]
fn namespace() -> Namespace {
    Namespace::with_devices(simulated_devices())
}

#[fixture]
fn registry() -> JobRegistry {
    build_deployment("common").expect("common deployment builds")
}

fn tokens(input: &str) -> Vec<String> {
    input.split_whitespace().map(str::to_owned).collect()
}

fn translate(
    namespace: &Namespace,
    registry: &JobRegistry,
    alias: &str,
    input: &str,
) -> Result<JobRequest, TranslateError> {
    let descriptor = registry.resolve(alias).expect("alias is whitelisted");
    Translator::new(namespace).translate(&descriptor, &tokens(input))
}

fn device(name: &str, kind: DeviceKind) -> ArgValue {
    ArgValue::Device(DeviceRef::new(name, kind))
}

// ---------------------------------------------------------------------------
// Device groups
// ---------------------------------------------------------------------------

#[rstest]
fn count_packs_detectors_into_one_list(namespace: Namespace, registry: JobRegistry) {
    let request = translate(&namespace, &registry, "count", "SIM_det SIM_det1")
        .expect("count translates");
    assert_eq!(
        request.args(),
        &[ArgValue::List(vec![
            device("SIM_det", DeviceKind::Detector),
            device("SIM_det1", DeviceKind::Detector),
        ])]
    );
    assert!(request.kwargs().is_empty());
}

#[rstest]
fn mov_flattens_motor_position_pairs(namespace: Namespace, registry: JobRegistry) {
    let request = translate(&namespace, &registry, "mov", "SIM_motor 5 SIM_motor1 -2.5")
        .expect("mov translates");
    assert_eq!(
        request.args(),
        &[
            device("SIM_motor", DeviceKind::Motor),
            ArgValue::Float(5.0),
            device("SIM_motor1", DeviceKind::Motor),
            ArgValue::Float(-2.5),
        ]
    );
}

#[rstest]
fn scan_places_detectors_before_motor_triplets(namespace: Namespace, registry: JobRegistry) {
    let request = translate(
        &namespace,
        &registry,
        "scan",
        "SIM_det -m SIM_motor -1 1 SIM_motor1 0 10 -n 11",
    )
    .expect("scan translates");

    let item = request.plan_item();
    assert_eq!(
        serde_json::Value::Array(item.args),
        serde_json::json!([["SIM_det"], "SIM_motor", -1.0, 1.0, "SIM_motor1", 0.0, 10.0])
    );
    assert_eq!(item.kwargs.get("num"), Some(&serde_json::json!(11)));
}

#[rstest]
fn detectors_flag_may_follow_other_groups(namespace: Namespace, registry: JobRegistry) {
    let request = translate(
        &namespace,
        &registry,
        "grid_scan",
        "-m SIM_motor 0 1 3 SIM_motor1 0 1 4 -s -d SIM_det",
    )
    .expect("grid scan translates");
    assert_eq!(request.args().len(), 9);
    assert_eq!(request.kwargs().get("snake_axes"), Some(&ArgValue::Bool(true)));
}

#[rstest]
#[case("SIM_motor", "values come in groups of 2")]
#[case("SIM_motor 1 SIM_motor1", "values come in groups of 2")]
#[case("", "at least 1 required")]
fn mov_rejects_incomplete_pairs(
    namespace: Namespace,
    registry: JobRegistry,
    #[case] input: &str,
    #[case] detail: &str,
) {
    let error = translate(&namespace, &registry, "mov", input).expect_err("arity violation");
    match error {
        TranslateError::Arity { detail: actual, .. } => {
            assert!(actual.contains(detail), "unexpected detail: {actual}");
        }
        other => panic!("expected arity error, got {other:?}"),
    }
}

#[test]
fn upper_bound_on_repetitions_is_enforced() {
    let group = DeviceGroup::new("pair", vec![FieldKind::Float]).with_repeat(1, Some(1));
    let error = check_arity(&group, &["1", "2"]).expect_err("second repetition exceeds bound");
    assert!(matches!(error, TranslateError::Arity { .. }));
}

#[rstest]
fn scan_without_motors_is_an_arity_error(namespace: Namespace, registry: JobRegistry) {
    let error = translate(&namespace, &registry, "scan", "SIM_det -n 3").expect_err("no motors");
    assert!(matches!(error, TranslateError::Arity { ref group, .. } if group == "motor triplets"));
}

// ---------------------------------------------------------------------------
// Resolution and conversion
// ---------------------------------------------------------------------------

#[rstest]
fn unresolved_devices_are_named(namespace: Namespace, registry: JobRegistry) {
    let error = translate(&namespace, &registry, "mov", "ghost_motor 1").expect_err("unresolved");
    assert_eq!(
        error,
        TranslateError::UnresolvedDevice {
            token: String::from("ghost_motor")
        }
    );
}

#[rstest]
fn non_device_entries_are_not_devices(namespace: Namespace, registry: JobRegistry) {
    namespace.add_to_namespace("note", NamespaceValue::Text(String::from("hello")));
    let error = translate(&namespace, &registry, "count", "note").expect_err("not a device");
    assert!(matches!(error, TranslateError::ArgumentType { ref token, .. } if token == "note"));
}

#[rstest]
fn motor_slots_require_movable_devices(namespace: Namespace, registry: JobRegistry) {
    namespace.replace_devices([DeviceRef::new("diode", DeviceKind::Readable)]);
    let error = translate(&namespace, &registry, "mov", "diode 1").expect_err("not movable");
    assert_eq!(
        error,
        TranslateError::ArgumentType {
            token: String::from("diode"),
            expected: String::from("a movable device"),
        }
    );
}

#[rstest]
#[case("count", "SIM_det -n three", "three", "an integer")]
#[case("count", "SIM_det --delay soon", "soon", "a number")]
#[case("mov", "SIM_motor NaN", "NaN", "a number")]
fn conversion_failures_report_the_token(
    namespace: Namespace,
    registry: JobRegistry,
    #[case] alias: &str,
    #[case] input: &str,
    #[case] token: &str,
    #[case] expected: &str,
) {
    let error = translate(&namespace, &registry, alias, input).expect_err("conversion fails");
    assert_eq!(
        error,
        TranslateError::ArgumentType {
            token: token.to_owned(),
            expected: expected.to_owned(),
        }
    );
}

#[rstest]
fn options_missing_a_value_are_rejected(namespace: Namespace, registry: JobRegistry) {
    let error = translate(&namespace, &registry, "count", "SIM_det -n").expect_err("missing value");
    assert!(matches!(error, TranslateError::ArgumentType { ref token, .. } if token == "-n"));
}

// ---------------------------------------------------------------------------
// Named options
// ---------------------------------------------------------------------------

#[rstest]
#[case("SIM_det --num=3")]
#[case("SIM_det --frames 3")]
#[case("SIM_det -x")]
fn unknown_flags_are_rejected(
    namespace: Namespace,
    registry: JobRegistry,
    #[case] input: &str,
) {
    let error = translate(&namespace, &registry, "count", input).expect_err("unknown flag");
    assert!(matches!(error, TranslateError::UnknownArgument { .. }));
}

#[rstest]
fn required_options_must_be_present(namespace: Namespace, registry: JobRegistry) {
    let error = translate(&namespace, &registry, "scan", "SIM_det -m SIM_motor 0 1")
        .expect_err("num is required");
    assert_eq!(
        error,
        TranslateError::MissingArgument {
            flag: String::from("--num")
        }
    );
}

#[rstest]
fn adaptive_scan_resolves_its_motor_option(namespace: Namespace, registry: JobRegistry) {
    let request = translate(
        &namespace,
        &registry,
        "adaptive_scan",
        "SIM_det -t SIM_det -m SIM_motor --start 0 --stop 5 --min_step 0.1 --max_step 1 --target_delta 0.05 -b",
    )
    .expect("adaptive scan translates");
    let kwargs = request.kwargs();
    assert_eq!(kwargs.get("motor"), Some(&device("SIM_motor", DeviceKind::Motor)));
    assert_eq!(kwargs.get("target_field"), Some(&ArgValue::Text(String::from("SIM_det"))));
    assert_eq!(kwargs.get("backstep"), Some(&ArgValue::Bool(true)));
    assert!(!kwargs.contains_key("threshold"));
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[rstest]
fn explicit_metadata_overrides_session_metadata(namespace: Namespace, registry: JobRegistry) {
    let store = MetadataStore::new();
    store.add_entry("sample", "Si");
    store.add_entry("operator", "ana");
    let descriptor = registry.resolve("count").expect("count");

    let request = Translator::new(&namespace)
        .with_metadata(&store)
        .translate(&descriptor, &tokens("SIM_det --md sample=Ge beam=on"))
        .expect("count translates");

    let Some(ArgValue::Map(md)) = request.kwargs().get("md") else {
        panic!("md should be a map");
    };
    assert_eq!(md.get("sample").map(String::as_str), Some("Ge"));
    assert_eq!(md.get("operator").map(String::as_str), Some("ana"));
    assert_eq!(md.get("beam").map(String::as_str), Some("on"));
}

#[rstest]
fn malformed_metadata_pairs_are_rejected(namespace: Namespace, registry: JobRegistry) {
    let error = translate(&namespace, &registry, "count", "SIM_det --md oops")
        .expect_err("pair without equals");
    assert!(matches!(error, TranslateError::ArgumentType { ref token, .. } if token == "oops"));
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[rstest]
fn every_translation_gets_a_fresh_correlation_id(namespace: Namespace, registry: JobRegistry) {
    let descriptor: Arc<JobDescriptor> = registry.resolve("count").expect("count");
    let translator = Translator::new(&namespace);
    let first = translator
        .translate(&descriptor, &tokens("SIM_det"))
        .expect("first");
    let second = translator
        .translate(&descriptor, &tokens("SIM_det"))
        .expect("second");
    assert_ne!(first.correlation_id(), second.correlation_id());
}

#[rstest]
#[case("-5", false)]
#[case("-1e3", false)]
#[case("-n", true)]
#[case("--md", true)]
#[case("-", false)]
fn negative_numbers_are_not_flags(#[case] token: &str, #[case] expected: bool) {
    assert_eq!(is_flag(token), expected);
}
