use super::*;

#[yare::parameterized(
    validation = { DaemonError::Validation("bad input".into()), 400, "Validation Error" },
    internal   = { DaemonError::InternalError("boom".into()),   500, "Internal Error" },
    overloaded = { DaemonError::Overloaded,                     503, "Overloaded" },
)]
fn status_code_and_name_by_variant(err: DaemonError, expected_status: u16, expected_name: &str) {
    assert_eq!(err.status_code(), expected_status);
    assert_eq!(err.name(), expected_name);
}

#[test]
fn hash_mismatch_carries_data() {
    let err = DaemonError::HashMismatch { expected: "abc".into(), actual: "def".into() };
    let data = err.data().expect("hash mismatch has data");
    assert_eq!(data["expected"], "abc");
    assert_eq!(data["actual"], "def");
}

#[test]
fn to_wire_serializes_without_data_when_absent() {
    let wire = DaemonError::NoSuchJob("abc123".into()).to_wire();
    let v = serde_json::to_value(&wire).unwrap();
    assert!(v.get("data").is_none());
    assert_eq!(v["status_code"], 400);
}

#[test]
fn truncate_short_string_is_unchanged() {
    assert_eq!(truncate("hello", 10), "hello");
}

#[test]
fn truncate_long_string_adds_ellipsis() {
    let s = "a".repeat(100);
    let out = truncate(&s, 10);
    assert_eq!(out.len(), 10);
    assert!(out.ends_with("..."));
}
