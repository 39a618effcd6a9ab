use super::*;

#[test]
fn package_row_serializes_optional_fields() {
    let row = PackageRow {
        package_id: 1,
        name: "echo".into(),
        version: None,
        human_name: None,
        active: true,
        install_path: "abc-123".into(),
    };
    let v = serde_json::to_value(&row).unwrap();
    assert!(v["version"].is_null());
    assert_eq!(v["active"], true);
}

#[test]
fn model_kind_round_trips_as_lowercase() {
    let v = serde_json::to_value(ModelKind::Onnx).unwrap();
    assert_eq!(v, "onnx");
    let back: ModelKind = serde_json::from_value(v).unwrap();
    assert_eq!(back, ModelKind::Onnx);
}
