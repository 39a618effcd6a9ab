// SPDX-License-Identifier: MIT

//! The request pipeline: `resolve_active → validate → input transform →
//! assert tensor shape → open session → coerce dtypes → run → output
//! transform`, plus the `call_raw` shortcut that skips the function
//! registry entirely and drives a model session directly.

use std::collections::HashMap;
use std::path::PathBuf;

use inferd_core::package::PackageId;
use inferd_core::{DType, DaemonError, Tensor};
use inferd_storage::{CatalogSession, Layout, ResultStore};
use inferd_handler_api::TransformOutput;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::registry::FunctionRegistry;
use inferd_runtime::SessionCache;
use inferd_runtime::InferenceEngine;

/// Checked before each pipeline step below, per spec.md §9's cooperative
/// cancellation design note: a cancelled-but-already-dispatched job can't be
/// preempted mid-step on this runtime, so the pipeline instead bails out at
/// the next step boundary.
fn check_cancelled(cancel: &CancellationToken) -> Result<(), DaemonError> {
    if cancel.is_cancelled() {
        Err(DaemonError::JobInterrupted)
    } else {
        Ok(())
    }
}

/// Runs a handler-supplied transform, catching a panic the same way
/// `loader.rs` catches one from a module's entry point: third-party code we
/// don't control, called in-process, must never take the worker down with
/// it. Both an `Err(HandlerError)` and a panic become `PackageError`, per
/// spec §4.7 step 3 / §7's policy.
fn call_transform<T>(f: impl FnOnce() -> Result<T, inferd_handler_api::HandlerError>) -> Result<T, DaemonError> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DaemonError::PackageError(inferd_core::error::truncate(e.to_string(), 500))),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler transform panicked".to_string());
            Err(DaemonError::PackageError(inferd_core::error::truncate(msg, 500)))
        }
    }
}

/// Glues the function registry, the catalog, and a session cache together.
/// Stateless beyond the cache — every call takes the worker's own catalog
/// session, matching the per-worker transactional discipline the rest of
/// the engine follows.
pub struct Pipeline<E: InferenceEngine> {
    layout: Layout,
    registry: std::sync::Arc<FunctionRegistry>,
    cache: SessionCache<E>,
    results: ResultStore,
}

impl<E: InferenceEngine> Pipeline<E> {
    pub fn new(layout: Layout, registry: std::sync::Arc<FunctionRegistry>, cache: SessionCache<E>) -> Self {
        let results = ResultStore::new(layout.clone());
        Self { layout, registry, cache, results }
    }

    fn model_path(&self, session: &CatalogSession<'_>, package_id: PackageId, install_path: &str) -> Result<PathBuf, DaemonError> {
        let package = session
            .package_by_id(package_id)
            .ok_or_else(|| DaemonError::MissingEntry(format!("package {package_id}")))?;
        Ok(self.layout.package_install_dir(&package.install_path).join(install_path))
    }

    /// Step 1: resolve the active package for `pkg_name`, then the
    /// registration for `fn_name` under it.
    fn resolve_active(
        &self,
        session: &CatalogSession<'_>,
        pkg_name: &str,
        fn_name: &str,
    ) -> Result<std::sync::Arc<crate::registry::FunctionRegistration>, DaemonError> {
        let active = session.package_active(pkg_name).ok_or_else(|| DaemonError::MissingFunction {
            package: pkg_name.to_string(),
            function: fn_name.to_string(),
        })?;
        self.registry
            .lookup(active.package_id, fn_name)
            .ok_or_else(|| DaemonError::MissingFunction { package: pkg_name.to_string(), function: fn_name.to_string() })
    }

    pub fn call(
        &self,
        session: &CatalogSession<'_>,
        pkg_name: &str,
        fn_name: &str,
        inputs: HashMap<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, DaemonError> {
        check_cancelled(cancel)?;
        let handler = self.resolve_active(session, pkg_name, fn_name)?;

        if let Some(schema) = &handler.input_schema {
            validate_against_schema(schema, &inputs)?;
        }

        check_cancelled(cancel)?;
        let transformed = call_transform(|| handler.input_transform.call(inputs))?;
        // Step 4 ("assert every value is a tensor") is enforced by
        // `TransformOutput`'s own shape — there is no third variant that
        // could carry a non-tensor value here.
        let (mapping, context) = match transformed {
            TransformOutput::Mapping(m) => (m, None),
            TransformOutput::WithContext(m, ctx) => (m, Some(ctx)),
        };

        let model = session.model(handler.package_id, &handler.model_name)?;
        let path = self.model_path(session, handler.package_id, &model.install_path)?;
        let weight = std::fs::metadata(&path).map(|m| m.len() as usize).unwrap_or(0);
        let model_session = self.cache.get_or_open(&path, weight)?;

        check_cancelled(cancel)?;
        let coerced = coerce_inputs(mapping, model_session.inputs());
        let output_names: Vec<String> = model_session.outputs().to_vec();
        let outputs = model_session.run(&output_names, coerced)?;

        check_cancelled(cancel)?;
        call_transform(|| handler.output_transform.call(outputs, context, &self.results))
    }

    /// The `call_raw` shortcut: no function registry, no transforms — the
    /// caller hands tensors in and gets tensors back.
    pub fn call_raw(
        &self,
        session: &CatalogSession<'_>,
        pkg_name: &str,
        model_name: &str,
        inputs: HashMap<String, Tensor>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Tensor>, DaemonError> {
        check_cancelled(cancel)?;
        let active = session.package_active(pkg_name).ok_or_else(|| DaemonError::MissingFunction {
            package: pkg_name.to_string(),
            function: model_name.to_string(),
        })?;
        let model = session.model(active.package_id, model_name)?;
        let path = self.model_path(session, active.package_id, &model.install_path)?;
        let weight = std::fs::metadata(&path).map(|m| m.len() as usize).unwrap_or(0);
        let model_session = self.cache.get_or_open(&path, weight)?;

        check_cancelled(cancel)?;
        let coerced = coerce_inputs(inputs, model_session.inputs());
        let output_names: Vec<String> = model_session.outputs().to_vec();
        model_session.run(&output_names, coerced)
    }
}

/// Minimal declarative validator: `{"required": [...], "fields": {"name":
/// {"type": "tensor"}}}`. Fields typed `"tensor"` must decode as a
/// `WireTensor`; this is also where inputs get coerced into in-memory
/// tensors — the daemon confirms the value is a real tensor before the
/// handler ever sees it.
fn validate_against_schema(schema: &Value, inputs: &HashMap<String, Value>) -> Result<(), DaemonError> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            if !inputs.contains_key(name) {
                return Err(DaemonError::Validation(format!("missing required input `{name}`")));
            }
        }
    }
    if let Some(fields) = schema.get("fields").and_then(Value::as_object) {
        for (name, decl) in fields {
            let declared_tensor = decl.get("type").and_then(Value::as_str) == Some("tensor");
            if !declared_tensor {
                continue;
            }
            let Some(value) = inputs.get(name) else { continue };
            let wire: inferd_core::WireTensor = serde_json::from_value(value.clone())
                .map_err(|e| DaemonError::Validation(format!("input `{name}` is not a tensor: {e}")))?;
            Tensor::decode(&wire)
                .map_err(|e| DaemonError::Validation(format!("input `{name}` is not a tensor: {e}")))?;
        }
    }
    Ok(())
}

/// Step 6: coerce each input's dtype to what the session declares for that
/// name, where the tag is one this daemon understands; pass through
/// unchanged otherwise.
fn coerce_inputs(
    mapping: HashMap<String, Tensor>,
    declared: &[(String, String)],
) -> HashMap<String, Tensor> {
    mapping
        .into_iter()
        .map(|(name, tensor)| {
            let target = declared
                .iter()
                .find(|(n, _)| *n == name)
                .and_then(|(_, tag)| dtype_from_tag(tag));
            let tensor = match target {
                Some(target) if target != tensor.dtype => cast_tensor(&tensor, target).unwrap_or(tensor),
                _ => tensor,
            };
            (name, tensor)
        })
        .collect()
}

fn dtype_from_tag(tag: &str) -> Option<DType> {
    let inner = tag.strip_prefix("tensor(")?.strip_suffix(')')?;
    Some(match inner {
        "float" | "float32" => DType::Float32,
        "double" | "float64" => DType::Float64,
        "float16" | "half" => DType::Float16,
        "int8" => DType::Int8,
        "int16" => DType::Int16,
        "int32" => DType::Int32,
        "int64" => DType::Int64,
        "uint8" => DType::Uint8,
        "uint16" => DType::Uint16,
        "uint32" => DType::Uint32,
        "uint64" => DType::Uint64,
        _ => return None,
    })
}

/// Elementwise cast through an `f64` intermediate. Lossy for the extremes of
/// 64-bit integer types, acceptable here since the daemon never interprets
/// tensor contents itself — only the inference engine and the handler code
/// do, and both see the coerced dtype consistently.
fn cast_tensor(tensor: &Tensor, target: DType) -> Result<Tensor, DaemonError> {
    let values = read_values(tensor)?;
    let data = write_values(&values, target);
    Tensor::new(target, tensor.shape.clone(), data)
}

fn le_bytes<const N: usize>(chunk: &[u8]) -> Result<[u8; N], DaemonError> {
    chunk
        .try_into()
        .map_err(|_| DaemonError::InternalError("tensor chunk size mismatch during dtype coercion".into()))
}

fn read_values(tensor: &Tensor) -> Result<Vec<f64>, DaemonError> {
    let size = tensor.dtype.item_size();
    tensor
        .data
        .chunks_exact(size)
        .map(|chunk| -> Result<f64, DaemonError> {
            Ok(match tensor.dtype {
                DType::Int8 => chunk[0] as i8 as f64,
                DType::Uint8 => chunk[0] as f64,
                DType::Int16 => i16::from_le_bytes(le_bytes(chunk)?) as f64,
                DType::Uint16 => u16::from_le_bytes(le_bytes(chunk)?) as f64,
                DType::Int32 => i32::from_le_bytes(le_bytes(chunk)?) as f64,
                DType::Uint32 => u32::from_le_bytes(le_bytes(chunk)?) as f64,
                DType::Int64 => i64::from_le_bytes(le_bytes(chunk)?) as f64,
                DType::Uint64 => u64::from_le_bytes(le_bytes(chunk)?) as f64,
                DType::Float16 => {
                    return Err(DaemonError::InvalidTensor("float16 dtype coercion is unsupported".into()))
                }
                DType::Float32 => f32::from_le_bytes(le_bytes(chunk)?) as f64,
                DType::Float64 => f64::from_le_bytes(le_bytes(chunk)?),
                DType::Float128 => {
                    return Err(DaemonError::InvalidTensor("float128 dtype coercion is unsupported".into()))
                }
            })
        })
        .collect()
}

fn write_values(values: &[f64], target: DType) -> Vec<u8> {
    let mut data = Vec::with_capacity(values.len() * target.item_size());
    for &v in values {
        match target {
            DType::Int8 => data.push(v as i8 as u8),
            DType::Uint8 => data.push(v as u8),
            DType::Int16 => data.extend_from_slice(&(v as i16).to_le_bytes()),
            DType::Uint16 => data.extend_from_slice(&(v as u16).to_le_bytes()),
            DType::Int32 => data.extend_from_slice(&(v as i32).to_le_bytes()),
            DType::Uint32 => data.extend_from_slice(&(v as u32).to_le_bytes()),
            DType::Int64 => data.extend_from_slice(&(v as i64).to_le_bytes()),
            DType::Uint64 => data.extend_from_slice(&(v as u64).to_le_bytes()),
            DType::Float32 => data.extend_from_slice(&(v as f32).to_le_bytes()),
            DType::Float64 => data.extend_from_slice(&v.to_le_bytes()),
            DType::Float16 | DType::Float128 => unreachable!("filtered out by read_values"),
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferd_core::package::ModelKind;
    use inferd_handler_api::{HandlerError, InputTransform, OutputTransform};
    use inferd_storage::Catalog;
    use std::time::Duration;

    struct PassThroughInput;
    impl InputTransform for PassThroughInput {
        fn call(&self, inputs: HashMap<String, Value>) -> Result<TransformOutput, HandlerError> {
            let wire: inferd_core::WireTensor = serde_json::from_value(inputs.get("x").unwrap().clone())
                .map_err(|e| HandlerError::new(e.to_string()))?;
            let tensor = Tensor::decode(&wire).map_err(|e| HandlerError::new(e.to_string()))?;
            let mut map = HashMap::new();
            map.insert("x".to_string(), tensor);
            Ok(TransformOutput::Mapping(map))
        }
    }

    struct PassThroughOutput;
    impl OutputTransform for PassThroughOutput {
        fn call(
            &self,
            outputs: HashMap<String, Tensor>,
            _context: Option<Value>,
            _results: &dyn inferd_handler_api::ResultWriter,
        ) -> Result<Value, HandlerError> {
            let tensor = outputs.get("y").ok_or_else(|| HandlerError::new("missing y"))?;
            Ok(serde_json::to_value(tensor.encode()).unwrap())
        }
    }

    struct ArtifactOutput;
    impl OutputTransform for ArtifactOutput {
        fn call(
            &self,
            _outputs: HashMap<String, Tensor>,
            _context: Option<Value>,
            results: &dyn inferd_handler_api::ResultWriter,
        ) -> Result<Value, HandlerError> {
            let id = results.put(b"artifact bytes")?;
            Ok(serde_json::json!({ "file_ref": id }))
        }
    }

    fn setup() -> (Catalog, Layout, std::sync::Arc<FunctionRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());
        let catalog = Catalog::open(layout.catalog_path()).expect("open catalog");
        let registry = std::sync::Arc::new(FunctionRegistry::new());
        (catalog, layout, registry, dir)
    }

    #[test]
    fn call_runs_through_identity_model() {
        let (catalog, layout, registry, _dir) = setup();
        let mut session = catalog.session();
        let package = session.insert_package("echo", Some("1.0"), None, "install-1").expect("insert package");
        session.insert_model(package.package_id, "y", ModelKind::Onnx, "y.onnx").expect("insert model");
        session.set_active(package.package_id, true).expect("activate");

        std::fs::create_dir_all(layout.package_install_dir("install-1")).expect("mkdir");
        std::fs::write(layout.package_install_dir("install-1").join("y.onnx"), b"fake").expect("write model file");

        registry.register(crate::registry::FunctionRegistration {
            package_id: package.package_id,
            function_name: "identity".to_string(),
            model_name: "y".to_string(),
            input_transform: Box::new(PassThroughInput),
            output_transform: Box::new(PassThroughOutput),
            input_schema: None,
        });

        let cache = SessionCache::new(inferd_runtime::fake::FakeEngine::new(), Duration::from_secs(30));
        let pipeline = Pipeline::new(layout, registry, cache);

        let tensor = Tensor::new(DType::Float32, vec![1], vec![0, 0, 128, 63]).expect("tensor");
        let mut inputs = HashMap::new();
        inputs.insert("x".to_string(), serde_json::to_value(tensor.encode()).unwrap());

        let result = pipeline.call(&session, "echo", "identity", inputs, &CancellationToken::new()).expect("call");
        let wire: inferd_core::WireTensor = serde_json::from_value(result).expect("wire tensor result");
        let decoded = Tensor::decode(&wire).expect("decode result");
        assert_eq!(decoded, tensor);
    }

    #[test]
    fn output_transform_writes_an_artifact_through_the_result_store() {
        let (catalog, layout, registry, _dir) = setup();
        let mut session = catalog.session();
        let package = session.insert_package("echo", Some("1.0"), None, "install-1").expect("insert package");
        session.insert_model(package.package_id, "y", ModelKind::Onnx, "y.onnx").expect("insert model");
        session.set_active(package.package_id, true).expect("activate");

        std::fs::create_dir_all(layout.package_install_dir("install-1")).expect("mkdir");
        std::fs::write(layout.package_install_dir("install-1").join("y.onnx"), b"fake").expect("write model file");

        registry.register(crate::registry::FunctionRegistration {
            package_id: package.package_id,
            function_name: "identity".to_string(),
            model_name: "y".to_string(),
            input_transform: Box::new(PassThroughInput),
            output_transform: Box::new(ArtifactOutput),
            input_schema: None,
        });

        let cache = SessionCache::new(inferd_runtime::fake::FakeEngine::new(), Duration::from_secs(30));
        let pipeline = Pipeline::new(layout.clone(), registry, cache);

        let tensor = Tensor::new(DType::Float32, vec![1], vec![0, 0, 128, 63]).expect("tensor");
        let mut inputs = HashMap::new();
        inputs.insert("x".to_string(), serde_json::to_value(tensor.encode()).unwrap());

        let result = pipeline.call(&session, "echo", "identity", inputs, &CancellationToken::new()).expect("call");
        let file_ref = result["file_ref"].as_str().expect("file_ref present").to_string();

        let results = inferd_storage::ResultStore::new(layout);
        assert_eq!(results.read(&file_ref).expect("read artifact"), b"artifact bytes");
    }

    #[test]
    fn call_on_inactive_package_is_missing_function() {
        let (catalog, layout, registry, _dir) = setup();
        let session = catalog.session();
        let cache = SessionCache::new(inferd_runtime::fake::FakeEngine::new(), Duration::from_secs(30));
        let pipeline = Pipeline::new(layout, registry, cache);
        let err = pipeline.call(&session, "ghost", "identity", HashMap::new(), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, DaemonError::MissingFunction { .. }));
    }

    #[test]
    fn dtype_coercion_casts_int32_to_float32() {
        let tensor = Tensor::new(DType::Int32, vec![1], 7i32.to_le_bytes().to_vec()).expect("tensor");
        let cast = cast_tensor(&tensor, DType::Float32).expect("cast");
        assert_eq!(cast.dtype, DType::Float32);
        assert_eq!(f32::from_le_bytes(cast.data.try_into().unwrap()), 7.0f32);
    }
}
