// SPDX-License-Identifier: MIT

//! The contract a package's handler module compiles against.
//!
//! A handler module is a `cdylib` loaded at runtime (see
//! `inferd-engine::loader`). It exposes one symbol,
//! [`ENTRY_POINT_SYMBOL`], with the signature of [`EntryPoint`]: given a
//! `&mut dyn Registrar`, it calls [`Registrar::register`] once per function
//! it wants to expose, handing the daemon a closure-shaped way to describe
//! its I/O contract at load time.
//!
//! This crate is intentionally tiny and depends on nothing but
//! `inferd-core`: both the daemon and every handler module link against it,
//! so it is the one place a breaking change ripples through every package
//! on disk.

use std::collections::HashMap;

use inferd_core::Tensor;
use serde_json::Value;

/// An error raised by handler code. Not a [`inferd_core::DaemonError`]
/// itself — the loader and pipeline wrap these as `PackageError` with the
/// message preserved, per spec §7's policy that handler-raised errors that
/// aren't daemon errors get wrapped rather than propagated unchanged.
#[derive(Debug, Clone)]
pub struct HandlerError(pub String);

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HandlerError {}

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        HandlerError(msg.into())
    }
}

/// What an input transform may hand back: either a bare tensor mapping, or
/// a mapping plus an opaque context value forwarded to the output
/// transform. Any other shape is a `PackageError` at the call site.
pub enum TransformOutput {
    Mapping(HashMap<String, Tensor>),
    WithContext(HashMap<String, Tensor>, Value),
}

pub trait InputTransform: Send + Sync {
    fn call(&self, inputs: HashMap<String, Value>) -> Result<TransformOutput, HandlerError>;
}

/// Output transforms may be registered with arity 1 (outputs only) or arity
/// 2 (outputs plus the context the input transform produced); the registry
/// records which was given and the pipeline calls accordingly.
///
/// The `results` handle is the daemon's result-file store: a transform
/// producing a large artifact (an image, a compressed array) writes it
/// through `results.put(bytes)` and returns the resulting id as a
/// `{"file_ref": <id>}` sentinel rather than inlining the bytes.
pub trait OutputTransform: Send + Sync {
    fn call(
        &self,
        outputs: HashMap<String, Tensor>,
        context: Option<Value>,
        results: &dyn ResultWriter,
    ) -> Result<Value, HandlerError>;
}

/// The daemon's result-file store, as seen by handler code: write bytes,
/// get back an id `/result/<id>` streams them from. Implemented by
/// `inferd-storage::ResultStore`; kept as a trait here so this crate's
/// dependency stays limited to `inferd-core`.
pub trait ResultWriter: Send + Sync {
    fn put(&self, bytes: &[u8]) -> Result<String, HandlerError>;
}

/// Declarative input validator a handler may attach to a function. Kept
/// opaque here (a JSON schema document); the pipeline interprets it and
/// coerces fields declared as `"tensor"` into in-memory tensors per spec
/// §4.7 step 2.
pub type InputSchema = Value;

/// The daemon-provided API a loading handler module registers functions
/// through. Implemented by `inferd-engine::loader::LoadingRegistrar`.
pub trait Registrar {
    fn register(
        &mut self,
        fn_name: &str,
        input_transform: Box<dyn InputTransform>,
        output_transform: Box<dyn OutputTransform>,
        model_name: Option<&str>,
        input_schema: Option<InputSchema>,
    );
}

/// The symbol name every handler `cdylib` must export.
pub const ENTRY_POINT_SYMBOL: &[u8] = b"inferd_register\0";

/// The signature `libloading` resolves `ENTRY_POINT_SYMBOL` as. Not
/// `#[repr(C)]`-stable across differing `rustc` versions; handler modules
/// must be built with the toolchain the daemon was built with, the same
/// constraint any same-process Rust plugin ABI carries.
pub type EntryPoint = unsafe extern "C" fn(registrar: &mut dyn Registrar) -> Result<(), HandlerError>;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
