// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! inferd-runtime: the inference engine adapter boundary.
//! The real tensor runtime (ONNX-equivalent) is explicitly out of scope; this
//! crate defines the `Session`/`InferenceEngine` seam a real binding would
//! implement, a TTL+weight session cache, and a reference in-memory
//! implementation used throughout the test suite.

pub mod cache;
pub mod fake;
pub mod session;

pub use cache::SessionCache;
pub use fake::IdentitySession;
pub use session::{InferenceEngine, Session};
