// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! inferd-core: shared types for the inference daemon — ids, clocks, the
//! error taxonomy, the tensor codec, the job state machine, and
//! catalog/manifest shapes. Every other crate in the workspace depends on
//! this one; it depends on nothing else in the workspace.

pub mod macros;

pub mod clock;
pub mod error;
pub mod id;
pub mod job;
pub mod manifest;
pub mod package;
pub mod tensor;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{DaemonError, ErrorResponse};
pub use job::{Job, JobError, JobId, JobState, ProgressExtras, RequestInfo};
pub use manifest::{Manifest, ModelEntry};
pub use package::{ModelId, ModelKind, ModelRow, PackageId, PackageRow};
pub use tensor::{DType, Tensor, WireTensor};
