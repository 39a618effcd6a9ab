// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! inferd-engine: the scheduler, the archive installer, the handler loader,
//! the function registry, and the request pipeline that glues them
//! together. This is the workspace's largest crate, carrying most of the
//! daemon's core logic: job scheduling, package lifecycle management, and
//! the request pipeline plus function registry.

pub mod installer;
pub mod loader;
pub mod pipeline;
pub mod registry;
pub mod remote_index;
pub mod scheduler;

pub use installer::{InstallOptions, InstallOutcome, Installer};
pub use loader::{Loader, MODULE_FILE_NAME};
pub use pipeline::Pipeline;
pub use registry::{FunctionRegistration, FunctionRegistry};
pub use remote_index::RemoteIndexEntry;
pub use scheduler::{InstallSource, JobHandle, JobRequest, PackageTarget, Scheduler, SchedulerConfig};
