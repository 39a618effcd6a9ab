// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! inferd-net: the content-addressed downloader — resumable HTTP GET,
//! SHA-256 verification, a per-hash single-flight lock. Progress is
//! reported through [`ProgressSink`] so this crate never depends on the
//! scheduler that owns the job it's downloading on behalf of.

pub mod download;
pub mod locks;

pub use download::{download, ProgressSink};
pub use locks::DownloadLocks;
