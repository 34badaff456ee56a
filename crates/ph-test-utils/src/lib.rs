// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Package Harbor Test Utilities
//!
//! - [`TestLogger`] gives each test its own log file; passing tests print one
//!   line, failing tests print where the log lives.
//! - [`Suite`] is the end-to-end harness: an explicit table of named cases,
//!   an optional typed setup callback and a reverse-order [`CleanupStack`].

pub mod logging;
pub mod suite;

pub use logging::{unique_log_path, TestLogError, TestLogger};
pub use suite::{
    CaseContext, CaseFn, CaseFuture, CaseReport, CleanupStack, SetupFn, Suite, SuiteConfig,
    SuiteReport,
};
