// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Module
//!
//! Process-level concerns that sit outside the application layers:
//!
//! - **Logging installation** - tracing subscriber with env-filter and
//!   text/json output ([`logger`])
//! - **Graceful shutdown** - cancellation tokens, signal wiring, and a
//!   grace-period coordinator ([`shutdown`])
//! - **Exit codes** - BSD `sysexits.h`-style process exit mapping
//!   ([`exit_code`])
//!
//! The bootstrap crate may be used by the binary's composition root; the
//! domain and infrastructure layers never depend on it. The cancellation
//! token here signals *process* shutdown - per-run cancellation inside the
//! pipeline uses the domain's own flag, fed from the durable catalog signal.

pub mod exit_code;
pub mod logger;
pub mod shutdown;

pub use exit_code::ExitCode;
pub use logger::{init_tracing, LogFormat};
pub use shutdown::{CancellationToken, ShutdownCoordinator};
