// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Management
//!
//! Standardized Unix exit codes following BSD `sysexits.h` conventions,
//! mapped from the failure classes the server binary can end with.

use std::fmt;

/// Exit codes following Unix conventions (BSD sysexits.h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination (0)
    #[default]
    Success = 0,

    /// General runtime error (1)
    Error = 1,

    /// Command line usage error (64)
    UsageError = 64,

    /// Required service not reachable at startup (69)
    Unavailable = 69,

    /// Internal software error (70)
    Software = 70,

    /// Configuration error (78) - unknown keys, malformed values, missing
    /// required settings
    ConfigError = 78,

    /// Terminated by SIGINT (130)
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Terminates the process with this code.
    pub fn exit(self) -> ! {
        std::process::exit(self.as_i32())
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Success => "success",
            ExitCode::Error => "error",
            ExitCode::UsageError => "usage error",
            ExitCode::Unavailable => "service unavailable",
            ExitCode::Software => "internal software error",
            ExitCode::ConfigError => "configuration error",
            ExitCode::Interrupted => "interrupted",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_sysexits() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 64);
        assert_eq!(ExitCode::ConfigError.as_i32(), 78);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }
}
