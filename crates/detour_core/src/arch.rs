//! Supported tracee instruction-set architectures.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Instruction-set architecture of a tracee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// 32-bit x86
    X86,
    /// x86_64
    X86_64,
    /// 64-bit ARM
    Aarch64,
}

impl Arch {
    /// All supported architectures
    pub const ALL: [Arch; 3] = [Arch::X86, Arch::X86_64, Arch::Aarch64];

    /// Architecture the tracer itself was built for, if supported
    #[must_use]
    pub const fn native() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Self::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Aarch64)
        } else {
            None
        }
    }

    /// Width of a machine word in bytes
    #[must_use]
    pub const fn word_size(&self) -> usize {
        match self {
            Self::X86 => 4,
            Self::X86_64 | Self::Aarch64 => 8,
        }
    }

    /// How far the ip has advanced past a software breakpoint when the trap
    /// is reported. `int3` traps after the instruction, `brk` before it.
    #[must_use]
    pub const fn breakpoint_ip_adjust(&self) -> u64 {
        match self {
            Self::X86 | Self::X86_64 => 1,
            Self::Aarch64 => 0,
        }
    }

    /// Canonical lowercase name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "x86" | "i386" | "i686" => Ok(Self::X86),
            "x86_64" | "amd64" => Ok(Self::X86_64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            other => Err(CoreError::InvalidArgument {
                name: "arch".to_string(),
                reason: format!("unsupported architecture '{}'", other),
            }),
        }
    }
}
