//! Syscall table lookups and policy previews.

use color_eyre::eyre::{eyre, Result};
use detour_core::{syscall_entries, syscall_name, syscall_number, Arch, SyscallId};
use detour_policy::{classify_for, Disposition};
use serde::Serialize;

/// Table rows matching the query, as `(number, name)`
///
/// # Errors
///
/// Returns error if a requested name is not in the table
pub fn lookup(arch: Arch, number: Option<i64>, name: Option<&str>) -> Result<Vec<(i64, SyscallId)>> {
    if let Some(number) = number {
        return Ok(vec![(number, syscall_name(number, arch))]);
    }
    if let Some(name) = name {
        let number = syscall_number(name, arch)
            .ok_or_else(|| eyre!("{} has no syscall named {}", arch, name))?;
        return Ok(vec![(number, syscall_name(number, arch))]);
    }
    Ok(syscall_entries(arch)
        .iter()
        .map(|&(number, name)| (number, SyscallId::Known(name)))
        .collect())
}

/// What a diversion would do with one syscall
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Architecture
    pub arch: Arch,
    /// Raw number
    pub syscallno: i64,
    /// Symbolic name
    pub syscall: SyscallId,
    /// Disposition
    pub disposition: Disposition,
}

/// Classify `syscall`, given by name or number, on `arch`
///
/// # Errors
///
/// Returns error if `syscall` is neither a number nor a name in the table
pub fn classify(arch: Arch, syscall: &str, desched: bool) -> Result<Classification> {
    let syscallno = match syscall.parse::<i64>() {
        Ok(number) => number,
        Err(_) => syscall_number(syscall, arch)
            .ok_or_else(|| eyre!("{} has no syscall named {}", arch, syscall))?,
    };
    Ok(Classification {
        arch,
        syscallno,
        syscall: syscall_name(syscallno, arch),
        disposition: classify_for(arch, syscallno, desched),
    })
}
