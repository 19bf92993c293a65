//! Per-architecture syscall tables.
//!
//! Each supported architecture is a zero-sized type implementing
//! [`ArchSyscalls`]. Code that needs per-architecture constants is written
//! generically over `A: ArchSyscalls` and selected at runtime with a `match`
//! on [`Arch`].

pub mod aarch64;
pub mod x86;
pub mod x86_64;

pub use aarch64::Aarch64;
pub use x86::X86;
pub use x86_64::X86_64;

use crate::arch::Arch;
use serde::Serialize;

/// Syscall numbers one architecture defines
pub trait ArchSyscalls {
    /// Architecture tag this table belongs to
    const ARCH: Arch;

    /// `ioctl`
    const IOCTL: i64;
    /// `ipc` multiplexer, only present on some architectures
    const IPC: Option<i64>;
    /// `kill`
    const KILL: i64;
    /// `rt_sigqueueinfo`
    const RT_SIGQUEUEINFO: i64;
    /// `rt_tgsigqueueinfo`
    const RT_TGSIGQUEUEINFO: i64;
    /// `tgkill`
    const TGKILL: i64;
    /// `tkill`
    const TKILL: i64;

    /// Name of a syscall number, if the table knows it
    fn name(number: i64) -> Option<&'static str>;

    /// Number of a named syscall, if this architecture has it
    fn number(name: &str) -> Option<i64>;

    /// Every (number, name) pair, sorted by number
    fn entries() -> &'static [(i64, &'static str)];
}

/// Symbolic identity of a raw syscall number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyscallId {
    /// Listed in the architecture's table
    Known(&'static str),
    /// Not listed; still a valid syscall number to issue
    Other(i64),
}

impl SyscallId {
    /// Name, if known
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Known(name) => Some(name),
            Self::Other(_) => None,
        }
    }
}

impl std::fmt::Display for SyscallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(name) => f.write_str(name),
            Self::Other(number) => write!(f, "<unknown-syscall-{}>", number),
        }
    }
}

/// Identify `number` on `arch`
#[must_use]
pub fn syscall_name(number: i64, arch: Arch) -> SyscallId {
    let name = match arch {
        Arch::X86 => X86::name(number),
        Arch::X86_64 => X86_64::name(number),
        Arch::Aarch64 => Aarch64::name(number),
    };
    name.map_or(SyscallId::Other(number), SyscallId::Known)
}

/// Number of the syscall called `name` on `arch`
#[must_use]
pub fn syscall_number(name: &str, arch: Arch) -> Option<i64> {
    match arch {
        Arch::X86 => X86::number(name),
        Arch::X86_64 => X86_64::number(name),
        Arch::Aarch64 => Aarch64::number(name),
    }
}

/// Full table for `arch`
#[must_use]
pub fn syscall_entries(arch: Arch) -> &'static [(i64, &'static str)] {
    match arch {
        Arch::X86 => X86::entries(),
        Arch::X86_64 => X86_64::entries(),
        Arch::Aarch64 => Aarch64::entries(),
    }
}

pub(crate) fn lookup_name(entries: &'static [(i64, &'static str)], number: i64) -> Option<&'static str> {
    entries
        .binary_search_by_key(&number, |&(n, _)| n)
        .ok()
        .map(|index| entries[index].1)
}

pub(crate) fn lookup_number(entries: &[(i64, &str)], name: &str) -> Option<i64> {
    entries.iter().find(|&&(_, n)| n == name).map(|&(number, _)| number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy_constants<A: ArchSyscalls>() -> Vec<(&'static str, Option<i64>)> {
        vec![
            ("ioctl", Some(A::IOCTL)),
            ("ipc", A::IPC),
            ("kill", Some(A::KILL)),
            ("rt_sigqueueinfo", Some(A::RT_SIGQUEUEINFO)),
            ("rt_tgsigqueueinfo", Some(A::RT_TGSIGQUEUEINFO)),
            ("tgkill", Some(A::TGKILL)),
            ("tkill", Some(A::TKILL)),
        ]
    }

    fn check_constants_match_table<A: ArchSyscalls>() {
        for (name, number) in policy_constants::<A>() {
            assert_eq!(A::number(name), number, "{} on {}", name, A::ARCH);
            if let Some(number) = number {
                assert_eq!(A::name(number), Some(name));
            }
        }
    }

    #[test]
    fn test_constants_match_tables() {
        check_constants_match_table::<X86>();
        check_constants_match_table::<X86_64>();
        check_constants_match_table::<Aarch64>();
    }

    #[test]
    fn test_tables_sorted_and_unique() {
        for arch in Arch::ALL {
            let entries = syscall_entries(arch);
            assert!(entries.windows(2).all(|w| w[0].0 < w[1].0), "{} unsorted", arch);
            let mut names: Vec<_> = entries.iter().map(|&(_, n)| n).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), entries.len(), "{} has duplicate names", arch);
        }
    }

    #[test]
    fn test_known_numbers() {
        assert_eq!(syscall_name(1, Arch::X86_64), SyscallId::Known("write"));
        assert_eq!(syscall_name(4, Arch::X86), SyscallId::Known("write"));
        assert_eq!(syscall_name(64, Arch::Aarch64), SyscallId::Known("write"));
        assert_eq!(syscall_name(62, Arch::X86_64), SyscallId::Known("kill"));
        assert_eq!(syscall_name(117, Arch::X86), SyscallId::Known("ipc"));
    }

    #[test]
    fn test_unknown_number_is_other() {
        assert_eq!(syscall_name(9999, Arch::X86_64), SyscallId::Other(9999));
        assert_eq!(syscall_name(-1, Arch::X86), SyscallId::Other(-1));
        assert_eq!(
            syscall_name(9999, Arch::X86_64).to_string(),
            "<unknown-syscall-9999>"
        );
    }

    #[test]
    fn test_ipc_absent_on_64bit() {
        assert_eq!(X86_64::IPC, None);
        assert_eq!(Aarch64::IPC, None);
        assert_eq!(syscall_number("ipc", Arch::X86_64), None);
    }

    proptest! {
        #[test]
        fn prop_name_lookup_inverts_number_lookup(number in -64i64..600) {
            for arch in Arch::ALL {
                if let SyscallId::Known(name) = syscall_name(number, arch) {
                    prop_assert_eq!(syscall_number(name, arch), Some(number));
                }
            }
        }
    }
}
