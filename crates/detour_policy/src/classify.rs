//! Syscall disposition during a diversion.

use detour_core::syscalls::{Aarch64, X86, X86_64};
use detour_core::{Arch, ArchSyscalls};
use serde::{Deserialize, Serialize};

/// What the engine does with a syscall a diverted task is entering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Arm/disarm-desched ioctl: skipped, reported as returning 0
    DeschedNoop,
    /// Skipped; the result register is left to the suppression policy
    Suppress,
    /// Reissued against the live kernel
    Execute,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeschedNoop => write!(f, "desched-noop"),
            Self::Suppress => write!(f, "suppress"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Whether `syscallno` carries namespaced identifiers that may alias live,
/// unrelated resources outside the tracee tree.
///
/// Filesystem syscalls are not listed: diversions are usually run to observe
/// their real effects.
#[must_use]
pub fn is_blacklisted<A: ArchSyscalls>(syscallno: i64) -> bool {
    A::IPC == Some(syscallno)
        || syscallno == A::KILL
        || syscallno == A::RT_SIGQUEUEINFO
        || syscallno == A::RT_TGSIGQUEUEINFO
        || syscallno == A::TGKILL
        || syscallno == A::TKILL
}

/// Decide the disposition of `syscallno` on architecture `A`
#[must_use]
pub fn classify<A: ArchSyscalls>(syscallno: i64, is_desched_event_syscall: bool) -> Disposition {
    if syscallno == A::IOCTL && is_desched_event_syscall {
        return Disposition::DeschedNoop;
    }
    if is_blacklisted::<A>(syscallno) {
        return Disposition::Suppress;
    }
    Disposition::Execute
}

/// [`classify`] with the table selected by a runtime architecture tag
#[must_use]
pub fn classify_for(arch: Arch, syscallno: i64, is_desched_event_syscall: bool) -> Disposition {
    match arch {
        Arch::X86 => classify::<X86>(syscallno, is_desched_event_syscall),
        Arch::X86_64 => classify::<X86_64>(syscallno, is_desched_event_syscall),
        Arch::Aarch64 => classify::<Aarch64>(syscallno, is_desched_event_syscall),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detour_core::syscall_number;
    use proptest::prelude::*;

    const BLACKLIST: [&str; 6] = [
        "ipc",
        "kill",
        "rt_sigqueueinfo",
        "rt_tgsigqueueinfo",
        "tgkill",
        "tkill",
    ];

    #[test]
    fn test_blacklist_suppressed_on_every_arch() {
        for arch in Arch::ALL {
            for name in BLACKLIST {
                let Some(number) = syscall_number(name, arch) else {
                    continue;
                };
                assert_eq!(
                    classify_for(arch, number, false),
                    Disposition::Suppress,
                    "{} on {}",
                    name,
                    arch
                );
            }
        }
    }

    #[test]
    fn test_desched_ioctl_is_noop() {
        assert_eq!(classify::<X86_64>(16, true), Disposition::DeschedNoop);
        assert_eq!(classify::<X86>(54, true), Disposition::DeschedNoop);
        assert_eq!(classify::<Aarch64>(29, true), Disposition::DeschedNoop);
    }

    #[test]
    fn test_plain_ioctl_executes() {
        assert_eq!(classify::<X86_64>(16, false), Disposition::Execute);
    }

    #[test]
    fn test_filesystem_syscalls_execute() {
        for name in ["write", "openat", "unlinkat", "read"] {
            let number = syscall_number(name, Arch::X86_64).unwrap();
            assert_eq!(classify::<X86_64>(number, false), Disposition::Execute);
        }
    }

    #[test]
    fn test_desched_flag_only_matters_for_ioctl() {
        // kill with a stale desched classification is still a kill
        assert_eq!(classify::<X86_64>(62, true), Disposition::Suppress);
        assert_eq!(classify::<X86_64>(1, true), Disposition::Execute);
    }

    #[test]
    fn test_unknown_numbers_execute() {
        assert_eq!(classify::<X86_64>(100_000, false), Disposition::Execute);
        // ipc is absent on x86_64, so a negative number never aliases it
        assert_eq!(classify::<X86_64>(-1, false), Disposition::Execute);
    }

    #[test]
    fn test_numbers_differ_across_arch() {
        // 62 is kill on x86_64 but ustat on x86
        assert_eq!(classify_for(Arch::X86_64, 62, false), Disposition::Suppress);
        assert_eq!(classify_for(Arch::X86, 62, false), Disposition::Execute);
        assert_eq!(classify_for(Arch::X86, 37, false), Disposition::Suppress);
    }

    proptest! {
        #[test]
        fn prop_only_blacklist_is_suppressed(number in -8i64..512, desched in any::<bool>()) {
            for arch in Arch::ALL {
                let disposition = classify_for(arch, number, desched);
                let name = detour_core::syscall_name(number, arch).name();
                let listed = name.is_some_and(|n| BLACKLIST.contains(&n));
                prop_assert_eq!(disposition == Disposition::Suppress, listed);
            }
        }
    }
}
