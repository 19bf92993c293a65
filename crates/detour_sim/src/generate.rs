//! Seeded random stop scripts.

use crate::seed::SimSeed;
use crate::stop::{SimStop, SyscallRef};
use detour_core::{syscall_entries, Arch, SigInfo, Signal};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Names of the signal-sending syscalls a diverted tracee may try, by
/// architecture availability.
const SIGNAL_SENDERS: [&str; 6] = [
    "ipc",
    "kill",
    "rt_sigqueueinfo",
    "rt_tgsigqueueinfo",
    "tgkill",
    "tkill",
];

const STOP_SIGNALS: [Signal; 4] = [
    Signal::SIGSEGV,
    Signal::SIGUSR1,
    Signal::SIGTRAP,
    Signal::SIGCHLD,
];

/// Generates plausible stop sequences for a diverted tracee
pub struct ScriptGenerator {
    arch: Arch,
    rng: ChaCha8Rng,
}

impl ScriptGenerator {
    /// Generator for `arch` seeded by `seed`
    #[must_use]
    pub fn new(arch: Arch, seed: &SimSeed) -> Self {
        Self {
            arch,
            rng: seed.rng(),
        }
    }

    /// A script of `len` stops followed by an exit
    pub fn script(&mut self, len: usize) -> Vec<SimStop> {
        let mut stops: Vec<SimStop> = (0..len).map(|_| self.stop()).collect();
        stops.push(SimStop::Exit);
        stops
    }

    /// One non-exit stop
    pub fn stop(&mut self) -> SimStop {
        match self.rng.gen_range(0..10) {
            0 | 1 => self.signal_sender(),
            2 => SimStop::desched_ioctl(self.args()),
            3 | 4 => {
                let signo = STOP_SIGNALS[self.rng.gen_range(0..STOP_SIGNALS.len())];
                SimStop::signal(SigInfo::new(signo, self.rng.gen_range(0..4)))
            }
            _ => self.any_syscall(),
        }
    }

    fn signal_sender(&mut self) -> SimStop {
        let available: Vec<&str> = SIGNAL_SENDERS
            .iter()
            .copied()
            .filter(|name| detour_core::syscall_number(name, self.arch).is_some())
            .collect();
        match available.choose(&mut self.rng) {
            Some(name) => SimStop::syscall(*name, self.args()),
            None => self.any_syscall(),
        }
    }

    fn any_syscall(&mut self) -> SimStop {
        let entries = syscall_entries(self.arch);
        let syscallno = entries
            .choose(&mut self.rng)
            .map_or(0, |(number, _)| *number);
        SimStop::syscall(SyscallRef::Number(syscallno), self.args())
    }

    fn args(&mut self) -> [u64; 6] {
        let mut args = [0u64; 6];
        for arg in &mut args {
            *arg = self.rng.gen_range(0..0x1_0000);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_script() {
        let seed = SimSeed::from_literal(7);
        let a = ScriptGenerator::new(Arch::X86_64, &seed).script(50);
        let b = ScriptGenerator::new(Arch::X86_64, &seed).script(50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_script_ends_with_exit() {
        let script = ScriptGenerator::new(Arch::Aarch64, &SimSeed::default()).script(10);
        assert_eq!(script.len(), 11);
        assert_eq!(script.last(), Some(&SimStop::Exit));
        assert!(script[..10].iter().all(|s| *s != SimStop::Exit));
    }

    #[test]
    fn test_generated_syscalls_resolve() {
        for arch in Arch::ALL {
            let script = ScriptGenerator::new(arch, &SimSeed::from_literal(3)).script(200);
            for stop in script {
                if let SimStop::SyscallEntry { syscall, .. } = stop {
                    assert!(syscall.resolve(arch).is_ok());
                }
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_scripts_reproducible(seed in proptest::prelude::any::<u64>(), len in 0usize..64) {
            let seed = SimSeed::from_literal(seed);
            let a = ScriptGenerator::new(Arch::X86, &seed).script(len);
            let b = ScriptGenerator::new(Arch::X86, &seed).script(len);
            proptest::prop_assert_eq!(a.len(), len + 1);
            proptest::prop_assert_eq!(a, b);
        }
    }
}
