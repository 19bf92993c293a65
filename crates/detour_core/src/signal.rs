//! Signals and siginfo as observed by the tracer.

use serde::{Deserialize, Serialize};

/// A signal number. Real-time signals are valid values too, so this is not
/// an exhaustive enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signal(i32);

impl Signal {
    /// `SIGHUP`
    pub const SIGHUP: Signal = Signal(1);
    /// `SIGINT`
    pub const SIGINT: Signal = Signal(2);
    /// `SIGQUIT`
    pub const SIGQUIT: Signal = Signal(3);
    /// `SIGILL`
    pub const SIGILL: Signal = Signal(4);
    /// `SIGTRAP`
    pub const SIGTRAP: Signal = Signal(5);
    /// `SIGABRT`
    pub const SIGABRT: Signal = Signal(6);
    /// `SIGBUS`
    pub const SIGBUS: Signal = Signal(7);
    /// `SIGFPE`
    pub const SIGFPE: Signal = Signal(8);
    /// `SIGKILL`
    pub const SIGKILL: Signal = Signal(9);
    /// `SIGUSR1`
    pub const SIGUSR1: Signal = Signal(10);
    /// `SIGSEGV`
    pub const SIGSEGV: Signal = Signal(11);
    /// `SIGUSR2`
    pub const SIGUSR2: Signal = Signal(12);
    /// `SIGPIPE`
    pub const SIGPIPE: Signal = Signal(13);
    /// `SIGALRM`
    pub const SIGALRM: Signal = Signal(14);
    /// `SIGTERM`
    pub const SIGTERM: Signal = Signal(15);
    /// `SIGSTKFLT`
    pub const SIGSTKFLT: Signal = Signal(16);
    /// `SIGCHLD`
    pub const SIGCHLD: Signal = Signal(17);
    /// `SIGCONT`
    pub const SIGCONT: Signal = Signal(18);
    /// `SIGSTOP`
    pub const SIGSTOP: Signal = Signal(19);
    /// `SIGTSTP`
    pub const SIGTSTP: Signal = Signal(20);
    /// `SIGTTIN`
    pub const SIGTTIN: Signal = Signal(21);
    /// `SIGTTOU`
    pub const SIGTTOU: Signal = Signal(22);
    /// `SIGURG`
    pub const SIGURG: Signal = Signal(23);
    /// `SIGXCPU`
    pub const SIGXCPU: Signal = Signal(24);
    /// `SIGXFSZ`
    pub const SIGXFSZ: Signal = Signal(25);
    /// `SIGVTALRM`
    pub const SIGVTALRM: Signal = Signal(26);
    /// `SIGPROF`
    pub const SIGPROF: Signal = Signal(27);
    /// `SIGWINCH`
    pub const SIGWINCH: Signal = Signal(28);
    /// `SIGIO`
    pub const SIGIO: Signal = Signal(29);
    /// `SIGPWR`
    pub const SIGPWR: Signal = Signal(30);
    /// `SIGSYS`
    pub const SIGSYS: Signal = Signal(31);

    /// Lowest real-time signal as the kernel numbers it
    pub const SIGRTMIN: i32 = 32;
    /// Highest signal number
    pub const SIGRTMAX: i32 = 64;

    /// Create from a raw signal number, rejecting 0 and out-of-range values
    #[must_use]
    pub const fn new(signo: i32) -> Option<Self> {
        if signo >= 1 && signo <= Self::SIGRTMAX {
            Some(Self(signo))
        } else {
            None
        }
    }

    /// Raw signal number
    #[must_use]
    pub const fn as_raw(&self) -> i32 {
        self.0
    }

    /// Whether this is a real-time signal
    #[must_use]
    pub const fn is_realtime(&self) -> bool {
        self.0 >= Self::SIGRTMIN
    }

    /// Symbolic name, e.g. `SIGSEGV` or `SIGRT3`
    #[must_use]
    pub fn name(&self) -> String {
        const NAMES: [&str; 31] = [
            "SIGHUP", "SIGINT", "SIGQUIT", "SIGILL", "SIGTRAP", "SIGABRT", "SIGBUS", "SIGFPE",
            "SIGKILL", "SIGUSR1", "SIGSEGV", "SIGUSR2", "SIGPIPE", "SIGALRM", "SIGTERM",
            "SIGSTKFLT", "SIGCHLD", "SIGCONT", "SIGSTOP", "SIGTSTP", "SIGTTIN", "SIGTTOU",
            "SIGURG", "SIGXCPU", "SIGXFSZ", "SIGVTALRM", "SIGPROF", "SIGWINCH", "SIGIO",
            "SIGPWR", "SIGSYS",
        ];
        if self.is_realtime() {
            format!("SIGRT{}", self.0 - Self::SIGRTMIN)
        } else {
            NAMES[(self.0 - 1) as usize].to_string()
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// The fields of `siginfo_t` the engine logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigInfo {
    /// Signal number
    pub signo: Signal,
    /// `si_code`
    pub code: i32,
    /// `si_errno`
    pub errno: i32,
    /// `si_addr` for fault signals
    pub addr: Option<u64>,
}

impl SigInfo {
    /// siginfo carrying only a signal number and code
    #[must_use]
    pub fn new(signo: Signal, code: i32) -> Self {
        Self {
            signo,
            code,
            errno: 0,
            addr: None,
        }
    }

    /// Set the fault address
    #[must_use]
    pub fn with_addr(mut self, addr: u64) -> Self {
        self.addr = Some(addr);
        self
    }
}

impl std::fmt::Display for SigInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{signo:{},errno:{},code:{}", self.signo, self.errno, self.code)?;
        if let Some(addr) = self.addr {
            write!(f, ",addr:{:#x}", addr)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::SIGSEGV.to_string(), "SIGSEGV");
        assert_eq!(Signal::SIGHUP.name(), "SIGHUP");
        assert_eq!(Signal::SIGSYS.name(), "SIGSYS");
        assert_eq!(Signal::new(34).unwrap().name(), "SIGRT2");
    }

    #[test]
    fn test_signal_range() {
        assert!(Signal::new(0).is_none());
        assert!(Signal::new(65).is_none());
        assert_eq!(Signal::new(9), Some(Signal::SIGKILL));
    }

    #[test]
    fn test_every_signal_has_a_name() {
        for signo in 1..=Signal::SIGRTMAX {
            let sig = Signal::new(signo).unwrap();
            assert!(sig.name().starts_with("SIG"));
        }
    }

    #[test]
    fn test_siginfo_display() {
        let info = SigInfo::new(Signal::SIGSEGV, 1).with_addr(0xdead);
        assert_eq!(info.to_string(), "{signo:SIGSEGV,errno:0,code:1,addr:0xdead}");
    }
}
