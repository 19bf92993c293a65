//! Where contract violations go.

use crate::error::ContractViolation;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::error;

/// Receives every contract violation before the engine returns it
pub trait Diagnostics {
    /// Report `violation`
    fn report(&self, violation: &ContractViolation);
}

/// Logs the violation and aborts the process
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnViolation;

impl Diagnostics for AbortOnViolation {
    fn report(&self, violation: &ContractViolation) {
        error!(%violation, "contract violation");
        std::process::abort();
    }
}

/// Records violations for later inspection. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct CapturingDiagnostics {
    violations: Rc<RefCell<Vec<ContractViolation>>>,
}

impl CapturingDiagnostics {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Violations reported so far
    #[must_use]
    pub fn violations(&self) -> Vec<ContractViolation> {
        self.violations.borrow().clone()
    }

    /// Whether anything was reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.borrow().is_empty()
    }
}

impl Diagnostics for CapturingDiagnostics {
    fn report(&self, violation: &ContractViolation) {
        error!(%violation, "contract violation");
        self.violations.borrow_mut().push(violation.clone());
    }
}
