//! Address spaces and the tasks that share them.

use detour_core::{TaskId, VmId};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// One address space in the session.
///
/// An address space is resolved once its leader task has been adopted.
/// It stays resolved after the leader exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    id: VmId,
    tasks: BTreeSet<TaskId>,
    leader_adopted: bool,
}

impl AddressSpace {
    /// Address space id
    #[must_use]
    pub fn id(&self) -> VmId {
        self.id
    }

    /// Tasks running in this address space
    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().copied()
    }

    /// Number of member tasks
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the leader task has joined
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.leader_adopted
    }
}

/// Address spaces keyed by id, each kept alive by its member tasks
#[derive(Debug, Default)]
pub(crate) struct VmMap {
    vms: IndexMap<VmId, AddressSpace>,
}

impl VmMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `tid` to `vm`, creating the address space on first use
    pub(crate) fn join(&mut self, vm: VmId, tid: TaskId) {
        let space = self.vms.entry(vm).or_insert_with(|| AddressSpace {
            id: vm,
            tasks: BTreeSet::new(),
            leader_adopted: false,
        });
        space.tasks.insert(tid);
        if tid == vm.leader {
            space.leader_adopted = true;
        }
    }

    /// Remove `tid` from `vm`; the address space goes with its last task.
    /// Returns whether the address space was dropped.
    pub(crate) fn leave(&mut self, vm: VmId, tid: TaskId) -> bool {
        let Some(space) = self.vms.get_mut(&vm) else {
            return false;
        };
        space.tasks.remove(&tid);
        if space.tasks.is_empty() {
            self.vms.shift_remove(&vm);
            return true;
        }
        false
    }

    /// Address spaces whose leader was never adopted
    pub(crate) fn unresolved(&self) -> impl Iterator<Item = VmId> + '_ {
        self.vms
            .values()
            .filter(|space| !space.leader_adopted)
            .map(|space| space.id)
    }

    pub(crate) fn get(&self, vm: VmId) -> Option<&AddressSpace> {
        self.vms.get(&vm)
    }

    pub(crate) fn len(&self) -> usize {
        self.vms.len()
    }
}
