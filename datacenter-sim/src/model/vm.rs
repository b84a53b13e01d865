//! Virtual machines: the unit the placement policy (VMP) allocates onto hosts.

use std::fmt::Debug;

use crate::os::Os;

use super::Handle;

/// A VM's power state. Only `On` guests are resumed by their host's VMM and eligible for
/// `idles()`/collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Off,
    On,
}

#[derive(Debug)]
pub struct Vm {
    pub name: String,
    pub cpu: u32,
    pub ram: u64,
    pub gpu: Option<(u32, u32)>,
    pub os: Box<dyn Os>,
    pub state: VmState,
}

impl Vm {
    pub fn new(
        name: impl Into<String>,
        cpu: u32,
        ram: u64,
        gpu: Option<(u32, u32)>,
        os: Box<dyn Os>,
    ) -> Handle<Vm> {
        Handle::new(Self {
            name: name.into(),
            cpu,
            ram,
            gpu,
            os,
            state: VmState::Off,
        })
    }

    pub fn turn_on(&mut self) {
        self.state = VmState::On;
    }

    /// Resets the guest OS to a clean slate (no running, no stopped apps) — the source performs
    /// this unconditionally on power-off rather than on next power-on, so a VM never carries
    /// stale workload state into its next allocation.
    pub fn turn_off(&mut self) {
        self.state = VmState::Off;
        self.os.restart();
    }

    pub fn is_on(&self) -> bool {
        self.state == VmState::On
    }

    pub fn is_off(&self) -> bool {
        !self.is_on()
    }
}
