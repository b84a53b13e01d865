//! Physical machines (hosts): a per-core frequency vector, RAM, optional GPUs, owning a VMM.

use simcore::Time;

use crate::vmm::Vmm;

use super::Handle;

#[derive(Debug)]
pub struct Pm {
    pub name: String,
    /// Per-core cycle frequency; also the host's core count (`cpu.len()`).
    pub cpu: Vec<Time>,
    pub ram: u64,
    /// One entry per physical GPU, each `(compute units, memory blocks)`.
    pub gpu: Option<Vec<(u32, u32)>>,
    pub vmm: Box<dyn Vmm>,
}

impl Pm {
    pub fn new(
        name: impl Into<String>,
        cpu: Vec<Time>,
        ram: u64,
        gpu: Option<Vec<(u32, u32)>>,
        vmm: Box<dyn Vmm>,
    ) -> Handle<Pm> {
        Handle::new(Self {
            name: name.into(),
            cpu,
            ram,
            gpu,
            vmm,
        })
    }
}
