//! Space-shared hypervisor (C5): partitions a host's cores, RAM, and per-GPU memory blocks
//! among guest VMs. Adapted from `policy.VmmSpaceShared` (`src/policy/vmm.py`).

use std::collections::BTreeSet;
use std::fmt::Debug;

use simcore::Time;

use crate::model::{Handle, Pm, Vm};

/// Capability every host's hypervisor must provide: admission control and space-shared
/// partitioning of its physical resources among the VMs it hosts.
pub trait Vmm: Debug {
    fn has_capacity(&self, vm: &Handle<Vm>) -> (bool, bool, bool);
    fn allocate(&mut self, vms: &[Handle<Vm>]) -> Vec<bool>;
    fn deallocate(&mut self, vms: &[Handle<Vm>]) -> Vec<bool>;
    fn resume(&mut self, host_cpu: &[Time], duration: Time);
    fn idles(&self) -> Vec<Handle<Vm>>;
}

#[derive(Debug)]
struct GpuAllocation {
    gpu_index: usize,
    blocks: BTreeSet<usize>,
}

#[derive(Debug)]
pub struct SpaceSharedVmm {
    num_cores: usize,
    free_cores: BTreeSet<usize>,
    vm_cores: Vec<(Handle<Vm>, BTreeSet<usize>)>,
    free_ram: u64,
    free_gpu: Vec<BTreeSet<usize>>,
    vm_gpu: Vec<(Handle<Vm>, GpuAllocation)>,
    guests: Vec<Handle<Vm>>,
}

impl SpaceSharedVmm {
    pub fn new(host: &Pm) -> Self {
        let free_gpu = host
            .gpu
            .as_ref()
            .map(|gpus| gpus.iter().map(|&(_, blocks)| (0..blocks as usize).collect()).collect())
            .unwrap_or_default();
        Self {
            num_cores: host.cpu.len(),
            free_cores: (0..host.cpu.len()).collect(),
            vm_cores: Vec::new(),
            free_ram: host.ram,
            free_gpu,
            vm_gpu: Vec::new(),
            guests: Vec::new(),
        }
    }

    fn guest_index(&self, vm: &Handle<Vm>) -> Option<usize> {
        self.guests.iter().position(|g| g == vm)
    }

    /// All maximal-size contiguous block ranges of `profile.1` blocks inside `gpu`'s free set,
    /// one per candidate starting index, in ascending index order (a `BTreeSet` iterates
    /// ascending, unlike the source's insertion-ordered Python `set`, making the chosen blocks
    /// deterministic here).
    fn find_gpu_blocks(profile: (u32, u32), gpu: &BTreeSet<usize>) -> Vec<BTreeSet<usize>> {
        let num_blocks = profile.1 as usize;
        let mut result = Vec::new();
        for &start in gpu {
            let range: BTreeSet<usize> = (start..start + num_blocks).collect();
            if range.is_subset(gpu) {
                result.push(range);
            }
        }
        result
    }
}

impl Vmm for SpaceSharedVmm {
    fn has_capacity(&self, vm: &Handle<Vm>) -> (bool, bool, bool) {
        let vm_ref = vm.borrow();
        let has_cpu = self.free_cores.len() >= vm_ref.cpu as usize;
        let has_ram = self.free_ram >= vm_ref.ram;
        let has_gpu = match vm_ref.gpu {
            None => true,
            Some(profile) => self.free_gpu.iter().any(|gpu| !Self::find_gpu_blocks(profile, gpu).is_empty()),
        };
        (has_cpu, has_ram, has_gpu)
    }

    fn allocate(&mut self, vms: &[Handle<Vm>]) -> Vec<bool> {
        let mut results = Vec::with_capacity(vms.len());
        for vm in vms {
            let (cpu_ok, ram_ok, gpu_ok) = self.has_capacity(vm);
            if !(cpu_ok && ram_ok && gpu_ok) {
                results.push(false);
                continue;
            }

            let cpu_needed = vm.borrow().cpu as usize;
            let cores: BTreeSet<usize> = self.free_cores.iter().take(cpu_needed).copied().collect();
            for core in &cores {
                self.free_cores.remove(core);
            }
            self.vm_cores.push((vm.clone(), cores));

            self.free_ram -= vm.borrow().ram;

            if let Some(profile) = vm.borrow().gpu {
                for (gpu_index, free_gpu) in self.free_gpu.iter_mut().enumerate() {
                    let candidates = Self::find_gpu_blocks(profile, free_gpu);
                    if let Some(blocks) = candidates.into_iter().next() {
                        for block in &blocks {
                            free_gpu.remove(block);
                        }
                        self.vm_gpu.push((vm.clone(), GpuAllocation { gpu_index, blocks }));
                        break;
                    }
                }
            }

            self.guests.push(vm.clone());
            vm.borrow_mut().turn_on();
            results.push(true);
        }
        results
    }

    fn deallocate(&mut self, vms: &[Handle<Vm>]) -> Vec<bool> {
        let mut results = Vec::with_capacity(vms.len());
        for vm in vms {
            let Some(idx) = self.guest_index(vm) else {
                results.push(false);
                continue;
            };

            if let Some(cores_idx) = self.vm_cores.iter().position(|(guest, _)| guest == vm) {
                let (_, cores) = self.vm_cores.remove(cores_idx);
                self.free_cores.extend(cores);
            }

            self.free_ram += vm.borrow().ram;

            if let Some(gpu_idx) = self.vm_gpu.iter().position(|(guest, _)| guest == vm) {
                let (_, allocation) = self.vm_gpu.remove(gpu_idx);
                self.free_gpu[allocation.gpu_index].extend(allocation.blocks);
            }

            self.guests.remove(idx);
            vm.borrow_mut().turn_off();
            results.push(true);
        }
        results
    }

    fn resume(&mut self, host_cpu: &[Time], duration: Time) {
        for (vm, cores) in &self.vm_cores {
            if !vm.borrow().is_on() {
                continue;
            }
            let vm_cpu: Vec<Time> = cores.iter().map(|&core| host_cpu[core]).collect();
            let consumed = vm.borrow_mut().os.resume(&vm_cpu, duration, vm);
            let _ = consumed;
        }
        let _ = self.num_cores;
    }

    fn idles(&self) -> Vec<Handle<Vm>> {
        self.guests.iter().filter(|guest| guest.borrow().os.is_idle()).cloned().collect()
    }
}
