//! First-fit placement policy (C6): maps VMs to hosts, scanning in declaration order and
//! delegating the actual admission check to each host's VMM.

use std::collections::HashMap;
use std::fmt::Debug;

use simcore::{SimContext, Time};

use crate::events::VmPlacementEvent;
use crate::model::{Handle, Pm, Vm};

/// Capability a data center's placement policy must provide: decide which host (if any) a VM
/// lands on, and propagate the periodic resume tick down to every host.
pub trait Vmp: Debug {
    fn allocate(&mut self, vms: &[Handle<Vm>], hosts: &[Handle<Pm>]) -> Vec<bool>;
    fn deallocate(&mut self, vms: &[Handle<Vm>]) -> Vec<bool>;
    /// `hosts` must be the data center's host list, in declaration order — resume propagates
    /// host-by-host in that order (§5's ordering guarantee), not in whatever order the
    /// `vm → pm` map happens to iterate.
    fn resume(&mut self, hosts: &[Handle<Pm>], duration: Time);
    fn stopped(&self, hosts: &[Handle<Pm>]) -> Vec<Handle<Vm>>;
    fn empty(&self) -> bool;
}

#[derive(Debug)]
pub struct FirstFitVmp {
    ctx: SimContext,
    vm_pm: HashMap<Handle<Vm>, Handle<Pm>>,
}

impl FirstFitVmp {
    pub fn new(ctx: SimContext) -> Self {
        Self { ctx, vm_pm: HashMap::new() }
    }
}

impl Vmp for FirstFitVmp {
    fn allocate(&mut self, vms: &[Handle<Vm>], hosts: &[Handle<Pm>]) -> Vec<bool> {
        let mut results = Vec::with_capacity(vms.len());
        for vm in vms {
            let mut placed = false;
            for host in hosts {
                let (cpu_ok, ram_ok, gpu_ok) = host.borrow().vmm.has_capacity(vm);
                if !(cpu_ok && ram_ok && gpu_ok) {
                    continue;
                }
                let allocated = host.borrow_mut().vmm.allocate(std::slice::from_ref(vm));
                if allocated == vec![true] {
                    self.vm_pm.insert(vm.clone(), host.clone());
                    self.ctx.publish(
                        "vm.allocate",
                        self.ctx.now(),
                        VmPlacementEvent { pm: host.clone(), vm: vm.clone() },
                    );
                    placed = true;
                    break;
                }
            }
            results.push(placed);
        }
        results
    }

    fn deallocate(&mut self, vms: &[Handle<Vm>]) -> Vec<bool> {
        let mut results = Vec::with_capacity(vms.len());
        for vm in vms {
            let Some(host) = self.vm_pm.remove(vm) else {
                results.push(false);
                continue;
            };
            host.borrow_mut().vmm.deallocate(std::slice::from_ref(vm));
            self.ctx.publish(
                "vm.deallocate",
                self.ctx.now(),
                VmPlacementEvent { pm: host.clone(), vm: vm.clone() },
            );
            results.push(true);
        }
        results
    }

    fn resume(&mut self, hosts: &[Handle<Pm>], duration: Time) {
        for host in hosts {
            let cpu = host.borrow().cpu.clone();
            host.borrow_mut().vmm.resume(&cpu, duration);
        }
    }

    fn stopped(&self, hosts: &[Handle<Pm>]) -> Vec<Handle<Vm>> {
        let mut result = Vec::new();
        for host in hosts {
            result.extend(host.borrow().vmm.idles());
        }
        result
    }

    fn empty(&self) -> bool {
        self.vm_pm.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::TimeSharedOs;
    use crate::vmm::SpaceSharedVmm;

    fn make_host(name: &str, cpu: Vec<Time>, ram: u64) -> Handle<Pm> {
        let pm_proto = Pm { name: name.into(), cpu: cpu.clone(), ram, gpu: None, vmm: Box::new(NullVmm) };
        let vmm = Box::new(SpaceSharedVmm::new(&pm_proto));
        Pm::new(name, cpu, ram, None, vmm)
    }

    #[derive(Debug)]
    struct NullVmm;
    impl crate::vmm::Vmm for NullVmm {
        fn has_capacity(&self, _vm: &Handle<Vm>) -> (bool, bool, bool) {
            (false, false, false)
        }
        fn allocate(&mut self, _vms: &[Handle<Vm>]) -> Vec<bool> {
            vec![]
        }
        fn deallocate(&mut self, _vms: &[Handle<Vm>]) -> Vec<bool> {
            vec![]
        }
        fn resume(&mut self, _host_cpu: &[Time], _duration: Time) {}
        fn idles(&self) -> Vec<Handle<Vm>> {
            vec![]
        }
    }

    fn make_vm(cpu: u32, ram: u64) -> Handle<Vm> {
        Vm::new("vm", cpu, ram, None, Box::new(TimeSharedOs::new(SimContext::new())))
    }

    #[test]
    fn allocates_on_first_fitting_host_in_declaration_order() {
        let ctx = SimContext::new();
        let mut vmp = FirstFitVmp::new(ctx);
        let host_a = make_host("a", vec![10], 10);
        let host_b = make_host("b", vec![10], 10);
        let vm = make_vm(1, 10);

        let results = vmp.allocate(&[vm.clone()], &[host_a.clone(), host_b.clone()]);
        assert_eq!(results, vec![true]);
        assert_eq!(vmp.vm_pm.get(&vm), Some(&host_a));
    }

    #[test]
    fn no_fit_reports_false_and_does_not_record() {
        let ctx = SimContext::new();
        let mut vmp = FirstFitVmp::new(ctx);
        let host = make_host("a", vec![1], 1);
        let vm = make_vm(10, 10);

        let results = vmp.allocate(&[vm.clone()], &[host]);
        assert_eq!(results, vec![false]);
        assert!(vmp.empty());
    }

    #[test]
    fn deallocate_unknown_vm_returns_false() {
        let ctx = SimContext::new();
        let mut vmp = FirstFitVmp::new(ctx);
        let vm = make_vm(1, 1);
        assert_eq!(vmp.deallocate(&[vm]), vec![false]);
    }
}
