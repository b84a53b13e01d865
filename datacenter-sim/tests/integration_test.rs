//! End-to-end scenarios exercising the whole stack together: driver, placement, hypervisor,
//! guest OS, and the cluster control plane. Unit-level behavior (GPU block packing internals,
//! queue bookkeeping, cycle arithmetic) already has focused coverage next to each policy; these
//! tests check the pieces actually compose.

use std::cell::RefCell;
use std::rc::Rc;

use simcore::SimContext;

use datacenter_sim::config::SimConfig;
use datacenter_sim::control_plane::new_discrete_controller;
use datacenter_sim::error::{new_fault_slot, SimError};
use datacenter_sim::events::{DeploymentDegradeEvent, DeploymentEvent, VmPlacementEvent};
use datacenter_sim::model::{App, ContainerSpec, DataCenter, Deployment, GpuRequest, Handle, Pm, Request, Vm, WorkloadHandle};
use datacenter_sim::os::TimeSharedOs;
use datacenter_sim::simulation::Simulation;
use datacenter_sim::vmm::{SpaceSharedVmm, Vmm};
use datacenter_sim::vmp::{FirstFitVmp, Vmp};

#[derive(Debug)]
struct NullVmm;
impl Vmm for NullVmm {
    fn has_capacity(&self, _vm: &Handle<Vm>) -> (bool, bool, bool) {
        (false, false, false)
    }
    fn allocate(&mut self, _vms: &[Handle<Vm>]) -> Vec<bool> {
        vec![]
    }
    fn deallocate(&mut self, _vms: &[Handle<Vm>]) -> Vec<bool> {
        vec![]
    }
    fn resume(&mut self, _host_cpu: &[u64], _duration: u64) {}
    fn idles(&self) -> Vec<Handle<Vm>> {
        vec![]
    }
}

fn host(name: &str, cpu: Vec<u64>, ram: u64, gpu: Option<Vec<(u32, u32)>>) -> Handle<Pm> {
    let proto = Pm { name: name.into(), cpu: cpu.clone(), ram, gpu: gpu.clone(), vmm: Box::new(NullVmm) };
    let vmm = Box::new(SpaceSharedVmm::new(&proto));
    Pm::new(name, cpu, ram, gpu, vmm)
}

/// Scenario 1: a single VM running a single App that fully fits a single host completes and
/// deallocates, with final stats showing one accepted request.
#[test]
fn scenario_1_single_vm_single_app_fits() {
    let ctx = SimContext::new();
    let host_a = host("host-a", vec![100], 1024, None);
    let dc = DataCenter::new("dc", vec![host_a], Box::new(FirstFitVmp::new(ctx.clone())));

    let vm = Vm::new("vm-0", 1, 512, None, Box::new(TimeSharedOs::new(ctx.clone())));
    vm.borrow_mut().os.schedule(vec![WorkloadHandle::App(Handle::new(App::new("app-0", vec![100], None)))]);
    let request = Request::new(0, vm.clone());

    let mut sim = Simulation::new(ctx, SimConfig::new("scenario-1").with_log(false), dc, vec![request]);
    sim.run(None).expect("no required rejection in this scenario");

    let stats = sim.report(false);
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.rejected, 0);
    assert!(vm.borrow().is_off());
}

/// Scenario 2: with two equally-capable hosts, first-fit always lands the VM on the
/// first-declared host.
#[test]
fn scenario_2_first_fit_picks_first_host() {
    let ctx = SimContext::new();
    let host_a = host("host-a", vec![10], 10, None);
    let host_b = host("host-b", vec![10], 10, None);
    let mut vmp = FirstFitVmp::new(ctx.clone());

    let landed_on = Rc::new(RefCell::new(None));
    let seen = landed_on.clone();
    ctx.subscribe::<VmPlacementEvent, _>("vm.allocate", move |event, _now| {
        *seen.borrow_mut() = Some(event.pm.borrow().name.clone());
    });

    let vm = Vm::new("vm-0", 1, 10, None, Box::new(TimeSharedOs::new(ctx)));
    let results = vmp.allocate(&[vm], &[host_a, host_b]);
    assert_eq!(results, vec![true]);
    assert_eq!(landed_on.borrow().as_deref(), Some("host-a"));
}

/// Scenario 3: three single-core VMs compete for two cores total; two are accepted, one is
/// rejected, giving an accept rate of 0.67.
#[test]
fn scenario_3_rejection_yields_two_thirds_accept_rate() {
    let ctx = SimContext::new();
    let host_a = host("host-a", vec![1], 10, None);
    let host_b = host("host-b", vec![1], 10, None);
    let dc = DataCenter::new("dc", vec![host_a, host_b], Box::new(FirstFitVmp::new(ctx.clone())));

    let requests: Vec<Request> = (0..3)
        .map(|i| {
            let vm = Vm::new(format!("vm-{i}"), 1, 1, None, Box::new(TimeSharedOs::new(ctx.clone())));
            vm.borrow_mut()
                .os
                .schedule(vec![WorkloadHandle::App(Handle::new(App::new(format!("app-{i}"), vec![1], None)))]);
            Request::new(0, vm)
        })
        .collect();

    let mut sim = Simulation::new(ctx, SimConfig::new("scenario-3").with_log(false), dc, requests);
    sim.run(None).expect("rejections of non-required requests are not fatal");

    let stats = sim.report(false);
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.accept_rate, 0.67);
}

/// Scenario 4: a `required` request that cannot fit aborts the run with a typed error instead
/// of silently counting as a rejection.
#[test]
fn scenario_4_required_rejection_is_fatal() {
    let ctx = SimContext::new();
    let host_a = host("host-a", vec![1], 1, None);
    let dc = DataCenter::new("dc", vec![host_a], Box::new(FirstFitVmp::new(ctx.clone())));

    let vm = Vm::new("vm-too-big", 10, 10, None, Box::new(TimeSharedOs::new(ctx.clone())));
    let request = Request::new(0, vm).required(true);

    let mut sim = Simulation::new(ctx, SimConfig::new("scenario-4").with_log(false), dc, vec![request]);
    let err = sim.run(None).expect_err("a required rejection must propagate as an error");
    match err {
        SimError::RequiredRequestRejected { vm_name } => assert_eq!(vm_name, "vm-too-big"),
        other => panic!("expected RequiredRequestRejected, got {other:?}"),
    }
}

fn spec(name: &str, cpu: f64, ram: u64, gpu: Option<GpuRequest>) -> ContainerSpec {
    ContainerSpec { name: name.into(), length: vec![10], cpu: (cpu, cpu), ram: (ram, ram), gpu, expiration: None }
}

/// Scenario 5: a cluster of two worker nodes can only host two of three desired replicas; the
/// control plane degrades, and once a replica is removed the freed node absorbs the shortfall
/// and the deployment reports running again.
#[test]
fn scenario_5_deployment_degrades_then_runs_as_capacity_frees_up() {
    let ctx = SimContext::new();
    // Each node's control-plane CPU ledger is seeded from its own `cpu` field (one "compute
    // unit" per core), and each replica's container requests 1.0 CPU — so `cpu: 1` is what
    // makes a node able to host exactly one replica, matching the scenario this pins down.
    let node_a = Vm::new("node-a", 1, 100, None, Box::new(TimeSharedOs::new(ctx.clone())));
    let node_b = Vm::new("node-b", 1, 100, None, Box::new(TimeSharedOs::new(ctx.clone())));
    node_a.borrow_mut().turn_on();
    node_b.borrow_mut().turn_on();

    let fault_slot = new_fault_slot();
    let (controller, plane) =
        new_discrete_controller(ctx.clone(), "ctrl", vec![1_000_000], None, vec![node_a, node_b], fault_slot);

    let home = Vm::new("home", 1, 0, None, Box::new(TimeSharedOs::new(ctx.clone())));
    home.borrow_mut().turn_on();
    home.borrow_mut().os.schedule(vec![WorkloadHandle::Controller(controller)]);

    let degrade_remaining = Rc::new(RefCell::new(Vec::new()));
    let seen_degrade = degrade_remaining.clone();
    ctx.subscribe::<DeploymentDegradeEvent, _>("deployment.degrade", move |event, _now| {
        seen_degrade.borrow_mut().push(event.remaining);
    });
    let ran = Rc::new(RefCell::new(false));
    let seen_run = ran.clone();
    ctx.subscribe::<DeploymentEvent, _>("deployment.run", move |_event, _now| {
        *seen_run.borrow_mut() = true;
    });

    let deployment = Deployment::new("d", vec![spec("c", 1.0, 10, None)], 3);
    plane.borrow_mut().apply(deployment.clone());

    home.borrow_mut().os.resume(&[1], 1, &home);
    ctx.run_until(0);

    assert_eq!(*degrade_remaining.borrow(), vec![1]);
    assert!(!*ran.borrow());

    // One existing replica is removed, freeing its node's capacity for the degraded shortfall.
    plane.borrow_mut().delete(deployment.clone(), Some(1));

    home.borrow_mut().os.resume(&[1], 1, &home);
    ctx.run_until(0);

    assert!(*ran.borrow());
}

/// Scenario 6: a GPU with 8 contiguous blocks admits two VMs requesting 4 blocks each, but a
/// third identical VM finds no remaining contiguous range.
#[test]
fn scenario_6_gpu_blocks_pack_and_a_third_vm_is_rejected() {
    let proto = Pm { name: "gpu-host".into(), cpu: vec![10], ram: 10, gpu: Some(vec![(1, 8)]), vmm: Box::new(NullVmm) };
    let mut vmm = SpaceSharedVmm::new(&proto);
    let ctx = SimContext::new();

    let vm_a = Vm::new("vm-a", 1, 1, Some((1, 4)), Box::new(TimeSharedOs::new(ctx.clone())));
    let vm_b = Vm::new("vm-b", 1, 1, Some((1, 4)), Box::new(TimeSharedOs::new(ctx.clone())));
    let vm_c = Vm::new("vm-c", 1, 1, Some((1, 4)), Box::new(TimeSharedOs::new(ctx)));

    assert_eq!(vmm.allocate(&[vm_a]), vec![true]);
    assert_eq!(vmm.allocate(&[vm_b]), vec![true]);
    assert_eq!(vmm.allocate(&[vm_c]), vec![false]);
}
