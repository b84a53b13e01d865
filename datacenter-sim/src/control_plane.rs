//! Cluster control plane (C7): schedules Deployments onto worker VMs through pending/degraded/
//! scaled queues, in a discrete-GPU and a fractional-GPU resource-accounting variant. Adapted
//! from `policy.ControlPlaneManager` (`src/policy/control_plane.py`).
//!
//! The two variants share the replica/queue bookkeeping (`ControlPlaneCore`) but duplicate the
//! GPU-aware placement, release, and queue-processing skeleton (`VariantOps` plus the
//! `manage_queues`/`delete_impl`/`on_container_stop_impl` free functions that operate generically
//! over it) — their per-node ledgers have no common shape (`Option<(u32, u32)>` vs `f64`), so a
//! single generic method would need an associated type for no real gain over two small impls.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use log::{debug, warn};
use simcore::{SimContext, Time};

use crate::error::{FaultSlot, SimError};
use crate::events::{DeploymentDegradeEvent, DeploymentEvent, DeploymentScaleEvent, LifecycleEvent};
use crate::model::{Container, Controller, Deployment, GpuRequest, Handle, Vm, WorkloadHandle};
use crate::os::Os;

/// Capability the Controller drives once per resume: apply/scale/delete a deployment, and run
/// one pass of the scaled/degraded/pending queues.
pub trait ControlPlane: Debug {
    fn apply(&mut self, deployment: Handle<Deployment>);
    fn scale(&mut self, deployment: Handle<Deployment>, replicas: u32);
    fn delete(&mut self, deployment: Handle<Deployment>, n: Option<u32>);
    fn manage(&mut self);
    fn is_stopped(&self) -> bool;

    /// Back-fills the owning Controller once both halves exist — see `new_discrete_controller`/
    /// `new_fractional_controller`, which call this right after construction.
    fn set_controller(&mut self, controller: Weak<RefCell<Controller>>);

    /// Invoked by the `container.stop` subscription installed at construction time.
    fn on_container_stop(&mut self, vm: Handle<Vm>, workload: WorkloadHandle);
}

/// Bookkeeping shared by every variant: which replica groups exist, which container belongs to
/// which deployment/node, the three processing queues, and the means to publish deployment
/// lifecycle events against the owning Controller.
#[derive(Debug)]
struct ControlPlaneCore {
    ctx: SimContext,
    nodes: Vec<Handle<Vm>>,
    controller: RefCell<Option<Weak<RefCell<Controller>>>>,
    fault_slot: FaultSlot,
    replicas_of: HashMap<Handle<Deployment>, Vec<Vec<Handle<Container>>>>,
    container_deployment: HashMap<Handle<Container>, Handle<Deployment>>,
    container_node: HashMap<Handle<Container>, Handle<Vm>>,
    pending: VecDeque<Handle<Deployment>>,
    scaled: VecDeque<Handle<Deployment>>,
    degraded: VecDeque<(Handle<Deployment>, u32)>,
}

impl ControlPlaneCore {
    fn new(ctx: SimContext, nodes: Vec<Handle<Vm>>, fault_slot: FaultSlot) -> Self {
        Self {
            ctx,
            nodes,
            controller: RefCell::new(None),
            fault_slot,
            replicas_of: HashMap::new(),
            container_deployment: HashMap::new(),
            container_node: HashMap::new(),
            pending: VecDeque::new(),
            scaled: VecDeque::new(),
            degraded: VecDeque::new(),
        }
    }

    fn set_controller(&self, controller: Weak<RefCell<Controller>>) {
        *self.controller.borrow_mut() = Some(controller);
    }

    fn controller_handle(&self) -> Option<Handle<Controller>> {
        self.controller.borrow().as_ref()?.upgrade().map(Handle::from_rc)
    }

    fn replica_count(&self, deployment: &Handle<Deployment>) -> u32 {
        self.replicas_of.get(deployment).map(|groups| groups.len() as u32).unwrap_or(0)
    }

    fn now(&self) -> Time {
        self.ctx.now()
    }

    fn publish_run(&self, deployment: &Handle<Deployment>) {
        let Some(controller) = self.controller_handle() else { return };
        debug!("deployment `{}` run", deployment.borrow().name);
        self.ctx.publish(
            "deployment.run",
            self.now(),
            DeploymentEvent { controller, deployment: deployment.clone() },
        );
    }

    fn publish_pend(&self, deployment: &Handle<Deployment>) {
        let Some(controller) = self.controller_handle() else { return };
        debug!("deployment `{}` pending, no capacity found", deployment.borrow().name);
        self.ctx.publish(
            "deployment.pend",
            self.now(),
            DeploymentEvent { controller, deployment: deployment.clone() },
        );
    }

    fn publish_stop(&self, deployment: &Handle<Deployment>) {
        let Some(controller) = self.controller_handle() else { return };
        debug!("deployment `{}` stopped, no replicas remain", deployment.borrow().name);
        self.ctx.publish(
            "deployment.stop",
            self.now(),
            DeploymentEvent { controller, deployment: deployment.clone() },
        );
    }

    fn publish_degrade(&self, deployment: &Handle<Deployment>, remaining: u32) {
        let Some(controller) = self.controller_handle() else { return };
        debug!("deployment `{}` degraded, {} replica(s) short", deployment.borrow().name, remaining);
        self.ctx.publish(
            "deployment.degrade",
            self.now(),
            DeploymentDegradeEvent { controller, deployment: deployment.clone(), remaining },
        );
    }

    fn publish_scale(&self, deployment: &Handle<Deployment>, delta: i64) {
        let Some(controller) = self.controller_handle() else { return };
        debug!("deployment `{}` scaled by {}", deployment.borrow().name, delta);
        self.ctx.publish(
            "deployment.scale",
            self.now(),
            DeploymentScaleEvent { controller, deployment: deployment.clone(), delta },
        );
    }
}

/// The operations `manage_queues`/`delete_impl`/`on_container_stop_impl` need from a concrete
/// variant: access to the shared core, GPU-aware replica placement, and ledger release.
trait VariantOps {
    fn core(&self) -> &ControlPlaneCore;
    fn core_mut(&mut self) -> &mut ControlPlaneCore;

    /// Deploys up to `count` replicas round-robin across ON nodes, one replica per pass over the
    /// node list, stopping early once `count` is reached or a full pass makes no progress.
    /// Returns how many were actually placed.
    fn try_deploy(&mut self, deployment: &Handle<Deployment>, count: u32) -> u32;

    /// Returns one container's resource request to its node's ledger.
    fn release(&mut self, node: &Handle<Vm>, container: &Handle<Container>);
}

fn manage_queues<V: VariantOps>(v: &mut V) {
    let scaled: Vec<Handle<Deployment>> = std::mem::take(&mut v.core_mut().scaled).into_iter().collect();
    for deployment in scaled {
        let desired = deployment.borrow().replicas;
        let current = v.core().replica_count(&deployment);
        let delta = desired as i64 - current as i64;
        if delta < 0 {
            delete_impl(v, &deployment, Some((-delta) as u32));
            v.core().publish_scale(&deployment, delta);
        } else if delta > 0 {
            v.core_mut().degraded.push_back((deployment.clone(), delta as u32));
            v.core().publish_scale(&deployment, delta);
        } else {
            v.core().publish_run(&deployment);
        }
    }

    let degraded: Vec<(Handle<Deployment>, u32)> = std::mem::take(&mut v.core_mut().degraded).into_iter().collect();
    for (deployment, remaining) in degraded {
        let deployed = v.try_deploy(&deployment, remaining);
        let shortfall = remaining - deployed;
        if shortfall > 0 {
            v.core_mut().degraded.push_back((deployment.clone(), shortfall));
            v.core().publish_degrade(&deployment, shortfall);
        } else {
            v.core().publish_run(&deployment);
        }
    }

    let pending: Vec<Handle<Deployment>> = std::mem::take(&mut v.core_mut().pending).into_iter().collect();
    for deployment in pending {
        let desired = deployment.borrow().replicas;
        let current = v.core().replica_count(&deployment);
        let target = desired.saturating_sub(current);
        if target == 0 {
            v.core().publish_run(&deployment);
            continue;
        }
        let deployed = v.try_deploy(&deployment, target);
        if deployed == 0 {
            v.core_mut().pending.push_back(deployment.clone());
            v.core().publish_pend(&deployment);
        } else if deployed < target {
            v.core_mut().degraded.push_back((deployment.clone(), target - deployed));
            v.core().publish_degrade(&deployment, target - deployed);
        } else {
            v.core().publish_run(&deployment);
        }
    }
}

/// Pops up to `n` replica groups from the tail of `deployment`'s live groups (all of them if
/// `n` is `None`), removes each container from its node's OS and the shared container maps, and
/// releases its resources via `V::release`. Publishes `deployment.stop` once no groups remain.
fn delete_impl<V: VariantOps>(v: &mut V, deployment: &Handle<Deployment>, n: Option<u32>) {
    let Some(mut groups) = v.core_mut().replicas_of.remove(deployment) else { return };
    let take = n.map(|n| n as usize).unwrap_or(groups.len()).min(groups.len());
    let to_delete = groups.split_off(groups.len() - take);

    for replica in &to_delete {
        for container in replica {
            let node = v.core().container_node.get(container).cloned();
            if let Some(node) = node {
                node.borrow_mut().os.terminate(&[WorkloadHandle::Container(container.clone())]);
                v.release(&node, container);
            }
            v.core_mut().container_deployment.remove(container);
            v.core_mut().container_node.remove(container);
        }
    }

    if groups.is_empty() {
        v.core().publish_stop(deployment);
    } else {
        v.core_mut().replicas_of.insert(deployment.clone(), groups);
    }
}

/// Shared `container.stop` handling: releases the container's resources, drops it from its
/// replica group, and publishes `deployment.stop` if that empties the deployment. A container
/// whose ledgered node disagrees with the event's VM is a `ContainerNodeMismatch`, recorded on
/// the fault slot rather than handled further (see `crate::error`).
fn on_container_stop_impl<V: VariantOps>(v: &mut V, vm: Handle<Vm>, workload: WorkloadHandle) {
    let WorkloadHandle::Container(container) = workload else { return };
    let Some(ledgered_node) = v.core().container_node.get(&container).cloned() else {
        return;
    };
    if ledgered_node != vm {
        let node_name = vm.borrow().name.clone();
        v.core()
            .fault_slot
            .borrow_mut()
            .get_or_insert(SimError::ContainerNodeMismatch { node_name });
        return;
    }

    let deployment = v.core().container_deployment.get(&container).cloned();
    v.release(&ledgered_node, &container);
    v.core_mut().container_deployment.remove(&container);
    v.core_mut().container_node.remove(&container);

    let Some(deployment) = deployment else { return };
    let mut now_empty = false;
    if let Some(groups) = v.core_mut().replicas_of.get_mut(&deployment) {
        for group in groups.iter_mut() {
            group.retain(|c| c != &container);
        }
        groups.retain(|group| !group.is_empty());
        now_empty = groups.is_empty();
    }
    if now_empty {
        v.core_mut().replicas_of.remove(&deployment);
        v.core().publish_stop(&deployment);
    }
}

/// A worker node's free resources under the discrete-GPU model: a node's GPU is either its
/// original `(units, blocks)` profile or entirely claimed — there is no partial sharing.
#[derive(Debug, Clone)]
struct DiscreteNodeLedger {
    cpu: f64,
    ram: u64,
    gpu_profile: Option<(u32, u32)>,
    gpu_in_use: bool,
}

#[derive(Debug)]
pub struct DiscreteGpuControlPlane {
    core: ControlPlaneCore,
    node_ledgers: HashMap<Handle<Vm>, DiscreteNodeLedger>,
}

impl DiscreteGpuControlPlane {
    fn new(core: ControlPlaneCore) -> Self {
        let node_ledgers = core
            .nodes
            .iter()
            .map(|node| {
                let vm = node.borrow();
                (
                    node.clone(),
                    DiscreteNodeLedger { cpu: vm.cpu as f64, ram: vm.ram, gpu_profile: vm.gpu, gpu_in_use: false },
                )
            })
            .collect();
        Self { core, node_ledgers }
    }

    /// Checks deployment-aggregate CPU/RAM/GPU-availability against `node`'s ledger, then
    /// deducts per-container with rollback if a later container in the same replica turns out
    /// not to fit (the aggregate check only bounds sums; the GPU all-or-nothing profile can
    /// still reject a later container even when the sums looked fine).
    fn deploy_replica(&mut self, deployment: &Handle<Deployment>, node: &Handle<Vm>) -> bool {
        let specs = deployment.borrow().container_specs.clone();
        let agg_cpu: f64 = specs.iter().map(|s| s.requested_cpu()).sum();
        let agg_ram: u64 = specs.iter().map(|s| s.requested_ram()).sum();
        let needs_gpu = specs.iter().any(|s| matches!(s.gpu, Some(GpuRequest::Discrete(_, _))));

        let Some(ledger) = self.node_ledgers.get(node).cloned() else { return false };
        if ledger.cpu < agg_cpu || ledger.ram < agg_ram {
            return false;
        }
        if needs_gpu && (ledger.gpu_in_use || ledger.gpu_profile.is_none()) {
            return false;
        }

        let mut containers = Vec::with_capacity(specs.len());
        let mut deducted_cpu = 0.0;
        let mut deducted_ram = 0u64;
        let mut claimed_gpu = false;

        for spec in &specs {
            let gpu_ok = match spec.gpu {
                None => true,
                Some(GpuRequest::Discrete(units, blocks)) => {
                    let ledger = self.node_ledgers.get(node).expect("checked above");
                    !claimed_gpu && !ledger.gpu_in_use && ledger.gpu_profile == Some((units, blocks))
                }
                Some(GpuRequest::Fractional(_)) => {
                    warn!("container `{}` carries a fractional GPU request under a discrete control plane; treating as no request", spec.name);
                    true
                }
            };
            let ledger = self.node_ledgers.get_mut(node).expect("checked above");
            if ledger.cpu < spec.requested_cpu() || ledger.ram < spec.requested_ram() || !gpu_ok {
                ledger.cpu += deducted_cpu;
                ledger.ram += deducted_ram;
                if claimed_gpu {
                    ledger.gpu_in_use = false;
                }
                return false;
            }

            ledger.cpu -= spec.requested_cpu();
            ledger.ram -= spec.requested_ram();
            deducted_cpu += spec.requested_cpu();
            deducted_ram += spec.requested_ram();
            if matches!(spec.gpu, Some(GpuRequest::Discrete(_, _))) {
                ledger.gpu_in_use = true;
                claimed_gpu = true;
            }

            let container = Handle::new(Container::from_spec(spec));
            node.borrow_mut().os.schedule(vec![WorkloadHandle::Container(container.clone())]);
            self.core.container_deployment.insert(container.clone(), deployment.clone());
            self.core.container_node.insert(container.clone(), node.clone());
            containers.push(container);
        }

        self.core.replicas_of.entry(deployment.clone()).or_default().push(containers);
        true
    }
}

impl VariantOps for DiscreteGpuControlPlane {
    fn core(&self) -> &ControlPlaneCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ControlPlaneCore {
        &mut self.core
    }

    fn try_deploy(&mut self, deployment: &Handle<Deployment>, count: u32) -> u32 {
        deploy_round_robin(count, &self.core.nodes.clone(), |node| self.deploy_replica(deployment, node))
    }

    fn release(&mut self, node: &Handle<Vm>, container: &Handle<Container>) {
        let (cpu, ram, had_gpu) = {
            let c = container.borrow();
            (c.cpu_req.0, c.ram_req.0, matches!(c.gpu_req, Some(GpuRequest::Discrete(_, _))))
        };
        if let Some(ledger) = self.node_ledgers.get_mut(node) {
            ledger.cpu += cpu;
            ledger.ram += ram;
            if had_gpu {
                ledger.gpu_in_use = false;
            }
        }
    }
}

impl ControlPlane for DiscreteGpuControlPlane {
    fn apply(&mut self, deployment: Handle<Deployment>) {
        self.core.pending.push_back(deployment);
    }

    fn scale(&mut self, deployment: Handle<Deployment>, replicas: u32) {
        deployment.borrow_mut().replicas = replicas;
        self.core.scaled.push_back(deployment);
    }

    fn delete(&mut self, deployment: Handle<Deployment>, n: Option<u32>) {
        delete_impl(self, &deployment, n);
    }

    fn manage(&mut self) {
        manage_queues(self);
    }

    fn is_stopped(&self) -> bool {
        false
    }

    fn set_controller(&mut self, controller: Weak<RefCell<Controller>>) {
        self.core.set_controller(controller);
    }

    fn on_container_stop(&mut self, vm: Handle<Vm>, workload: WorkloadHandle) {
        on_container_stop_impl(self, vm, workload);
    }
}

/// A worker node's free resources under the fractional-GPU model: a single GPU share in `[0,
/// 1]`, initialized to `1.0` if the node has any GPU at all, `0.0` otherwise.
#[derive(Debug, Clone, Copy)]
struct FractionalNodeLedger {
    cpu: f64,
    ram: u64,
    gpu: f64,
}

#[derive(Debug)]
pub struct FractionalGpuControlPlane {
    core: ControlPlaneCore,
    node_ledgers: HashMap<Handle<Vm>, FractionalNodeLedger>,
}

impl FractionalGpuControlPlane {
    fn new(core: ControlPlaneCore) -> Self {
        let node_ledgers = core
            .nodes
            .iter()
            .map(|node| {
                let vm = node.borrow();
                let gpu = if vm.gpu.is_some() { 1.0 } else { 0.0 };
                (node.clone(), FractionalNodeLedger { cpu: vm.cpu as f64, ram: vm.ram, gpu })
            })
            .collect();
        Self { core, node_ledgers }
    }

    fn deploy_replica(&mut self, deployment: &Handle<Deployment>, node: &Handle<Vm>) -> bool {
        let specs = deployment.borrow().container_specs.clone();
        let agg_cpu: f64 = specs.iter().map(|s| s.requested_cpu()).sum();
        let agg_ram: u64 = specs.iter().map(|s| s.requested_ram()).sum();
        let agg_gpu: f64 = specs.iter().map(|s| s.gpu.map(|g| g.as_fraction()).unwrap_or(0.0)).sum();
        // Constructed as a diagnostic only: the source never actually blocks on this condition,
        // so an over-committed replica spec still proceeds to the per-container fit checks below.
        if agg_gpu > 1.0 {
            warn!(
                "deployment `{}` requests {:.2} aggregate GPU share per replica, exceeding a single node's budget (GpuOverCommit)",
                deployment.borrow().name,
                agg_gpu
            );
        }

        let Some(ledger) = self.node_ledgers.get(node).copied() else { return false };
        if ledger.cpu < agg_cpu || ledger.ram < agg_ram {
            return false;
        }

        let mut containers = Vec::with_capacity(specs.len());
        let mut deducted_cpu = 0.0;
        let mut deducted_ram = 0u64;
        let mut deducted_gpu = 0.0;

        for spec in &specs {
            let gpu_req = match spec.gpu {
                None => 0.0,
                Some(GpuRequest::Fractional(share)) => share,
                Some(GpuRequest::Discrete(_, _)) => {
                    warn!("container `{}` carries a discrete GPU request under a fractional control plane; treating as no request", spec.name);
                    0.0
                }
            };
            let ledger = self.node_ledgers.get_mut(node).expect("checked above");
            if ledger.cpu < spec.requested_cpu() || ledger.ram < spec.requested_ram() || ledger.gpu < gpu_req {
                ledger.cpu += deducted_cpu;
                ledger.ram += deducted_ram;
                ledger.gpu += deducted_gpu;
                return false;
            }

            ledger.cpu -= spec.requested_cpu();
            ledger.ram -= spec.requested_ram();
            ledger.gpu -= gpu_req;
            deducted_cpu += spec.requested_cpu();
            deducted_ram += spec.requested_ram();
            deducted_gpu += gpu_req;

            let container = Handle::new(Container::from_spec(spec));
            node.borrow_mut().os.schedule(vec![WorkloadHandle::Container(container.clone())]);
            self.core.container_deployment.insert(container.clone(), deployment.clone());
            self.core.container_node.insert(container.clone(), node.clone());
            containers.push(container);
        }

        self.core.replicas_of.entry(deployment.clone()).or_default().push(containers);
        true
    }
}

impl VariantOps for FractionalGpuControlPlane {
    fn core(&self) -> &ControlPlaneCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ControlPlaneCore {
        &mut self.core
    }

    fn try_deploy(&mut self, deployment: &Handle<Deployment>, count: u32) -> u32 {
        deploy_round_robin(count, &self.core.nodes.clone(), |node| self.deploy_replica(deployment, node))
    }

    fn release(&mut self, node: &Handle<Vm>, container: &Handle<Container>) {
        let (cpu, ram, gpu) = {
            let c = container.borrow();
            (c.cpu_req.0, c.ram_req.0, c.gpu_req.map(|g| g.as_fraction()).unwrap_or(0.0))
        };
        if let Some(ledger) = self.node_ledgers.get_mut(node) {
            ledger.cpu += cpu;
            ledger.ram += ram;
            ledger.gpu += gpu;
        }
    }
}

impl ControlPlane for FractionalGpuControlPlane {
    fn apply(&mut self, deployment: Handle<Deployment>) {
        self.core.pending.push_back(deployment);
    }

    fn scale(&mut self, deployment: Handle<Deployment>, replicas: u32) {
        deployment.borrow_mut().replicas = replicas;
        self.core.scaled.push_back(deployment);
    }

    fn delete(&mut self, deployment: Handle<Deployment>, n: Option<u32>) {
        delete_impl(self, &deployment, n);
    }

    fn manage(&mut self) {
        manage_queues(self);
    }

    fn is_stopped(&self) -> bool {
        false
    }

    fn set_controller(&mut self, controller: Weak<RefCell<Controller>>) {
        self.core.set_controller(controller);
    }

    fn on_container_stop(&mut self, vm: Handle<Vm>, workload: WorkloadHandle) {
        on_container_stop_impl(self, vm, workload);
    }
}

/// Deploys one replica per pass over the ON nodes, round-robin, until `count` replicas have
/// landed or a full pass places none.
fn deploy_round_robin(count: u32, nodes: &[Handle<Vm>], mut deploy_one: impl FnMut(&Handle<Vm>) -> bool) -> u32 {
    let mut deployed = 0u32;
    while deployed < count {
        let mut progress = false;
        for node in nodes.iter().filter(|n| n.borrow().is_on()) {
            if deployed >= count {
                break;
            }
            if deploy_one(node) {
                deployed += 1;
                progress = true;
            }
        }
        if !progress {
            break;
        }
    }
    deployed
}

/// Builds a discrete-GPU control plane together with the Controller that drives it: schedules
/// the synthetic worker App on every node, subscribes the plane to `container.stop`, and
/// back-fills the plane's controller back-reference once both halves exist.
pub fn new_discrete_controller(
    ctx: SimContext,
    name: impl Into<String>,
    length: Vec<Time>,
    expiration: Option<Time>,
    nodes: Vec<Handle<Vm>>,
    fault_slot: FaultSlot,
) -> (Handle<Controller>, Rc<RefCell<dyn ControlPlane>>) {
    let core = ControlPlaneCore::new(ctx.clone(), nodes.clone(), fault_slot);
    let plane: Rc<RefCell<dyn ControlPlane>> = Rc::new(RefCell::new(DiscreteGpuControlPlane::new(core)));
    subscribe_container_stop(&ctx, &plane);
    let controller = Controller::new(name, length, expiration, nodes, plane.clone());
    plane.borrow_mut().set_controller(Rc::downgrade(&controller.0));
    (controller, plane)
}

/// As `new_discrete_controller`, for the fractional-GPU variant.
pub fn new_fractional_controller(
    ctx: SimContext,
    name: impl Into<String>,
    length: Vec<Time>,
    expiration: Option<Time>,
    nodes: Vec<Handle<Vm>>,
    fault_slot: FaultSlot,
) -> (Handle<Controller>, Rc<RefCell<dyn ControlPlane>>) {
    let core = ControlPlaneCore::new(ctx.clone(), nodes.clone(), fault_slot);
    let plane: Rc<RefCell<dyn ControlPlane>> = Rc::new(RefCell::new(FractionalGpuControlPlane::new(core)));
    subscribe_container_stop(&ctx, &plane);
    let controller = Controller::new(name, length, expiration, nodes, plane.clone());
    plane.borrow_mut().set_controller(Rc::downgrade(&controller.0));
    (controller, plane)
}

fn subscribe_container_stop(ctx: &SimContext, plane: &Rc<RefCell<dyn ControlPlane>>) {
    let plane = plane.clone();
    ctx.subscribe::<LifecycleEvent, _>("container.stop", move |event, _now| {
        plane.borrow_mut().on_container_stop(event.vm, event.workload);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::new_fault_slot;
    use crate::model::ContainerSpec;
    use crate::os::TimeSharedOs;

    fn make_node(cpu: u32, ram: u64, gpu: Option<(u32, u32)>, ctx: &SimContext) -> Handle<Vm> {
        let vm = Vm::new("node", cpu, ram, gpu, Box::new(TimeSharedOs::new(ctx.clone())));
        vm.borrow_mut().turn_on();
        vm
    }

    fn spec(name: &str, cpu: f64, ram: u64, gpu: Option<GpuRequest>) -> ContainerSpec {
        ContainerSpec { name: name.into(), length: vec![10], cpu: (cpu, cpu), ram: (ram, ram), gpu, expiration: None }
    }

    #[test]
    fn discrete_plane_applies_and_degrades_when_short_on_nodes() {
        let ctx = SimContext::new();
        // One CPU "unit" per node ledger, matching the 1.0-CPU container spec below, so each
        // node hosts exactly one replica and the third is genuinely short a node.
        let node_a = make_node(1, 100, None, &ctx);
        let node_b = make_node(1, 100, None, &ctx);
        let fault_slot = new_fault_slot();
        let (_controller, plane) = new_discrete_controller(
            ctx.clone(),
            "ctrl",
            vec![1],
            None,
            vec![node_a, node_b],
            fault_slot,
        );

        let degrade_remaining = Rc::new(RefCell::new(None));
        let seen = degrade_remaining.clone();
        ctx.subscribe::<DeploymentDegradeEvent, _>("deployment.degrade", move |event, _now| {
            *seen.borrow_mut() = Some(event.remaining);
        });

        let deployment = Deployment::new("d", vec![spec("c", 1.0, 10, None)], 3);
        plane.borrow_mut().apply(deployment);
        plane.borrow_mut().manage();

        // Only two nodes exist, so the third replica must be degraded, not silently dropped.
        assert_eq!(*degrade_remaining.borrow(), Some(1));
    }

    #[test]
    fn gpu_all_or_nothing_rejects_a_second_discrete_container() {
        let ctx = SimContext::new();
        let node = make_node(4, 100, Some((1, 8)), &ctx);
        let fault_slot = new_fault_slot();
        let (_controller, plane) =
            new_discrete_controller(ctx.clone(), "ctrl", vec![1], None, vec![node], fault_slot);

        let d1 = Deployment::new("gpu-1", vec![spec("c1", 1.0, 10, Some(GpuRequest::Discrete(1, 4)))], 1);
        let d2 = Deployment::new("gpu-2", vec![spec("c2", 1.0, 10, Some(GpuRequest::Discrete(1, 4)))], 1);
        plane.borrow_mut().apply(d1.clone());
        plane.borrow_mut().manage();
        plane.borrow_mut().apply(d2.clone());
        plane.borrow_mut().manage();

        assert_eq!(plane.borrow().is_stopped(), false);
    }

    #[test]
    fn fractional_plane_shares_one_gpu_across_containers() {
        let ctx = SimContext::new();
        let node = make_node(4, 100, Some((1, 1)), &ctx);
        let fault_slot = new_fault_slot();
        let (_controller, plane) =
            new_fractional_controller(ctx.clone(), "ctrl", vec![1], None, vec![node], fault_slot);

        let deployment = Deployment::new(
            "split",
            vec![spec("half-a", 1.0, 10, Some(GpuRequest::Fractional(0.5))), spec("half-b", 1.0, 10, Some(GpuRequest::Fractional(0.5)))],
            1,
        );
        plane.borrow_mut().apply(deployment);
        plane.borrow_mut().manage();
        assert_eq!(plane.borrow().is_stopped(), false);
    }
}
