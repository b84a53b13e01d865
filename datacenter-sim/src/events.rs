//! Event payload structs, one per topic family, following the teacher's per-event-struct
//! convention (`cloud-plugin/src/events.rs`).

use crate::model::{Controller, Deployment, Handle, Pm, Request, Vm, WorkloadHandle};

/// `app.start` / `app.stop` / `container.start` / `container.stop` / `controller.start` /
/// `controller.stop` — the topic name itself carries `<kind>.<start|stop>`.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub vm: Handle<Vm>,
    pub workload: WorkloadHandle,
}

/// `vm.allocate` / `vm.deallocate`.
#[derive(Debug, Clone)]
pub struct VmPlacementEvent {
    pub pm: Handle<Pm>,
    pub vm: Handle<Vm>,
}

/// `deployment.run` / `deployment.pend` / `deployment.stop`.
#[derive(Debug, Clone)]
pub struct DeploymentEvent {
    pub controller: Handle<Controller>,
    pub deployment: Handle<Deployment>,
}

/// `deployment.degrade`.
#[derive(Debug, Clone)]
pub struct DeploymentDegradeEvent {
    pub controller: Handle<Controller>,
    pub deployment: Handle<Deployment>,
    pub remaining: u32,
}

/// `deployment.scale`.
#[derive(Debug, Clone)]
pub struct DeploymentScaleEvent {
    pub controller: Handle<Controller>,
    pub deployment: Handle<Deployment>,
    pub delta: i64,
}

/// `request.arrive` / `request.accept` / `request.reject` / `action.execute` — all four carry
/// the same shape, a batch of requests sharing one arrival time.
#[derive(Debug, Clone)]
pub struct RequestBatchEvent {
    pub requests: Vec<Request>,
}

/// `sim.log` — a pre-formatted human-readable line.
#[derive(Debug, Clone)]
pub struct LogEvent(pub String);
