//! Containers — workloads with a resource request attached, and the specs a Deployment
//! stamps them out from.

use simcore::Time;

use super::app::{AppCore, Workload};

/// A GPU request, either a discrete `(compute units, memory blocks)` profile or a fractional
/// share of a node's single GPU. The two control plane variants each read one arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpuRequest {
    Discrete(u32, u32),
    Fractional(f64),
}

impl GpuRequest {
    pub fn as_discrete(&self) -> Option<(u32, u32)> {
        match self {
            GpuRequest::Discrete(units, blocks) => Some((*units, *blocks)),
            GpuRequest::Fractional(_) => None,
        }
    }

    pub fn as_fraction(&self) -> f64 {
        match self {
            GpuRequest::Fractional(share) => *share,
            GpuRequest::Discrete(_, _) => 0.0,
        }
    }
}

/// A concrete, typed stand-in for the source's untyped per-container spec dict.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub length: Vec<Time>,
    /// `(request, limit)`; only the request (index 0) is read anywhere in the policy.
    pub cpu: (f64, f64),
    pub ram: (u64, u64),
    pub gpu: Option<GpuRequest>,
    pub expiration: Option<Time>,
}

impl ContainerSpec {
    pub fn requested_cpu(&self) -> f64 {
        self.cpu.0
    }

    pub fn requested_ram(&self) -> u64 {
        self.ram.0
    }
}

#[derive(Debug, Clone)]
pub struct Container {
    pub core: AppCore,
    pub cpu_req: (f64, f64),
    pub ram_req: (u64, u64),
    pub gpu_req: Option<GpuRequest>,
}

impl Container {
    pub fn from_spec(spec: &ContainerSpec) -> Self {
        Self {
            core: AppCore::new(spec.name.clone(), spec.length.clone(), spec.expiration),
            cpu_req: spec.cpu,
            ram_req: spec.ram,
            gpu_req: spec.gpu,
        }
    }
}

impl Workload for Container {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> &'static str {
        "container"
    }

    fn has_resumed_once(&self) -> bool {
        self.core.has_resumed_once()
    }

    fn resume(&mut self, cpu: &[Time], now: Time) -> Vec<Time> {
        self.core.resume(cpu, now)
    }

    fn is_stopped(&self, now: Time) -> bool {
        self.core.is_stopped(now)
    }

    fn restart(&mut self) {
        self.core.restart()
    }
}
