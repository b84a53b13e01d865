//! A discrete-event simulator for a cloud data center: physical machines, a space-shared
//! hypervisor placing VMs, a time-shared guest OS dispatching CPU cycles across apps, and a
//! cluster control plane scheduling containerized deployments onto worker VMs.
//!
//! The crate consumes a fully-built scenario (the types in [`model`]) and a pluggable event
//! sink; building scenarios, CLI front-ends, and persistent log sinks are a host application's
//! job, not this crate's — see [`simulation::Simulation`] for the entry point.

pub mod config;
pub mod control_plane;
pub mod error;
pub mod events;
pub mod model;
pub mod os;
pub mod simulation;
pub mod vmm;
pub mod vmp;

pub use config::SimConfig;
pub use error::SimError;
pub use simulation::{Simulation, Stats};
