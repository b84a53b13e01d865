//! Deployments: a named, scalable group of container specs the control plane replicates across
//! worker nodes.

use super::{ContainerSpec, Handle};

#[derive(Debug, Clone)]
pub struct Deployment {
    pub name: String,
    pub container_specs: Vec<ContainerSpec>,
    pub replicas: u32,
}

impl Deployment {
    pub fn new(name: impl Into<String>, container_specs: Vec<ContainerSpec>, replicas: u32) -> Handle<Deployment> {
        Handle::new(Self {
            name: name.into(),
            container_specs,
            replicas,
        })
    }
}
