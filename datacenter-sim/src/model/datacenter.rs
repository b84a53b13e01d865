//! A data center: an ordered list of hosts, owning a placement policy (VMP).

use crate::vmp::Vmp;

use super::{Handle, Pm};

#[derive(Debug)]
pub struct DataCenter {
    pub name: String,
    pub hosts: Vec<Handle<Pm>>,
    pub vmp: Box<dyn Vmp>,
}

impl DataCenter {
    pub fn new(name: impl Into<String>, hosts: Vec<Handle<Pm>>, vmp: Box<dyn Vmp>) -> Self {
        Self {
            name: name.into(),
            hosts,
            vmp,
        }
    }
}
