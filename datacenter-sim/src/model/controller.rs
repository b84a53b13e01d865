//! The cluster controller: a long-running workload that drives a control plane once per resume.

use std::rc::Rc;
use std::cell::RefCell;

use simcore::Time;

use super::app::{App, AppCore, Workload, WorkloadHandle};
use super::{Handle, Vm};
use crate::control_plane::ControlPlane;
use crate::os::Os;

#[derive(Debug)]
pub struct Controller {
    pub core: AppCore,
    pub nodes: Vec<Handle<Vm>>,
    pub control_plane: Rc<RefCell<dyn ControlPlane>>,
}

impl Controller {
    /// Schedules a synthetic `worker` App (sharing the controller's own length vector) on every
    /// node before attaching `control_plane`, mirroring the source's `__post_init__`.
    pub fn new(
        name: impl Into<String>,
        length: Vec<Time>,
        expiration: Option<Time>,
        nodes: Vec<Handle<Vm>>,
        control_plane: Rc<RefCell<dyn ControlPlane>>,
    ) -> Handle<Controller> {
        for node in &nodes {
            let worker = App::new("worker", length.clone(), None);
            node.borrow_mut().os.schedule(vec![WorkloadHandle::App(Handle::new(worker))]);
        }
        Handle::new(Self {
            core: AppCore::new(name, length, expiration),
            nodes,
            control_plane,
        })
    }
}

impl Workload for Controller {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> &'static str {
        "controller"
    }

    fn has_resumed_once(&self) -> bool {
        self.core.has_resumed_once()
    }

    fn resume(&mut self, cpu: &[Time], now: Time) -> Vec<Time> {
        self.control_plane.borrow_mut().manage();
        self.core.resume(cpu, now)
    }

    fn is_stopped(&self, now: Time) -> bool {
        self.core.is_stopped(now) || self.control_plane.borrow().is_stopped()
    }

    fn restart(&mut self) {
        self.core.restart()
    }
}
