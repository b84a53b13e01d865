//! The simulation driver (C9): publishes request arrivals, runs the step loop, and reports
//! acceptance statistics. Adapted from `simulator.Simulator` (`src/simulator.py`).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use simcore::{SimContext, Time};

use crate::config::SimConfig;
use crate::error::{new_fault_slot, FaultSlot, SimError};
use crate::events::{
    DeploymentDegradeEvent, DeploymentEvent, DeploymentScaleEvent, LifecycleEvent, LogEvent, RequestBatchEvent,
    VmPlacementEvent,
};
use crate::model::DataCenter;

/// Running counters behind [`Stats`]. Never reaches back into the bus itself — every increment
/// happens inside a topic subscriber that already received the count it needs.
#[derive(Debug, Default)]
struct Tracker {
    requests: u64,
    accepted: u64,
    rejected: u64,
}

/// The statistics `Simulation::report` returns: how many requests arrived, how many of those
/// were accepted/rejected, and the resulting rates, rounded to two decimal places. A run with
/// zero requests reports both rates as zero rather than dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub requests: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub accept_rate: f64,
    pub reject_rate: f64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl Stats {
    fn from_tracker(t: &Tracker) -> Self {
        if t.requests == 0 {
            return Self { requests: 0, accepted: 0, rejected: 0, accept_rate: 0.0, reject_rate: 0.0 };
        }
        let accept_rate = round2(t.accepted as f64 / t.requests as f64);
        let reject_rate = round2(1.0 - accept_rate);
        Self { requests: t.requests, accepted: t.accepted, rejected: t.rejected, accept_rate, reject_rate }
    }
}

/// The simulation engine: owns the virtual clock/event bus (via [`SimContext`]), the data
/// center, and the request accounting, and drives the step loop described in §4.8.
pub struct Simulation {
    ctx: SimContext,
    config: SimConfig,
    datacenter: Rc<RefCell<DataCenter>>,
    tracker: Rc<RefCell<Tracker>>,
    fault_slot: FaultSlot,
}

impl Simulation {
    /// Builds a simulation around a fully-constructed data center and a user's ordered request
    /// list, wiring up request accounting and the default human-readable log formatters. `ctx`
    /// is the same [`SimContext`] the scenario builder used to construct the data center's VMs,
    /// hosts, and any controllers/control planes — every component must share one clock/bus.
    pub fn new(ctx: SimContext, config: SimConfig, datacenter: DataCenter, requests: Vec<crate::model::Request>) -> Self {
        ctx.reset_clock();
        let tracker = Rc::new(RefCell::new(Tracker::default()));
        let fault_slot = new_fault_slot();
        let datacenter = Rc::new(RefCell::new(datacenter));

        let sim = Self { ctx: ctx.clone(), config, datacenter, tracker, fault_slot };
        sim.subscribe_request_pipeline();
        sim.subscribe_log_formatters();
        sim.publish_arrivals(requests);
        sim
    }

    fn publish_arrivals(&self, requests: Vec<crate::model::Request>) {
        let mut by_arrival: BTreeMap<Time, Vec<crate::model::Request>> = BTreeMap::new();
        for request in requests {
            by_arrival.entry(request.arrival()).or_default().push(request);
        }
        for (arrival, group) in by_arrival {
            self.ctx.publish("request.arrive", arrival, RequestBatchEvent { requests: group });
        }
    }

    fn subscribe_request_pipeline(&self) {
        let datacenter = self.datacenter.clone();
        let tracker = self.tracker.clone();
        let fault_slot = self.fault_slot.clone();
        let ctx = self.ctx.clone();
        self.ctx.subscribe::<RequestBatchEvent, _>("request.arrive", move |event, now| {
            let non_ignored = event.requests.iter().filter(|r| !r.ignored).count() as u64;
            tracker.borrow_mut().requests += non_ignored;

            let vms: Vec<_> = event.requests.iter().map(|r| r.vm.clone()).collect();
            let hosts = datacenter.borrow().hosts.clone();
            let results = datacenter.borrow_mut().vmp.allocate(&vms, &hosts);

            let mut accepted = Vec::new();
            let mut rejected = Vec::new();
            for (request, ok) in event.requests.into_iter().zip(results) {
                if ok {
                    if let Some(cb) = &request.on_success {
                        cb.call();
                    }
                    accepted.push(request);
                } else {
                    if request.required {
                        let vm_name = request.vm.borrow().name.clone();
                        fault_slot.borrow_mut().get_or_insert(SimError::RequiredRequestRejected { vm_name });
                    }
                    if let Some(cb) = &request.on_failure {
                        cb.call();
                    }
                    rejected.push(request);
                }
            }

            if !accepted.is_empty() {
                ctx.publish("request.accept", now, RequestBatchEvent { requests: accepted.clone() });
            }
            if !rejected.is_empty() {
                ctx.publish("request.reject", now, RequestBatchEvent { requests: rejected.clone() });
            }
            let mut executed = accepted;
            executed.extend(rejected);
            if !executed.is_empty() {
                ctx.publish("action.execute", now, RequestBatchEvent { requests: executed });
            }
        });

        let tracker_accept = self.tracker.clone();
        self.ctx.subscribe::<RequestBatchEvent, _>("request.accept", move |event, _now| {
            let non_ignored = event.requests.iter().filter(|r| !r.ignored).count() as u64;
            tracker_accept.borrow_mut().accepted += non_ignored;
        });

        let tracker_reject = self.tracker.clone();
        self.ctx.subscribe::<RequestBatchEvent, _>("request.reject", move |event, _now| {
            let non_ignored = event.requests.iter().filter(|r| !r.ignored).count() as u64;
            tracker_reject.borrow_mut().rejected += non_ignored;
        });

        self.ctx.subscribe::<RequestBatchEvent, _>("action.execute", move |event, _now| {
            for request in &event.requests {
                if let Some(cb) = &request.action.execute {
                    cb.call();
                }
            }
        });
    }

    /// Registers the lifecycle log-formatter closures described in §4.8/§6: one per topic
    /// family, each rendering the `"[{owner.NAME}]: {verb} {subject.NAME}"` template and
    /// republishing onto `sim.log`, plus the `sim.log` subscriber that actually prints/traces it.
    fn subscribe_log_formatters(&self) {
        for topic in ["app.start", "app.stop", "container.start", "container.stop", "controller.start", "controller.stop"] {
            let ctx = self.ctx.clone();
            let verb = if topic.ends_with(".start") { "started" } else { "stopped" };
            self.ctx.subscribe::<LifecycleEvent, _>(topic, move |event, now| {
                let line = format!("[{}]: {} {}", event.vm.borrow().name, verb, event.workload.name());
                ctx.publish("sim.log", now, LogEvent(line));
            });
        }

        for (topic, verb) in [("vm.allocate", "allocated"), ("vm.deallocate", "deallocated")] {
            let ctx = self.ctx.clone();
            self.ctx.subscribe::<VmPlacementEvent, _>(topic, move |event, now| {
                let line = format!("[{}]: {} {}", event.pm.borrow().name, verb, event.vm.borrow().name);
                ctx.publish("sim.log", now, LogEvent(line));
            });
        }

        for (topic, verb) in [("deployment.run", "running"), ("deployment.pend", "pending"), ("deployment.stop", "stopped")] {
            let ctx = self.ctx.clone();
            self.ctx.subscribe::<DeploymentEvent, _>(topic, move |event, now| {
                let line = format!("[{}]: {} {}", event.controller.borrow().core.name, verb, event.deployment.borrow().name);
                ctx.publish("sim.log", now, LogEvent(line));
            });
        }

        let ctx = self.ctx.clone();
        self.ctx.subscribe::<DeploymentDegradeEvent, _>("deployment.degrade", move |event, now| {
            let line = format!(
                "[{}]: degraded {} ({} short)",
                event.controller.borrow().core.name,
                event.deployment.borrow().name,
                event.remaining
            );
            ctx.publish("sim.log", now, LogEvent(line));
        });

        let ctx = self.ctx.clone();
        self.ctx.subscribe::<DeploymentScaleEvent, _>("deployment.scale", move |event, now| {
            let line = format!(
                "[{}]: scaled {} by {}",
                event.controller.borrow().core.name,
                event.deployment.borrow().name,
                event.delta
            );
            ctx.publish("sim.log", now, LogEvent(line));
        });

        let log_enabled = self.config.log;
        let name = self.config.name.clone();
        self.ctx.subscribe::<LogEvent, _>("sim.log", move |event, now| {
            if log_enabled {
                println!("{name}@{now}> {}", event.0);
            }
            log::info!("{name}@{now}> {}", event.0);
        });
    }

    /// One tick of the driver: flush due bus events, resume every VM by one clock resolution,
    /// deallocate any VMs that went idle, then advance the clock. Surfaces a fatal invariant
    /// violation recorded on the fault slot (a `required` request rejection, or a control-plane
    /// ledger mismatch) during the bus flush that preceded it.
    pub fn step(&mut self) -> Result<(), SimError> {
        let now = self.ctx.now();
        self.ctx.run_until(now);
        if let Some(err) = self.fault_slot.borrow_mut().take() {
            return Err(err);
        }

        let resolution = self.config.clock_resolution;
        let hosts = self.datacenter.borrow().hosts.clone();
        self.datacenter.borrow_mut().vmp.resume(&hosts, resolution);

        let stopped = self.datacenter.borrow().vmp.stopped(&hosts);
        if !stopped.is_empty() {
            self.datacenter.borrow_mut().vmp.deallocate(&stopped);
        }

        self.ctx.increase_clock(resolution);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        let tracker = self.tracker.borrow();
        self.ctx.bus_empty() && tracker.requests == tracker.accepted + tracker.rejected && self.datacenter.borrow().vmp.empty()
    }

    /// Runs `step` until either `duration` ticks have elapsed since `run` was called, or — with
    /// no duration — until the bus is empty, no request is outstanding, and the placement policy
    /// holds no VMs (§8, P5).
    pub fn run(&mut self, duration: Option<Time>) -> Result<&mut Self, SimError> {
        let start = self.ctx.now();
        loop {
            match duration {
                Some(d) if self.ctx.now() - start >= d => break,
                Some(_) => {}
                None if self.is_complete() => break,
                None => {}
            }
            self.step()?;
        }
        Ok(self)
    }

    /// Computes acceptance/rejection statistics, optionally printing a one-line summary.
    pub fn report(&self, to_stdout: bool) -> Stats {
        let stats = Stats::from_tracker(&self.tracker.borrow());
        if to_stdout {
            println!(
                "{}: requests={} accepted={} rejected={} accept_rate={:.2} reject_rate={:.2}",
                self.config.name, stats.requests, stats.accepted, stats.rejected, stats.accept_rate, stats.reject_rate
            );
        }
        stats
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn datacenter(&self) -> Rc<RefCell<DataCenter>> {
        self.datacenter.clone()
    }
}
