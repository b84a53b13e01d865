//! Run-wide configuration knobs.

/// Scenario builders fill this in before constructing a [`crate::simulation::Simulation`].
/// Mirrors the role `dslab-iaas`'s `SimulationConfig` plays for its own engine: a plain struct
/// of knobs, with no file-format parsing baked into the simulation core itself.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub name: String,
    pub clock_resolution: u64,
    pub log: bool,
}

impl SimConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clock_resolution: 1,
            log: true,
        }
    }

    pub fn with_clock_resolution(mut self, resolution: u64) -> Self {
        self.clock_resolution = resolution;
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}
