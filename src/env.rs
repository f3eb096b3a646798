//! Reactor-wide environment state.

use serde::{Deserialize, Serialize};

/// Bulk liquid of the reactor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvState {
    /// Liquid volume (L).
    pub volume: f64,
    /// Dissolved volatile fatty acids (mgCOD/L).
    pub vfa_conc: f64,
    /// Dissolved orthophosphate (mgP/L).
    pub op_conc: f64,
    /// Aeration on.
    pub is_aerobic: bool,
}

impl EnvState {
    pub fn new(volume: f64, vfa_conc: f64, op_conc: f64, is_aerobic: bool) -> Self {
        Self {
            volume,
            vfa_conc,
            op_conc,
            is_aerobic,
        }
    }

    /// Add accumulated biochemical changes; the aeration flag is untouched.
    pub fn apply(&mut self, delta: &EnvDelta) {
        self.volume += delta.volume;
        self.vfa_conc += delta.vfa_conc;
        self.op_conc += delta.op_conc;
    }

    /// Empty the reactor.
    pub fn wash_out(&mut self) {
        self.volume = 0.0;
        self.vfa_conc = 0.0;
        self.op_conc = 0.0;
    }
}

/// Changes to the environment accumulated by agent actions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvDelta {
    pub volume: f64,
    pub vfa_conc: f64,
    pub op_conc: f64,
}
