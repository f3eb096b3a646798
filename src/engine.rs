//! Top-level simulation engine and run loop.

use crate::agent::{AgentData, StateRandConfig, TraitRandConfig};
use crate::env::EnvState;
use crate::error::{SimError, SimResult};
use crate::population::Population;
use crate::random::Randomizer;
use crate::reactor::{self, DispatchMode, Reactor, Stage};
use crate::variant::{Variant, VariantKind, VariantSummary};
use std::sync::atomic::{AtomicBool, Ordering};

/// Simulation engine.
///
/// Holds the random generator, the reactor with its schedule and the agent
/// population, and runs them step by step. Everything is configured through
/// setters before [`Engine::run`]; a run validates the whole configuration
/// before touching any state.
pub struct Engine {
    rand: Randomizer,
    reactor: Reactor,
    population: Population,
    init_env: EnvState,
}

impl Engine {
    pub fn new(seed: u64, mode: DispatchMode, timestep: f64) -> Self {
        Self {
            rand: Randomizer::new(seed),
            reactor: Reactor::new(mode, timestep),
            population: Population::new(),
            init_env: EnvState::default(),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rand.reseed(seed);
    }

    pub fn mode(&self) -> DispatchMode {
        self.reactor.mode()
    }

    pub fn set_mode(&mut self, mode: DispatchMode) {
        self.reactor.set_mode(mode);
    }

    /// Timestep (day).
    pub fn timestep(&self) -> f64 {
        self.reactor.timestep()
    }

    pub fn set_timestep(&mut self, timestep: f64) {
        self.reactor.set_timestep(timestep);
    }

    pub fn init_env(&self) -> &EnvState {
        &self.init_env
    }

    pub fn set_init_env(&mut self, env: EnvState) {
        self.init_env = env;
    }

    pub fn stages(&self) -> &[Stage] {
        self.reactor.stages()
    }

    pub fn set_stages(&mut self, stages: Vec<Stage>) {
        self.reactor.set_stages(stages);
    }

    pub fn append_stage(&mut self, stage: Stage) {
        self.reactor.append_stage(stage);
    }

    pub fn clear_stages(&mut self) {
        self.reactor.clear_stages();
    }

    /// Length of the whole schedule (day).
    pub fn total_duration(&self) -> f64 {
        reactor::total_duration(self.stages())
    }

    pub fn is_flow_balanced(&self) -> bool {
        reactor::is_flow_balanced(self.stages())
    }

    pub fn add_variant(
        &mut self,
        kind: VariantKind,
        n_agent: usize,
        state_cfg: StateRandConfig,
        trait_cfg: TraitRandConfig,
    ) {
        self.population
            .add_variant(Variant::new(kind, n_agent, state_cfg, trait_cfg));
    }

    pub fn clear_variants(&mut self) {
        self.population.clear();
    }

    pub fn n_agent_by_variant(&self) -> Vec<(VariantKind, usize)> {
        self.population.n_agent_by_variant()
    }

    pub fn total_agents(&self) -> usize {
        self.population.total_agents()
    }

    pub fn variants(&self) -> &[Variant] {
        self.population.variants()
    }

    /// Agents of the `i_var`-th registered variant.
    pub fn variant_agents(&self, i_var: usize) -> &[AgentData] {
        self.population.variant_agents(i_var)
    }

    /// Simulated time (day).
    pub fn time(&self) -> f64 {
        self.reactor.time()
    }

    pub fn env(&self) -> &EnvState {
        self.reactor.env()
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn summaries(&self) -> Vec<VariantSummary> {
        self.population.summaries()
    }

    pub fn is_finished(&self) -> bool {
        self.reactor.is_finished()
    }

    /// Check everything a run depends on.
    pub fn validate(&self) -> SimResult<()> {
        let timestep = self.timestep();
        if !(timestep > 0.0) {
            return Err(SimError::InvalidTimestep(timestep));
        }
        if !(self.init_env.volume > 0.0) {
            return Err(SimError::InvalidInitVolume(self.init_env.volume));
        }
        self.population.validate()
    }

    /// Run the whole schedule.
    ///
    /// # Errors
    /// Returns a validation error, leaving the engine untouched, or
    /// [`SimError::Interrupted`] if `cancel` was set during the run.
    pub fn run(&mut self, cancel: &AtomicBool) -> SimResult<()> {
        self.run_with_observer(cancel, |_| {})
    }

    /// Run the whole schedule, calling `observer` after every timestep.
    pub fn run_with_observer<F>(&mut self, cancel: &AtomicBool, mut observer: F) -> SimResult<()>
    where
        F: FnMut(&Engine),
    {
        self.validate()?;

        self.population
            .instantiate(self.reactor.timestep(), &mut self.rand)?;
        self.reactor.reset(self.init_env);
        log::info!(
            "starting run: {} agents, {} days, timestep {}",
            self.total_agents(),
            self.total_duration(),
            self.timestep()
        );

        while !self.reactor.is_finished() {
            if cancel.load(Ordering::Relaxed) {
                log::info!("run interrupted at t = {}", self.time());
                return Err(SimError::Interrupted);
            }
            self.reactor
                .timestep_update(&mut self.population, &mut self.rand);
            observer(self);
        }

        log::info!("finished run after {} steps", self.reactor.n_step());
        Ok(())
    }
}
