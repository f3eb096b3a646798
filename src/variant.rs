//! Agent variants and population-balance splitting.

use crate::agent::{AgentData, AgentState, StateRandConfig, TraitRandConfig};
use crate::env::{EnvDelta, EnvState};
use crate::error::SimResult;
use crate::random::Randomizer;
use crate::{gao, oho, pao};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Metabolic variant of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Pao,
    Gao,
    Oho,
}

impl VariantKind {
    pub fn name(self) -> &'static str {
        match self {
            VariantKind::Pao => "pao",
            VariantKind::Gao => "gao",
            VariantKind::Oho => "oho",
        }
    }

    /// Run one metabolic update, aerobic or anaerobic depending on `env`.
    pub fn act(self, env: &EnvState, d_env: &mut EnvDelta, agent: &mut AgentData) {
        match (self, env.is_aerobic) {
            (VariantKind::Pao, true) => pao::act_aerobic(env, d_env, agent),
            (VariantKind::Pao, false) => pao::act_anaerobic(env, d_env, agent),
            (VariantKind::Gao, true) => gao::act_aerobic(env, d_env, agent),
            (VariantKind::Gao, false) => gao::act_anaerobic(env, d_env, agent),
            (VariantKind::Oho, true) => oho::act_aerobic(env, d_env, agent),
            (VariantKind::Oho, false) => oho::act_anaerobic(env, d_env, agent),
        }
    }
}

/// A group of agents sharing one kind and one set of distributions.
///
/// The agents themselves live in the population store; a variant only knows
/// the index range it was assigned there.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    kind: VariantKind,
    n_agent: usize,
    state_cfg: StateRandConfig,
    trait_cfg: TraitRandConfig,
    range: Range<usize>,
}

impl Variant {
    pub fn new(
        kind: VariantKind,
        n_agent: usize,
        state_cfg: StateRandConfig,
        trait_cfg: TraitRandConfig,
    ) -> Self {
        Self {
            kind,
            n_agent,
            state_cfg,
            trait_cfg,
            range: 0..0,
        }
    }

    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    pub fn n_agent(&self) -> usize {
        self.n_agent
    }

    pub fn state_cfg(&self) -> &StateRandConfig {
        &self.state_cfg
    }

    pub fn trait_cfg(&self) -> &TraitRandConfig {
        &self.trait_cfg
    }

    /// Index range in the population store; empty until instantiated.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub(crate) fn set_range(&mut self, range: Range<usize>) {
        self.range = range;
    }

    pub fn validate(&self) -> SimResult<()> {
        self.state_cfg.validate()?;
        self.trait_cfg.validate()
    }

    /// Scale the distributions for a run with the given timestep.
    pub(crate) fn prepare(&mut self, timestep: f64) {
        self.trait_cfg.adjust_to_timestep(timestep);
        self.state_cfg.adjust_to_n_agent(self.n_agent);
    }

    /// Draw a fresh state and trait for every agent of `agents`.
    pub(crate) fn instantiate(&self, agents: &mut [AgentData], rand: &mut Randomizer) {
        for agent in agents {
            agent.state = self.state_cfg.sample(rand);
            agent.traits = self.trait_cfg.sample(rand);
        }
    }

    /// Let agent `idx` of this variant's slice act once, splitting it if it
    /// crossed its division threshold. Inactive agents do nothing.
    pub fn agent_action(
        &self,
        env: &EnvState,
        d_env: &mut EnvDelta,
        agents: &mut [AgentData],
        idx: usize,
        rand: &mut Randomizer,
    ) {
        let agent = &mut agents[idx];
        if !agent.is_active() {
            return;
        }
        self.kind.act(env, d_env, agent);
        if agent.can_split() {
            self.split(agents, idx, rand);
        }
    }

    /// Divide agent `idx` while keeping the number of agents constant.
    ///
    /// The agent is halved and the halved state becomes a daughter. To make
    /// room for it, the lowest-biomass agent of the slice is merged into the
    /// second lowest and its record is reused for the daughter with freshly
    /// drawn traits.
    pub fn split(&self, agents: &mut [AgentData], idx: usize, rand: &mut Randomizer) {
        if agents.len() <= 1 {
            return;
        }

        let parent = &mut agents[idx].state;
        let AgentState {
            rela_count,
            split_biomass,
            ..
        } = *parent;
        parent.scale(0.5);
        parent.rela_count = rela_count;
        parent.split_biomass = split_biomass;
        let daughter = *parent;

        let (lowest, second) = two_lowest_biomass(agents);
        let absorbed = agents[lowest];
        agents[second].merge_with(&absorbed);
        agents[lowest].state = daughter;
        agents[lowest].traits = self.trait_cfg.sample(rand);
    }

    pub fn summarize(&self, agents: &[AgentData]) -> VariantSummary {
        let mut total = AgentState::default();
        let mut n_active = 0;
        for agent in agents.iter().filter(|a| a.is_active()) {
            total.accumulate(&agent.state);
            n_active += 1;
        }
        let mut mean = total;
        if n_active > 0 {
            mean.scale(1.0 / n_active as f64);
        }
        VariantSummary {
            kind: self.kind,
            n_agent: self.n_agent,
            n_active,
            total,
            mean,
        }
    }
}

/// Aggregate of one variant's agents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub kind: VariantKind,
    pub n_agent: usize,
    pub n_active: usize,
    /// Field-wise sum over active agents.
    pub total: AgentState,
    /// Field-wise mean over active agents.
    pub mean: AgentState,
}

/// Indices of the lowest and second-lowest biomass, first seen winning ties.
///
/// `agents` must hold at least two records.
fn two_lowest_biomass(agents: &[AgentData]) -> (usize, usize) {
    let biomass = |i: usize| agents[i].state.biomass;
    let (mut lowest, mut second) = if biomass(1) < biomass(0) { (1, 0) } else { (0, 1) };
    for i in 2..agents.len() {
        let b = biomass(i);
        if b < biomass(lowest) {
            second = lowest;
            lowest = i;
        } else if b < biomass(second) {
            second = i;
        }
    }
    (lowest, second)
}
