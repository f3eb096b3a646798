//! Shared agent store partitioned among variants.
//!
//! The population owns every agent record in one contiguous `Vec`. Each
//! variant is assigned a disjoint index range of it, in registration order,
//! when the population is instantiated for a run.

use crate::agent::AgentData;
use crate::env::{EnvDelta, EnvState};
use crate::error::{SimError, SimResult};
use crate::random::Randomizer;
use crate::variant::{Variant, VariantKind, VariantSummary};
use std::ops::Range;

#[derive(Debug, Clone, Default)]
pub struct Population {
    agents: Vec<AgentData>,
    variants: Vec<Variant>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variant(&mut self, variant: Variant) {
        self.variants.push(variant);
    }

    /// Remove every variant and agent.
    pub fn clear(&mut self) {
        self.agents.clear();
        self.variants.clear();
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn agents(&self) -> &[AgentData] {
        &self.agents
    }

    /// Agents of variant `i_var`; empty before instantiation.
    pub fn variant_agents(&self, i_var: usize) -> &[AgentData] {
        let range = self.variants[i_var].range();
        self.agents.get(range).unwrap_or(&[])
    }

    pub fn n_agent_by_variant(&self) -> Vec<(VariantKind, usize)> {
        self.variants
            .iter()
            .map(|v| (v.kind(), v.n_agent()))
            .collect()
    }

    /// Number of agents claimed by all variants.
    pub fn total_agents(&self) -> usize {
        self.variants.iter().map(Variant::n_agent).sum()
    }

    /// Ranges the variants will occupy, in registration order.
    fn plan_layout(&self) -> Vec<Range<usize>> {
        let mut offset = 0;
        self.variants
            .iter()
            .map(|v| {
                let range = offset..offset + v.n_agent();
                offset = range.end;
                range
            })
            .collect()
    }

    /// Check every variant's distributions.
    ///
    /// The layout itself is checked by [`Population::instantiate`] once the
    /// ranges are assigned.
    pub fn validate(&self) -> SimResult<()> {
        for variant in &self.variants {
            variant.validate()?;
        }
        Ok(())
    }

    /// Assign ranges, check them against the store size, then size the store
    /// and draw every agent. Nothing is drawn if the layout is inconsistent.
    ///
    /// Call [`Population::validate`] first.
    pub(crate) fn instantiate(&mut self, timestep: f64, rand: &mut Randomizer) -> SimResult<()> {
        let layout = self.plan_layout();
        for (variant, range) in self.variants.iter_mut().zip(layout) {
            variant.set_range(range);
        }
        let assigned: Vec<_> = self.variants.iter().map(Variant::range).collect();
        check_layout(self.total_agents(), &assigned)?;

        self.agents.clear();
        self.agents.resize(self.total_agents(), AgentData::default());
        for variant in &mut self.variants {
            variant.prepare(timestep);
        }
        for variant in &self.variants {
            variant.instantiate(&mut self.agents[variant.range()], rand);
        }
        log::info!(
            "instantiated {} agents in {} variants",
            self.agents.len(),
            self.variants.len()
        );
        Ok(())
    }

    /// Every agent acts once, variant by variant, against the same `env`.
    pub(crate) fn act_all(&mut self, env: &EnvState, d_env: &mut EnvDelta, rand: &mut Randomizer) {
        for variant in &self.variants {
            let agents = &mut self.agents[variant.range()];
            for idx in 0..agents.len() {
                variant.agent_action(env, d_env, agents, idx, rand);
            }
        }
    }

    /// Agent at store index `idx` acts once.
    pub(crate) fn act_one(
        &mut self,
        env: &EnvState,
        d_env: &mut EnvDelta,
        idx: usize,
        rand: &mut Randomizer,
    ) {
        if let Some(variant) = self.variants.iter().find(|v| v.range().contains(&idx)) {
            let range = variant.range();
            let agents = &mut self.agents[range.clone()];
            variant.agent_action(env, d_env, agents, idx - range.start, rand);
        }
    }

    /// Scale every agent's content, as when a fraction of the liquid leaves.
    pub(crate) fn scale_states(&mut self, factor: f64) {
        for agent in &mut self.agents {
            agent.state.scale(factor);
        }
    }

    pub(crate) fn clear_states(&mut self) {
        for agent in &mut self.agents {
            agent.state.clear();
        }
    }

    pub fn summaries(&self) -> Vec<VariantSummary> {
        self.variants
            .iter()
            .enumerate()
            .map(|(i_var, v)| v.summarize(self.variant_agents(i_var)))
            .collect()
    }
}

/// Check that `layout` tiles a store of `store` agents.
///
/// The ranges must cover exactly `store` agents in total and must not
/// overlap pairwise.
pub fn check_layout(store: usize, layout: &[Range<usize>]) -> SimResult<()> {
    let claimed = layout.iter().map(|r| r.len()).sum();
    if claimed != store {
        return Err(SimError::TotalAgentMismatch { store, claimed });
    }
    for (first, a) in layout.iter().enumerate() {
        for (second, b) in layout.iter().enumerate().skip(first + 1) {
            if a.start < b.end && b.start < a.end {
                return Err(SimError::VariantSliceOverlap { first, second });
            }
        }
    }
    Ok(())
}
