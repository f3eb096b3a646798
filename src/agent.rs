//! Per-agent data: mutable state, kinetic traits and the distributions they
//! are drawn from.
//!
//! Each trait group is declared once through [`trait_group!`], which produces
//! the value struct, its randomization config and an ordered `(name, field)`
//! view of both. Bulk operations (sampling, validation, rate scaling, merging)
//! walk those views instead of reinterpreting the structs as arrays.

use crate::env::EnvState;
use crate::error::{SimError, SimResult};
use crate::random::{RandomConfig, RandomKind, Randomizer};
use serde::{Deserialize, Serialize};

/// `split_biomass` never falls below this multiple of the initial biomass.
pub const MIN_RELA_SPLIT_BIOMASS: f64 = 1.5;
/// Initial relative cell count of every agent.
pub const INIT_RELA_COUNT: f64 = 1.0;
/// mgP polyphosphate per mmol ATP.
pub const POLYP_PER_ATP: f64 = 0.907;
/// mgCOD glycogen per mmol ATP produced anaerobically.
pub const GLYC_PER_ATP_ANA: f64 = 1.41;
/// mgCOD glycogen per mmol ATP produced aerobically.
pub const GLYC_PER_ATP_AER: f64 = 0.215;
/// mgCOD PHA per mmol ATP produced aerobically.
pub const PHA_PER_ATP_AER: f64 = 0.226;
/// mgCOD VFA released per mgCOD of decayed biomass.
pub const VFA_PER_DECAYED_BIOMASS: f64 = 1.0;
/// PHA formed per glycogen spent on anaerobic ATP.
pub const PHA_PER_GLYC_ANA_ATP: f64 = 0.833;

/// Saturation term `x / (x + k)`, zero when nothing is available.
pub fn saturation(x: f64, k: f64) -> f64 {
    if x > 0.0 { x / (x + k) } else { 0.0 }
}

/// Split a unit demand among sources in priority order.
///
/// Each source covers at most its own availability and at most what the
/// sources before it left uncovered, so shares are non-negative and sum to at
/// most 1.
pub fn priority_shares<const N: usize>(avail: [f64; N]) -> [f64; N] {
    let mut left = 1.0_f64;
    avail.map(|a| {
        let share = a.min(left).max(0.0);
        left -= share;
        share
    })
}

/// Mutable content of one agent.
///
/// Pools are absolute sizes, not contents per biomass. An agent is active iff
/// its biomass is positive; inactive agents hold nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub biomass: f64,
    /// Relative cell count, bookkeeping only.
    pub rela_count: f64,
    /// Biomass at which the agent divides.
    pub split_biomass: f64,
    pub glycogen: f64,
    pub pha: f64,
    pub polyp: f64,
}

impl AgentState {
    pub const NAMES: [&'static str; 6] = [
        "biomass",
        "rela_count",
        "split_biomass",
        "glycogen",
        "pha",
        "polyp",
    ];

    pub fn is_active(&self) -> bool {
        self.biomass > 0.0
    }

    pub fn can_split(&self) -> bool {
        self.is_active() && self.biomass >= self.split_biomass
    }

    pub fn values(&self) -> [(&'static str, f64); 6] {
        [
            ("biomass", self.biomass),
            ("rela_count", self.rela_count),
            ("split_biomass", self.split_biomass),
            ("glycogen", self.glycogen),
            ("pha", self.pha),
            ("polyp", self.polyp),
        ]
    }

    fn fields_mut(&mut self) -> [&mut f64; 6] {
        [
            &mut self.biomass,
            &mut self.rela_count,
            &mut self.split_biomass,
            &mut self.glycogen,
            &mut self.pha,
            &mut self.polyp,
        ]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Multiply every field by `factor`; a non-positive factor clears.
    pub fn scale(&mut self, factor: f64) {
        if factor <= 0.0 {
            self.clear();
            return;
        }
        for v in self.fields_mut() {
            *v *= factor;
        }
    }

    /// Add `other` into `self`.
    ///
    /// If the combined biomass is not positive the result is cleared. With
    /// `floor_at_zero` every other field is clamped at 0 afterwards.
    pub fn merge_with(&mut self, other: &AgentState, floor_at_zero: bool) {
        self.biomass += other.biomass;
        if !self.is_active() {
            self.clear();
            return;
        }
        self.rela_count += other.rela_count;
        self.split_biomass += other.split_biomass;
        self.glycogen += other.glycogen;
        self.pha += other.pha;
        self.polyp += other.polyp;
        if floor_at_zero {
            for v in self.fields_mut().into_iter().skip(1) {
                *v = v.max(0.0);
            }
        }
    }

    /// Field-wise sum, used for aggregates.
    pub fn accumulate(&mut self, other: &AgentState) {
        for (v, (_, o)) in self.fields_mut().into_iter().zip(other.values()) {
            *v += o;
        }
    }

    /// Apply a metabolic delta. Deltas never touch bookkeeping fields.
    pub(crate) fn apply_delta(&mut self, delta: &AgentState) {
        debug_assert!(delta.rela_count == 0.0, "delta touched rela_count");
        debug_assert!(delta.split_biomass == 0.0, "delta touched split_biomass");
        self.merge_with(delta, true);
        debug_assert!(self.rela_count.is_finite());
    }
}

/// Distributions of the initial agent state.
///
/// `rela_count` is not configurable; every agent starts at
/// [`INIT_RELA_COUNT`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateRandConfig {
    pub biomass: RandomConfig,
    pub split_biomass: RandomConfig,
    pub glycogen: RandomConfig,
    pub pha: RandomConfig,
    pub polyp: RandomConfig,
}

impl StateRandConfig {
    pub fn entries(&self) -> [(&'static str, &RandomConfig); 5] {
        [
            ("biomass", &self.biomass),
            ("split_biomass", &self.split_biomass),
            ("glycogen", &self.glycogen),
            ("pha", &self.pha),
            ("polyp", &self.polyp),
        ]
    }

    fn entries_mut(&mut self) -> [&mut RandomConfig; 5] {
        [
            &mut self.biomass,
            &mut self.split_biomass,
            &mut self.glycogen,
            &mut self.pha,
            &mut self.polyp,
        ]
    }

    pub fn validate(&self) -> SimResult<()> {
        for (_, cfg) in self.entries() {
            cfg.validate(None)?;
        }
        Ok(())
    }

    /// Partition variant-level totals among `n_agent` individuals.
    pub(crate) fn adjust_to_n_agent(&mut self, n_agent: usize) {
        let scale = if n_agent == 0 { 1.0 } else { 1.0 / n_agent as f64 };
        for cfg in self.entries_mut() {
            cfg.set_scale(scale);
            cfg.sort_values();
        }
    }

    pub fn sample(&self, rand: &mut Randomizer) -> AgentState {
        let mut state = AgentState {
            biomass: rand.generate(&self.biomass),
            rela_count: INIT_RELA_COUNT,
            split_biomass: rand.generate(&self.split_biomass),
            glycogen: rand.generate(&self.glycogen),
            pha: rand.generate(&self.pha),
            polyp: rand.generate(&self.polyp),
        };
        state.split_biomass = state
            .split_biomass
            .max(state.biomass * MIN_RELA_SPLIT_BIOMASS);
        state
    }
}

macro_rules! trait_group {
    ($(#[$meta:meta])* $name:ident, $cfg:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(pub $field: f64,)+
        }

        impl $name {
            pub const NAMES: &'static [&'static str] = &[$(stringify!($field)),+];

            pub fn values(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
                [$((stringify!($field), self.$field)),+].into_iter()
            }

            pub fn values_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut f64)> + '_ {
                [$((stringify!($field), &mut self.$field)),+].into_iter()
            }

            fn blend(&mut self, other: &Self, coef_self: f64) {
                let coef_other = 1.0 - coef_self;
                for ((_, v), (_, o)) in self.values_mut().zip(other.values()) {
                    *v = *v * coef_self + o * coef_other;
                }
            }
        }

        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $cfg {
            $(pub $field: RandomConfig,)+
        }

        impl $cfg {
            pub fn entries(&self) -> impl Iterator<Item = (&'static str, &RandomConfig)> + '_ {
                [$((stringify!($field), &self.$field)),+].into_iter()
            }

            pub fn entries_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut RandomConfig)> + '_ {
                [$((stringify!($field), &mut self.$field)),+].into_iter()
            }

            pub fn sample(&self, rand: &mut Randomizer) -> $name {
                $name {
                    $($field: rand.generate(&self.$field),)+
                }
            }
        }
    };
}

trait_group! {
    /// Rate constants (1/day); scaled by the timestep before a run.
    RateTrait, RateRandConfig {
        mu,
        q_glycogen,
        q_pha,
        q_polyp,
        m_aerobic,
        m_anaerobic,
        b_aerobic,
        b_anaerobic,
        b_glycogen,
        b_pha,
        b_polyp,
    }
}

trait_group! {
    /// Quotas, half-saturation constants and yields.
    RegularTrait, RegularRandConfig {
        x_glycogen_min,
        x_glycogen_max,
        x_pha_min,
        x_pha_max,
        x_polyp_min,
        x_polyp_max,
        k_hac,
        k_op,
        k_op_polyp,
        k_glycogen,
        k_pha,
        k_polyp,
        ki_glycogen,
        ki_pha,
        ki_polyp,
        y_h,
        y_glycogen_pha,
        y_polyp_pha,
        y_pha_hac,
        y_prel,
        i_bmp,
    }
}

/// Metabolic switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolTrait {
    /// Allow anaerobic VFA uptake through the TCA cycle.
    pub enable_tca: bool,
    /// Spend polyphosphate before glycogen on anaerobic maintenance.
    pub maint_polyp_first: bool,
}

impl BoolTrait {
    pub const NAMES: [&'static str; 2] = ["enable_tca", "maint_polyp_first"];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoolRandConfig {
    pub enable_tca: RandomConfig,
    pub maint_polyp_first: RandomConfig,
}

impl BoolRandConfig {
    pub fn entries(&self) -> [(&'static str, &RandomConfig); 2] {
        [
            ("enable_tca", &self.enable_tca),
            ("maint_polyp_first", &self.maint_polyp_first),
        ]
    }

    fn entries_mut(&mut self) -> [&mut RandomConfig; 2] {
        [&mut self.enable_tca, &mut self.maint_polyp_first]
    }

    pub fn sample(&self, rand: &mut Randomizer) -> BoolTrait {
        BoolTrait {
            enable_tca: rand.generate_bool(&self.enable_tca),
            maint_polyp_first: rand.generate_bool(&self.maint_polyp_first),
        }
    }
}

/// Kinetic parameters of one agent, fixed between splits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentTrait {
    pub rate: RateTrait,
    pub reg: RegularTrait,
    pub flags: BoolTrait,
}

impl AgentTrait {
    /// Weighted average with `other`, `coef_self` being this side's weight.
    ///
    /// Switches follow whichever side weighs at least one half, `self` on a tie.
    pub fn merge_with(&mut self, other: &AgentTrait, coef_self: f64) {
        self.rate.blend(&other.rate, coef_self);
        self.reg.blend(&other.reg, coef_self);
        if coef_self < 0.5 {
            self.flags = other.flags;
        }
    }
}

/// Distributions of every trait field, declared flat in configuration files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitRandConfig {
    #[serde(flatten)]
    pub rate: RateRandConfig,
    #[serde(flatten)]
    pub reg: RegularRandConfig,
    #[serde(flatten)]
    pub flags: BoolRandConfig,
}

impl TraitRandConfig {
    pub fn validate(&self) -> SimResult<()> {
        for (_, cfg) in self.rate.entries().chain(self.reg.entries()) {
            cfg.validate(None)?;
        }
        for (field, cfg) in self.flags.entries() {
            if !matches!(cfg.kind, RandomKind::None | RandomKind::Bernoulli) {
                return Err(SimError::BoolTraitWrongKind {
                    field,
                    kind: cfg.kind,
                });
            }
            cfg.validate(None)?;
        }
        Ok(())
    }

    /// Turn per-day rate constants into per-timestep ones.
    pub(crate) fn adjust_to_timestep(&mut self, timestep: f64) {
        for (_, cfg) in self.reg.entries_mut() {
            cfg.set_scale(1.0);
            cfg.sort_values();
        }
        for cfg in self.flags.entries_mut() {
            cfg.set_scale(1.0);
        }
        for (_, cfg) in self.rate.entries_mut() {
            cfg.set_scale(timestep);
            cfg.sort_values();
        }
    }

    pub fn sample(&self, rand: &mut Randomizer) -> AgentTrait {
        AgentTrait {
            rate: self.rate.sample(rand),
            reg: self.reg.sample(rand),
            flags: self.flags.sample(rand),
        }
    }
}

/// One simulated lump of organisms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    pub state: AgentState,
    pub traits: AgentTrait,
}

impl AgentData {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn can_split(&self) -> bool {
        self.state.can_split()
    }

    /// Absorb `other`; traits are averaged by biomass share.
    pub fn merge_with(&mut self, other: &AgentData) {
        let coef_self = if !self.is_active() && !other.is_active() {
            0.5
        } else {
            self.state.biomass / (self.state.biomass + other.state.biomass)
        };
        self.state.merge_with(&other.state, true);
        self.traits.merge_with(&other.traits, coef_self);
    }

    pub fn monod_vfa(&self, env: &EnvState) -> f64 {
        saturation(env.vfa_conc, self.traits.reg.k_hac)
    }

    pub fn monod_op(&self, env: &EnvState) -> f64 {
        saturation(env.op_conc, self.traits.reg.k_op)
    }

    pub fn monod_op_polyp(&self, env: &EnvState) -> f64 {
        saturation(env.op_conc, self.traits.reg.k_op_polyp)
    }

    fn content(&self, pool: f64) -> f64 {
        if self.is_active() {
            pool / self.state.biomass
        } else {
            0.0
        }
    }

    /// Glycogen content above the minimum quota.
    pub fn x_glycogen(&self) -> f64 {
        if self.is_active() {
            self.content(self.state.glycogen) - self.traits.reg.x_glycogen_min
        } else {
            0.0
        }
    }

    pub fn x_pha(&self) -> f64 {
        if self.is_active() {
            self.content(self.state.pha) - self.traits.reg.x_pha_min
        } else {
            0.0
        }
    }

    pub fn x_polyp(&self) -> f64 {
        if self.is_active() {
            self.content(self.state.polyp) - self.traits.reg.x_polyp_min
        } else {
            0.0
        }
    }

    /// Room left below the maximum glycogen quota.
    pub fn i_glycogen(&self) -> f64 {
        if self.is_active() {
            self.traits.reg.x_glycogen_max - self.content(self.state.glycogen)
        } else {
            0.0
        }
    }

    pub fn i_pha(&self) -> f64 {
        if self.is_active() {
            self.traits.reg.x_pha_max - self.content(self.state.pha)
        } else {
            0.0
        }
    }

    pub fn i_polyp(&self) -> f64 {
        if self.is_active() {
            self.traits.reg.x_polyp_max - self.content(self.state.polyp)
        } else {
            0.0
        }
    }

    pub fn monod_glycogen(&self) -> f64 {
        saturation(self.x_glycogen(), self.traits.reg.k_glycogen)
    }

    pub fn monod_pha(&self) -> f64 {
        saturation(self.x_pha(), self.traits.reg.k_pha)
    }

    pub fn monod_polyp(&self) -> f64 {
        saturation(self.x_polyp(), self.traits.reg.k_polyp)
    }

    pub fn inhib_glycogen(&self) -> f64 {
        saturation(self.i_glycogen(), self.traits.reg.ki_glycogen)
    }

    pub fn inhib_pha(&self) -> f64 {
        saturation(self.i_pha(), self.traits.reg.ki_pha)
    }

    pub fn inhib_polyp(&self) -> f64 {
        saturation(self.i_polyp(), self.traits.reg.ki_polyp)
    }
}
