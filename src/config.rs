//! TOML run configuration for the command line.

use crate::agent::{BoolTrait, RateTrait, RegularTrait, StateRandConfig, TraitRandConfig};
use crate::engine::Engine;
use crate::env::EnvState;
use crate::reactor::{DispatchMode, Phase, Stage};
use crate::variant::VariantKind;
use anyhow::{Context, Result, bail};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Run configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    /// Reactor content at the start of the run.
    #[serde(default)]
    pub init_env: EnvState,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub variants: Vec<VariantConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Seed of the random generator.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub mode: DispatchMode,
    /// Timestep (day).
    pub timestep: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    pub kind: VariantKind,
    pub n_agent: usize,
    /// Distributions of variant-wide initial totals.
    #[serde(default)]
    pub state: StateRandConfig,
    /// Flat table of trait distributions; unknown keys are rejected.
    #[serde(default, deserialize_with = "deserialize_traits")]
    pub traits: TraitRandConfig,
}

fn deserialize_traits<'de, D>(deserializer: D) -> std::result::Result<TraitRandConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let table = toml::Table::deserialize(deserializer)?;
    if let Some(key) = table.keys().find(|key| !is_trait_name(key)) {
        return Err(D::Error::custom(format!("unknown trait `{key}`")));
    }
    toml::Value::Table(table)
        .try_into()
        .map_err(D::Error::custom)
}

fn is_trait_name(key: &str) -> bool {
    RateTrait::NAMES
        .iter()
        .chain(RegularTrait::NAMES)
        .chain(&BoolTrait::NAMES)
        .any(|name| *name == key)
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Time between trajectory samples (day); 0 samples every step.
    pub sample_interval: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_interval: 1.0 / 24.0,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be a TOML document with an `[engine]` table and any of
    /// `[init_env]`, `[[stages]]`, `[[variants]]` and `[output]`.
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_num(self.engine.timestep, 1e-6..=1.0).context("invalid timestep")?;
        check_num(self.init_env.volume, 1e-9..).context("invalid initial volume")?;
        check_num(self.init_env.vfa_conc, 0.0..).context("invalid initial VFA concentration")?;
        check_num(self.init_env.op_conc, 0.0..).context("invalid initial OP concentration")?;

        check_num(self.stages.len(), 1..1_000).context("invalid number of stages")?;
        for (i_stage, stage) in self.stages.iter().enumerate() {
            check_stage(stage).with_context(|| format!("invalid stage {i_stage}"))?;
        }

        check_num(self.variants.len(), 1..100).context("invalid number of variants")?;
        for (i_var, variant) in self.variants.iter().enumerate() {
            check_num(variant.n_agent, 1..10_000_000)
                .with_context(|| format!("invalid number of agents of variant {i_var}"))?;
        }

        check_num(self.output.sample_interval, 0.0..).context("invalid sample interval")?;

        Ok(())
    }

    /// Build an [`Engine`] set up as described.
    ///
    /// The engine's own checks (distributions, layout) run here as well, so a
    /// returned engine is ready to run.
    pub fn build_engine(&self) -> Result<Engine> {
        let mut engine = Engine::new(self.engine.seed, self.engine.mode, self.engine.timestep);
        engine.set_init_env(self.init_env);
        engine.set_stages(self.stages.clone());
        for variant in &self.variants {
            engine.add_variant(
                variant.kind,
                variant.n_agent,
                variant.state.clone(),
                variant.traits.clone(),
            );
        }
        engine.validate().context("invalid engine configuration")?;
        Ok(engine)
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_stage(stage: &Stage) -> Result<()> {
    check_num(stage.n_cycle, 1..).context("invalid number of cycles")?;
    check_num(stage.phases.len(), 1..).context("invalid number of phases")?;
    for (i_phase, phase) in stage.phases.iter().enumerate() {
        check_phase(phase).with_context(|| format!("invalid phase {i_phase}"))?;
    }
    Ok(())
}

fn check_phase(phase: &Phase) -> Result<()> {
    check_num(phase.duration, 0.0..).context("invalid duration")?;
    check_num(phase.inflow_rate, 0.0..).context("invalid inflow rate")?;
    check_num(phase.inflow_vfa_conc, 0.0..).context("invalid inflow VFA concentration")?;
    check_num(phase.inflow_op_conc, 0.0..).context("invalid inflow OP concentration")?;
    check_num(phase.withdraw_rate, 0.0..).context("invalid withdrawal rate")?;
    check_num(phase.outflow_rate, 0.0..).context("invalid outflow rate")?;
    if let Some(volume) = phase.volume_reset {
        check_num(volume, 0.0..).context("invalid volume reset")?;
    }
    Ok(())
}
