//! Glycogen-accumulating organisms.
//!
//! GAOs compete with PAOs for VFA anaerobically but draw the energy for PHA
//! storage from glycogen alone, so they release no phosphate.

use crate::agent::{
    AgentData, AgentState, GLYC_PER_ATP_AER, GLYC_PER_ATP_ANA, PHA_PER_ATP_AER,
    PHA_PER_GLYC_ANA_ATP, VFA_PER_DECAYED_BIOMASS, priority_shares,
};
use crate::env::{EnvDelta, EnvState};

pub fn act_aerobic(env: &EnvState, d_env: &mut EnvDelta, agent: &mut AgentData) {
    let mut d_state = AgentState::default();

    let x_glycogen = agent.x_glycogen();
    let monod_glycogen = agent.monod_glycogen();
    let i_glycogen = agent.i_glycogen();
    let inhib_glycogen = agent.inhib_glycogen();
    let x_pha = agent.x_pha();
    let monod_pha = agent.monod_pha();

    let rate = &agent.traits.rate;
    let reg = &agent.traits.reg;
    let biomass = agent.state.biomass;

    if i_glycogen > 0.0 && x_pha > 0.0 {
        let delta = rate.q_glycogen * inhib_glycogen * monod_pha * biomass;
        d_state.glycogen += delta;
        d_state.pha -= delta / reg.y_glycogen_pha;
    }

    // Growth takes phosphorus from the bulk liquid.
    if env.op_conc > 0.0 && x_pha > 0.0 {
        let delta = rate.mu * monod_pha * agent.monod_op(env) * biomass;
        d_state.biomass += delta;
        d_state.pha -= delta / reg.y_h;
        d_env.op_conc -= delta * reg.i_bmp;
    }

    let [p_pha, p_glycogen] = priority_shares([monod_pha, monod_glycogen]);
    let maint = rate.m_aerobic * biomass;
    d_state.glycogen -= p_glycogen * maint * GLYC_PER_ATP_AER;
    d_state.pha -= p_pha * maint * PHA_PER_ATP_AER;

    {
        let delta = rate.b_aerobic * biomass;
        d_state.biomass -= delta;
        d_env.vfa_conc += delta * VFA_PER_DECAYED_BIOMASS;
        d_env.op_conc += delta * reg.i_bmp;
    }

    storage_decay(d_env, &mut d_state, agent, x_glycogen, x_pha);

    agent.state.apply_delta(&d_state);
}

pub fn act_anaerobic(env: &EnvState, d_env: &mut EnvDelta, agent: &mut AgentData) {
    let mut d_state = AgentState::default();

    let monod_vfa = agent.monod_vfa(env);
    let x_glycogen = agent.x_glycogen();
    let monod_glycogen = agent.monod_glycogen();
    let x_pha = agent.x_pha();
    let i_pha = agent.i_pha();
    let inhib_pha = agent.inhib_pha();

    let rate = &agent.traits.rate;
    let reg = &agent.traits.reg;
    let biomass = agent.state.biomass;

    if env.vfa_conc > 0.0 && x_glycogen > 0.0 && i_pha > 0.0 {
        let delta = rate.q_pha * monod_vfa * monod_glycogen * inhib_pha * biomass;
        d_env.vfa_conc -= delta;
        d_state.glycogen -= delta * (reg.y_pha_hac - 1.0);
        d_state.pha += delta * reg.y_pha_hac;
    }

    // Glycogen is the only maintenance store; biomass covers the rest.
    let p_glycogen = monod_glycogen;
    {
        let delta = p_glycogen * rate.m_anaerobic * biomass * GLYC_PER_ATP_ANA;
        d_state.glycogen -= delta;
        d_state.pha += delta * PHA_PER_GLYC_ANA_ATP;
    }
    {
        let delta = (1.0 - p_glycogen) * rate.b_anaerobic * biomass;
        d_state.biomass -= delta;
        d_env.vfa_conc += delta * VFA_PER_DECAYED_BIOMASS;
        d_env.op_conc += delta * reg.i_bmp;
    }

    storage_decay(d_env, &mut d_state, agent, x_glycogen, x_pha);

    agent.state.apply_delta(&d_state);
}

fn storage_decay(
    d_env: &mut EnvDelta,
    d_state: &mut AgentState,
    agent: &AgentData,
    x_glycogen: f64,
    x_pha: f64,
) {
    let rate = &agent.traits.rate;
    let biomass = agent.state.biomass;
    if x_glycogen > 0.0 {
        let delta = rate.b_glycogen * x_glycogen * biomass;
        d_state.glycogen -= delta;
        d_env.vfa_conc += delta;
    }
    if x_pha > 0.0 {
        let delta = rate.b_pha * x_pha * biomass;
        d_state.pha -= delta;
        d_env.vfa_conc += delta;
    }
}
