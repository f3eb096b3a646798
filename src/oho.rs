//! Ordinary heterotrophic organisms.
//!
//! OHOs keep no storage pools: they grow on VFA when aerated and only decay
//! otherwise.

use crate::agent::{AgentData, AgentState, VFA_PER_DECAYED_BIOMASS};
use crate::env::{EnvDelta, EnvState};

pub fn act_aerobic(env: &EnvState, d_env: &mut EnvDelta, agent: &mut AgentData) {
    let mut d_state = AgentState::default();

    let rate = &agent.traits.rate;
    let reg = &agent.traits.reg;
    let biomass = agent.state.biomass;

    if env.vfa_conc > 0.0 && env.op_conc > 0.0 {
        let delta = rate.mu * agent.monod_vfa(env) * agent.monod_op(env) * biomass;
        d_state.biomass += delta;
        d_env.vfa_conc -= delta / reg.y_h;
        d_env.op_conc -= delta * reg.i_bmp;
    }

    decay(d_env, &mut d_state, agent, rate.b_aerobic);

    agent.state.apply_delta(&d_state);
}

pub fn act_anaerobic(_env: &EnvState, d_env: &mut EnvDelta, agent: &mut AgentData) {
    let mut d_state = AgentState::default();

    decay(d_env, &mut d_state, agent, agent.traits.rate.b_anaerobic);

    agent.state.apply_delta(&d_state);
}

fn decay(d_env: &mut EnvDelta, d_state: &mut AgentState, agent: &AgentData, b: f64) {
    let delta = b * agent.state.biomass;
    d_state.biomass -= delta;
    d_env.vfa_conc += delta * VFA_PER_DECAYED_BIOMASS;
    d_env.op_conc += delta * agent.traits.reg.i_bmp;
}
