//! Phosphate-accumulating organisms.
//!
//! PAOs take up VFA anaerobically, storing it as PHA with energy from
//! polyphosphate and glycogen and releasing phosphate. Aerobically they burn
//! PHA to grow, to rebuild glycogen and to take phosphate back up as
//! polyphosphate.

use crate::agent::{
    AgentData, AgentState, GLYC_PER_ATP_AER, GLYC_PER_ATP_ANA, PHA_PER_ATP_AER,
    PHA_PER_GLYC_ANA_ATP, POLYP_PER_ATP, VFA_PER_DECAYED_BIOMASS, priority_shares,
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
    let x_polyp = agent.x_polyp();
    let monod_polyp = agent.monod_polyp();
    let i_polyp = agent.i_polyp();
    let inhib_polyp = agent.inhib_polyp();

    let rate = &agent.traits.rate;
    let reg = &agent.traits.reg;
    let biomass = agent.state.biomass;

    // Glycogen synthesis from PHA.
    if i_glycogen > 0.0 && x_pha > 0.0 {
        let delta = rate.q_glycogen * inhib_glycogen * monod_pha * biomass;
        d_state.glycogen += delta;
        d_state.pha -= delta / reg.y_glycogen_pha;
    }

    // Phosphate uptake into polyphosphate.
    if env.op_conc > 0.0 && i_polyp > 0.0 && x_pha > 0.0 {
        let delta = rate.q_polyp * agent.monod_op_polyp(env) * monod_pha * inhib_polyp * biomass;
        d_state.polyp += delta;
        d_state.pha -= delta / reg.y_polyp_pha;
        d_env.op_conc -= delta;
    }

    // Growth on PHA; phosphorus comes from internal polyphosphate.
    if x_pha > 0.0 && x_polyp > 0.0 {
        let delta = rate.mu * monod_pha * monod_polyp * biomass;
        d_state.biomass += delta;
        d_state.pha -= delta / reg.y_h;
        d_state.polyp -= delta * reg.i_bmp;
    }

    // Maintenance: PHA first, then glycogen, then polyphosphate.
    let [p_pha, p_glycogen, p_polyp] = priority_shares([monod_pha, monod_glycogen, monod_polyp]);
    let maint = rate.m_aerobic * biomass;
    d_state.glycogen -= p_glycogen * maint * GLYC_PER_ATP_AER;
    d_state.pha -= p_pha * maint * PHA_PER_ATP_AER;
    {
        let delta = p_polyp * maint * POLYP_PER_ATP;
        d_state.polyp -= delta;
        d_env.op_conc += delta;
    }

    // Decay.
    {
        let delta = rate.b_aerobic * biomass;
        d_state.biomass -= delta;
        d_env.vfa_conc += delta * VFA_PER_DECAYED_BIOMASS;
        d_env.op_conc += delta * reg.i_bmp;
    }

    storage_decay(d_env, &mut d_state, agent, x_glycogen, x_pha, x_polyp);

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
    let x_polyp = agent.x_polyp();
    let monod_polyp = agent.monod_polyp();

    let rate = &agent.traits.rate;
    let reg = &agent.traits.reg;
    let flags = &agent.traits.flags;
    let biomass = agent.state.biomass;

    // VFA uptake through glycolysis; delta is the VFA taken up.
    if env.vfa_conc > 0.0 && x_glycogen > 0.0 && i_pha > 0.0 && x_polyp > 0.0 {
        let delta = rate.q_pha * monod_vfa * monod_glycogen * inhib_pha * monod_polyp * biomass;
        d_env.vfa_conc -= delta;
        d_env.op_conc += delta * reg.y_prel;
        // glycogen + VFA = PHA
        d_state.glycogen -= delta * (reg.y_pha_hac - 1.0);
        d_state.pha += delta * reg.y_pha_hac;
        d_state.polyp -= delta * reg.y_prel;
    }

    // VFA uptake through the TCA cycle, covering the glycogen-limited part.
    if flags.enable_tca && env.vfa_conc > 0.0 && i_pha > 0.0 && x_polyp > 0.0 {
        let delta = rate.q_pha * monod_vfa * (1.0 - monod_glycogen) * inhib_pha * monod_polyp * biomass;
        d_env.vfa_conc -= delta;
        d_env.op_conc += delta * reg.y_prel;
        d_state.pha += delta;
        d_state.polyp -= delta * reg.y_prel;
    }

    // Maintenance; whatever storage cannot cover is paid with biomass.
    let (p_glycogen, p_polyp) = if flags.maint_polyp_first {
        let [p_polyp, p_glycogen] = priority_shares([monod_polyp, monod_glycogen]);
        (p_glycogen, p_polyp)
    } else {
        let [p_glycogen, p_polyp] = priority_shares([monod_glycogen, monod_polyp]);
        (p_glycogen, p_polyp)
    };
    let maint = rate.m_anaerobic * biomass;
    {
        let delta = p_glycogen * maint * GLYC_PER_ATP_ANA;
        d_state.glycogen -= delta;
        d_state.pha += delta * PHA_PER_GLYC_ANA_ATP;
    }
    {
        let delta = p_polyp * maint * POLYP_PER_ATP;
        d_state.polyp -= delta;
        d_env.op_conc += delta;
    }
    {
        let delta = (1.0 - p_glycogen - p_polyp) * rate.b_anaerobic * biomass;
        d_state.biomass -= delta;
        d_env.vfa_conc += delta * VFA_PER_DECAYED_BIOMASS;
        d_env.op_conc += delta * reg.i_bmp;
    }

    storage_decay(d_env, &mut d_state, agent, x_glycogen, x_pha, x_polyp);

    agent.state.apply_delta(&d_state);
}

/// Intrinsic decay of the storage pools above their minimum quotas.
fn storage_decay(
    d_env: &mut EnvDelta,
    d_state: &mut AgentState,
    agent: &AgentData,
    x_glycogen: f64,
    x_pha: f64,
    x_polyp: f64,
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
    if x_polyp > 0.0 {
        let delta = rate.b_polyp * x_polyp * biomass;
        d_state.polyp -= delta;
        d_env.op_conc += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pao() -> AgentData {
        let mut agent = AgentData::default();
        agent.state = AgentState {
            biomass: 100.0,
            rela_count: 1.0,
            split_biomass: 1000.0,
            glycogen: 20.0,
            pha: 10.0,
            polyp: 30.0,
        };
        let rate = &mut agent.traits.rate;
        rate.mu = 1e-3;
        rate.q_glycogen = 1e-3;
        rate.q_pha = 1e-2;
        rate.q_polyp = 1e-3;
        rate.m_aerobic = 1e-4;
        rate.m_anaerobic = 1e-4;
        rate.b_aerobic = 1e-5;
        rate.b_anaerobic = 1e-5;
        let reg = &mut agent.traits.reg;
        reg.x_glycogen_max = 0.5;
        reg.x_pha_max = 0.5;
        reg.x_polyp_max = 0.5;
        reg.k_hac = 4.0;
        reg.k_op_polyp = 0.5;
        reg.k_glycogen = 0.1;
        reg.k_pha = 0.1;
        reg.k_polyp = 0.1;
        reg.ki_glycogen = 0.1;
        reg.ki_pha = 0.1;
        reg.ki_polyp = 0.1;
        reg.y_h = 0.6;
        reg.y_glycogen_pha = 0.9;
        reg.y_polyp_pha = 0.4;
        reg.y_pha_hac = 1.3;
        reg.y_prel = 0.5;
        reg.i_bmp = 0.02;
        agent
    }

    #[test]
    fn anaerobic_uptake_releases_phosphate() {
        let env = EnvState::new(10.0, 100.0, 5.0, false);
        let mut agent = pao();
        let before = agent.state;
        let mut d_env = EnvDelta::default();
        act_anaerobic(&env, &mut d_env, &mut agent);

        assert!(d_env.vfa_conc < 0.0);
        assert!(d_env.op_conc > 0.0);
        assert!(agent.state.pha > before.pha);
        assert!(agent.state.glycogen < before.glycogen);
        assert!(agent.state.polyp < before.polyp);
        assert_eq!(agent.state.rela_count, before.rela_count);
        assert_eq!(agent.state.split_biomass, before.split_biomass);
    }

    #[test]
    fn anaerobic_uptake_conserves_cod() {
        // No maintenance or decay: glycogen + VFA taken up = PHA formed.
        let env = EnvState::new(10.0, 100.0, 5.0, false);
        let mut agent = pao();
        agent.traits.rate.m_anaerobic = 0.0;
        agent.traits.rate.b_anaerobic = 0.0;
        let before = agent.state;
        let mut d_env = EnvDelta::default();
        act_anaerobic(&env, &mut d_env, &mut agent);

        let d_glycogen = agent.state.glycogen - before.glycogen;
        let d_pha = agent.state.pha - before.pha;
        assert!((d_pha - (-d_glycogen - d_env.vfa_conc)).abs() < 1e-9);
    }

    #[test]
    fn tca_pathway_adds_uptake() {
        let env = EnvState::new(10.0, 100.0, 5.0, false);
        let mut plain = pao();
        let mut tca = pao();
        tca.traits.flags.enable_tca = true;
        let mut d_plain = EnvDelta::default();
        let mut d_tca = EnvDelta::default();
        act_anaerobic(&env, &mut d_plain, &mut plain);
        act_anaerobic(&env, &mut d_tca, &mut tca);
        assert!(d_tca.vfa_conc < d_plain.vfa_conc);
    }

    #[test]
    fn maintenance_priority_changes_source() {
        let env = EnvState::new(10.0, 0.0, 0.0, false);
        let mut glycogen_first = pao();
        glycogen_first.traits.rate.m_anaerobic = 1e-2;
        let mut polyp_first = glycogen_first;
        polyp_first.traits.flags.maint_polyp_first = true;
        let mut d = EnvDelta::default();
        act_anaerobic(&env, &mut d, &mut glycogen_first);
        act_anaerobic(&env, &mut d, &mut polyp_first);
        assert!(polyp_first.state.polyp < glycogen_first.state.polyp);
        assert!(polyp_first.state.glycogen > glycogen_first.state.glycogen);
    }

    #[test]
    fn aerobic_takes_up_phosphate_and_grows() {
        let env = EnvState::new(10.0, 0.0, 10.0, true);
        let mut agent = pao();
        let before = agent.state;
        let mut d_env = EnvDelta::default();
        act_aerobic(&env, &mut d_env, &mut agent);
        assert!(d_env.op_conc < 0.0);
        assert!(agent.state.pha < before.pha);
        assert!(agent.state.biomass > before.biomass);
    }

    #[test]
    fn inactive_agent_is_untouched() {
        let env = EnvState::new(10.0, 100.0, 10.0, true);
        let mut agent = pao();
        agent.state = AgentState::default();
        let mut d_env = EnvDelta::default();
        act_aerobic(&env, &mut d_env, &mut agent);
        act_anaerobic(&env, &mut d_env, &mut agent);
        assert_eq!(agent.state, AgentState::default());
        assert_eq!(d_env, EnvDelta::default());
    }
}
