use ebpr_abm::trajectory::read_trajectory;
use std::{env, fs, path::PathBuf, process::Command};

const CONFIG: &str = r#"
[engine]
seed = 7
mode = "discrete"
timestep = 0.001

[init_env]
volume = 1.0
vfa_conc = 0.0
op_conc = 10.0

[[stages]]
n_cycle = 2

[[stages.phases]]
duration = 0.005
inflow_rate = 100.0
inflow_vfa_conc = 300.0
inflow_op_conc = 10.0

[[stages.phases]]
duration = 0.05

[[stages.phases]]
duration = 0.06
aeration = true

[[stages.phases]]
duration = 0.005
outflow_rate = 100.0

[[variants]]
kind = "pao"
n_agent = 40

[variants.state]
biomass = { kind = "normal", mean = 2000.0, stddev = 100.0 }
split_biomass = { kind = "normal", mean = 4000.0, stddev = 100.0 }
glycogen = 500.0
pha = 40.0
polyp = 400.0

[variants.traits]
mu = 1.0
q_glycogen = 1.1
q_pha = 6.0
q_polyp = 1.5
m_aerobic = 0.2
m_anaerobic = 0.05
b_aerobic = 0.1
b_anaerobic = 0.05
x_glycogen_min = 0.05
x_glycogen_max = 0.45
x_pha_max = 0.5
x_polyp_min = 0.01
x_polyp_max = 0.35
k_hac = 4.0
k_op = 0.1
k_op_polyp = 0.2
k_glycogen = 0.05
k_pha = 0.1
k_polyp = 0.05
ki_glycogen = 0.1
ki_pha = 0.1
ki_polyp = 0.05
y_h = 0.6
y_glycogen_pha = 0.9
y_polyp_pha = 0.3
y_pha_hac = 1.35
y_prel = 0.4
i_bmp = 0.02
enable_tca = { kind = "bernoulli", mean = 0.5 }

[[variants]]
kind = "gao"
n_agent = 10

[variants.state]
biomass = 500.0
split_biomass = 1000.0
glycogen = 125.0
pha = 10.0

[variants.traits]
mu = 1.0
q_glycogen = 1.1
q_pha = 5.0
m_aerobic = 0.2
m_anaerobic = 0.05
b_aerobic = 0.1
b_anaerobic = 0.05
x_glycogen_min = 0.05
x_glycogen_max = 0.45
x_pha_max = 0.5
k_hac = 4.0
k_op = 0.1
k_glycogen = 0.05
k_pha = 0.1
ki_glycogen = 0.1
ki_pha = 0.1
y_h = 0.6
y_glycogen_pha = 0.9
y_pha_hac = 1.35
i_bmp = 0.02

[output]
sample_interval = 0.01
"#;

fn run_bin(args: &[&str]) -> bool {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_ebpr-abm"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");
    println!("{args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n");

    output.status.success()
}

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    fs::write(&config_path, CONFIG).expect("failed to write config file");
    let output_path = test_dir.join("trajectory.msgpack");

    let config_str = config_path
        .to_str()
        .expect("failed to convert config path to string");
    let output_str = output_path
        .to_str()
        .expect("failed to convert output path to string");

    assert!(run_bin(&["check", "--config", config_str]));
    assert!(run_bin(&["run", "--config", config_str, "--output", output_str]));

    let samples = read_trajectory(&output_path).expect("failed to read trajectory");
    assert!(samples.len() >= 20);
    assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
    let last = samples.last().expect("no samples");
    assert!((last.time - 0.24).abs() < 1e-9);
    assert_eq!(last.summaries.len(), 2);
    assert_eq!(last.summaries[0].n_agent, 40);
    assert_eq!(last.summaries[1].n_agent, 10);
    assert!((last.env.volume - 1.0).abs() < 1e-9);

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_fails() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("invalid_config_fails");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config_str = config_path
        .to_str()
        .expect("failed to convert config path to string");

    // Missing file.
    assert!(!run_bin(&["check", "--config", config_str]));

    // Bernoulli mean out of range is caught by the engine checks.
    let contents = CONFIG.replace("mean = 0.5", "mean = 1.5");
    fs::write(&config_path, contents).expect("failed to write config file");
    assert!(!run_bin(&["check", "--config", config_str]));

    // Zero timestep.
    let contents = CONFIG.replace("timestep = 0.001", "timestep = 0.0");
    fs::write(&config_path, contents).expect("failed to write config file");
    assert!(!run_bin(&["check", "--config", config_str]));

    fs::remove_dir_all(&test_dir).ok();
}
