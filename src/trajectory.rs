//! Periodic samples of a run, stored as consecutive MessagePack values.

use crate::engine::Engine;
use crate::env::EnvState;
use crate::variant::VariantSummary;
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    sync::atomic::AtomicBool,
};

/// Coarse view of the engine at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub env: EnvState,
    pub summaries: Vec<VariantSummary>,
}

impl Sample {
    pub fn of(engine: &Engine) -> Self {
        Self {
            time: engine.time(),
            env: *engine.env(),
            summaries: engine.summaries(),
        }
    }
}

/// Writes a [`Sample`] whenever at least `sample_interval` days have passed
/// since the previous one.
pub struct Recorder<W: Write> {
    writer: W,
    sample_interval: f64,
    next_time: f64,
    n_samples: usize,
    error: Option<anyhow::Error>,
}

impl<W: Write> Recorder<W> {
    pub fn new(writer: W, sample_interval: f64) -> Self {
        Self {
            writer,
            sample_interval,
            next_time: 0.0,
            n_samples: 0,
            error: None,
        }
    }

    /// Record `engine` if a sample is due. After a write error nothing more
    /// is recorded and the error is returned by [`Recorder::finish`].
    pub fn observe(&mut self, engine: &Engine) {
        if self.error.is_some() || engine.time() + 1e-9 * engine.timestep() < self.next_time {
            return;
        }
        if let Err(error) = self.write(engine) {
            self.error = Some(error);
            return;
        }
        self.next_time += self.sample_interval;

        let total = engine.total_duration();
        if total > 0.0 {
            let progress = 100.0 * engine.time() / total;
            log::debug!("completed {progress:06.2}%");
        }
    }

    fn write(&mut self, engine: &Engine) -> Result<()> {
        encode::write(&mut self.writer, &Sample::of(engine)).context("failed to serialize sample")?;
        self.n_samples += 1;
        Ok(())
    }

    /// Flush the writer and return the number of samples written.
    pub fn finish(mut self) -> Result<usize> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.writer.flush().context("failed to flush writer stream")?;
        Ok(self.n_samples)
    }
}

/// Run `engine` to the end, writing its trajectory to `file`.
///
/// Returns the number of samples written.
pub fn run_and_record<P: AsRef<Path>>(
    engine: &mut Engine,
    file: P,
    sample_interval: f64,
    cancel: &AtomicBool,
) -> Result<usize> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut recorder = Recorder::new(BufWriter::new(file), sample_interval);

    let outcome = engine.run_with_observer(cancel, |engine| recorder.observe(engine));
    let n_samples = recorder.finish().context("failed to write trajectory")?;
    outcome.context("failed to run simulation")?;

    log::info!("wrote {n_samples} samples");
    Ok(n_samples)
}

/// Read every sample of a trajectory file.
pub fn read_trajectory<P: AsRef<Path>>(file: P) -> Result<Vec<Sample>> {
    let file = file.as_ref();
    let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let mut reader = BufReader::new(file);

    let mut samples = Vec::new();
    while !reader
        .fill_buf()
        .context("failed to read trajectory")?
        .is_empty()
    {
        let sample = decode::from_read(&mut reader).context("failed to deserialize sample")?;
        samples.push(sample);
    }
    Ok(samples)
}
