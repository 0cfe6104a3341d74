//! Write-only per-episode metrics.

use crate::error::PgResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const POLICY_LOSS: &str = "policy loss";
pub const VALUE_LOSS: &str = "value loss";
pub const TOTAL_REWARD: &str = "total reward";
pub const AVERAGE_REWARD: &str = "average reward";
pub const STEPS: &str = "steps";
pub const POLICY_LEARNING_RATE: &str = "policy learning rate";
pub const DIVERGENCE: &str = "divergence";

pub type Metrics = BTreeMap<String, f64>;

pub trait TelemetrySink {
    fn write(&mut self, episode: usize, metrics: &Metrics) -> PgResult<()>;

    fn flush(&mut self) -> PgResult<()>;
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Box<T> {
    fn write(&mut self, episode: usize, metrics: &Metrics) -> PgResult<()> {
        (**self).write(episode, metrics)
    }

    fn flush(&mut self) -> PgResult<()> {
        (**self).flush()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    pub fn push(&mut self, x: f64) {
        self.sum += x;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Serialize)]
struct Record<'a> {
    episode: usize,
    metrics: &'a Metrics,
}

/// One JSON object per line: `{"episode":n,"metrics":{...}}`.
pub struct JsonLinesSink<W: Write> {
    out: BufWriter<W>,
}

impl JsonLinesSink<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> PgResult<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }

    pub fn into_inner(self) -> PgResult<W> {
        self.out.into_inner().map_err(|e| e.into_error().into())
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn write(&mut self, episode: usize, metrics: &Metrics) -> PgResult<()> {
        serde_json::to_writer(&mut self.out, &Record { episode, metrics })
            .map_err(std::io::Error::from)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> PgResult<()> {
        Ok(self.out.flush()?)
    }
}

/// Keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub records: Vec<(usize, Metrics)>,
    pub flushes: usize,
}

impl MemorySink {
    pub fn series(&self, name: &str) -> Vec<(usize, f64)> {
        self.records
            .iter()
            .filter_map(|(e, m)| m.get(name).map(|&v| (*e, v)))
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn write(&mut self, episode: usize, metrics: &Metrics) -> PgResult<()> {
        self.records.push((episode, metrics.clone()));
        Ok(())
    }

    fn flush(&mut self) -> PgResult<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn write(&mut self, _episode: usize, _metrics: &Metrics) -> PgResult<()> {
        Ok(())
    }

    fn flush(&mut self) -> PgResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::*;
    use serde_json::Value;

    #[test]
    fn running_mean() {
        let mut m = RunningMean::default();
        assert_eq!(m.mean(), None);
        for x in [1., 2., 6.] {
            m.push(x);
        }
        assert_eq!(m.count(), 3);
        assert_float_eq!(m.mean().unwrap(), 3., abs <= 1e-12);
    }

    #[test]
    fn json_lines_one_record_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let metrics = Metrics::from([
            (TOTAL_REWARD.to_string(), 21.),
            (POLICY_LOSS.to_string(), 0.25),
        ]);

        sink.write(0, &metrics).unwrap();
        sink.write(1, &metrics).unwrap();
        sink.flush().unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let v: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(v["episode"], 1);
        assert_eq!(v["metrics"]["total reward"], 21.0);
        assert_eq!(v["metrics"]["policy loss"], 0.25);
    }

    #[test]
    fn memory_sink_series() {
        let mut sink = MemorySink::default();
        sink.write(3, &Metrics::from([(STEPS.to_string(), 9.)])).unwrap();
        sink.write(4, &Metrics::new()).unwrap();

        assert_eq!(sink.series(STEPS), vec![(3, 9.)]);
    }
}
