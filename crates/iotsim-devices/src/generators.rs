//! Stateful value generators for telemetry attributes.
//!
//! A generator is constructed once per attribute when a device starts and
//! lives for the lifetime of that telemetry task. `generate` must be
//! non-blocking and perform no I/O — replay generators read their data file
//! once, at construction time, never again.

use std::f64::consts::PI;
use std::fs;
use std::sync::Mutex;

use rand::distributions::{Distribution as _, Uniform};
use rand::Rng;
use rand_distr::{Exp, Normal};
use serde_json::Value;

use iotsim_core::types::Distribution as DistKind;

use crate::model::GeneratorConfig;

/// A stateful producer of telemetry values.
///
/// Implementors own whatever state they need to advance between calls
/// (current sequence value, replay cursor, sine tick...). The shared process
/// RNG (`rand::thread_rng`) backs the random variants; tests that need
/// determinism construct generators directly rather than going through the
/// factory.
pub trait Generator: Send {
    fn generate(&mut self) -> Value;
    fn reset(&mut self);
}

/// Build a generator from its configuration. An unrecognised `type` tag is
/// impossible to construct here (serde already rejected it at deserialize
/// time); this module's only "unknown" case is a distribution string inside
/// a `Random` config, which `parse_distribution` falls back to uniform for.
pub fn build(config: &GeneratorConfig) -> Box<dyn Generator> {
    match config {
        GeneratorConfig::Random {
            min,
            max,
            distribution,
            mean,
            stddev,
            rate,
        } => Box::new(RandomGenerator::new(*min, *max, *distribution, *mean, *stddev, *rate)),
        GeneratorConfig::Sequence {
            start,
            step,
            min,
            max,
            wrap,
        } => Box::new(SequenceGenerator::new(*start, *step, *min, *max, *wrap)),
        GeneratorConfig::Constant { value } => Box::new(ConstantGenerator::new(value.clone())),
        GeneratorConfig::Replay {
            data_file,
            loop_replay,
        } => Box::new(ReplayGenerator::from_file(data_file, *loop_replay)),
        GeneratorConfig::Sine {
            min,
            max,
            period_ms,
            phase,
        } => Box::new(SineGenerator::new(*min, *max, *period_ms, *phase)),
    }
}

/// Random generator over uniform/normal/exponential distributions, clamped
/// to `[min, max]` for normal and exponential (the source's behaviour —
/// documented as a known skew in `DESIGN.md`, not corrected here).
pub struct RandomGenerator {
    min: f64,
    max: f64,
    distribution: DistKind,
    mean: f64,
    stddev: f64,
    rate: f64,
}

impl RandomGenerator {
    pub fn new(
        min: f64,
        max: f64,
        distribution: DistKind,
        mean: Option<f64>,
        stddev: Option<f64>,
        rate: Option<f64>,
    ) -> Self {
        let mean = mean.unwrap_or((min + max) / 2.0);
        let stddev = stddev.unwrap_or(((max - min) / 6.0).abs()).max(1e-9);
        let rate = rate.unwrap_or(1.0);
        RandomGenerator {
            min,
            max,
            distribution,
            mean,
            stddev,
            rate,
        }
    }

    fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min.min(self.max), self.min.max(self.max))
    }
}

impl Generator for RandomGenerator {
    fn generate(&mut self) -> Value {
        let mut rng = rand::thread_rng();
        let sample = match self.distribution {
            DistKind::Uniform => {
                let lo = self.min.min(self.max);
                let hi = self.min.max(self.max);
                if (hi - lo).abs() < f64::EPSILON {
                    lo
                } else {
                    Uniform::new_inclusive(lo, hi).sample(&mut rng)
                }
            }
            DistKind::Normal => {
                let dist = Normal::new(self.mean, self.stddev).unwrap_or_else(|_| {
                    Normal::new(self.mean, 1e-9).expect("fallback normal is valid")
                });
                self.clamp(dist.sample(&mut rng))
            }
            DistKind::Exponential => {
                let rate = if self.rate <= 0.0 { 1.0 } else { self.rate };
                let dist = Exp::new(rate).unwrap_or_else(|_| Exp::new(1.0).expect("rate=1 valid"));
                self.clamp(dist.sample(&mut rng))
            }
        };
        json_number(sample)
    }

    fn reset(&mut self) {}
}

/// Deterministic arithmetic sequence with optional bound wrapping.
pub struct SequenceGenerator {
    start: f64,
    current: f64,
    step: f64,
    min: Option<f64>,
    max: Option<f64>,
    wrap: bool,
}

impl SequenceGenerator {
    pub fn new(start: f64, step: f64, min: Option<f64>, max: Option<f64>, wrap: bool) -> Self {
        SequenceGenerator {
            start,
            current: start,
            step,
            min,
            max,
            wrap,
        }
    }
}

impl Generator for SequenceGenerator {
    fn generate(&mut self) -> Value {
        let value = self.current;
        let next = self.current + self.step;
        self.current = if self.wrap {
            if let Some(max) = self.max {
                if self.step >= 0.0 && next > max {
                    self.min.unwrap_or(self.start)
                } else if let Some(min) = self.min {
                    if self.step < 0.0 && next < min {
                        max
                    } else {
                        next
                    }
                } else {
                    next
                }
            } else if let Some(min) = self.min {
                if self.step < 0.0 && next < min {
                    self.start
                } else {
                    next
                }
            } else {
                next
            }
        } else {
            next
        };
        json_number(value)
    }

    fn reset(&mut self) {
        self.current = self.start;
    }
}

/// Always returns the configured value untouched.
pub struct ConstantGenerator {
    value: Value,
}

impl ConstantGenerator {
    pub fn new(value: Value) -> Self {
        ConstantGenerator { value }
    }
}

impl Generator for ConstantGenerator {
    fn generate(&mut self) -> Value {
        self.value.clone()
    }

    fn reset(&mut self) {}
}

/// Replays a pre-loaded sequence of values read once at construction.
pub struct ReplayGenerator {
    data: Vec<Value>,
    index: usize,
    loop_replay: bool,
}

impl ReplayGenerator {
    pub fn new(data: Vec<Value>, loop_replay: bool) -> Self {
        ReplayGenerator {
            data,
            index: 0,
            loop_replay,
        }
    }

    /// Load a JSON array file at construction time. A missing or malformed
    /// file yields an empty replay set, which always produces `null` — the
    /// telemetry task keeps running rather than failing device start.
    pub fn from_file(path: &str, loop_replay: bool) -> Self {
        let data = fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str::<Vec<Value>>(&s).ok())
            .unwrap_or_default();
        ReplayGenerator::new(data, loop_replay)
    }
}

impl Generator for ReplayGenerator {
    fn generate(&mut self) -> Value {
        if self.data.is_empty() {
            return Value::Null;
        }
        let value = self.data[self.index].clone();
        if self.index + 1 >= self.data.len() {
            self.index = if self.loop_replay { 0 } else { self.data.len() - 1 };
        } else {
            self.index += 1;
        }
        value
    }

    fn reset(&mut self) {
        self.index = 0;
    }
}

/// `offset + amp * sin(2*pi*tick/period + phase)`, advancing `tick` once per
/// call. `offset`/`amp` are derived from `min`/`max` so the wave stays within
/// the configured band.
pub struct SineGenerator {
    offset: f64,
    amplitude: f64,
    period_ms: u64,
    phase: f64,
    tick: u64,
}

impl SineGenerator {
    pub fn new(min: f64, max: f64, period_ms: u64, phase: f64) -> Self {
        SineGenerator {
            offset: (min + max) / 2.0,
            amplitude: (max - min) / 2.0,
            period_ms: period_ms.max(1),
            phase,
            tick: 0,
        }
    }
}

impl Generator for SineGenerator {
    fn generate(&mut self) -> Value {
        let tick = self.tick;
        self.tick += 1;
        let angle = 2.0 * PI * (tick as f64) / (self.period_ms as f64) + self.phase;
        json_number(self.offset + self.amplitude * angle.sin())
    }

    fn reset(&mut self) {
        self.tick = 0;
    }
}

/// Seeded wrapper used only by tests that need reproducible random samples
/// without touching the process RNG — an optional affordance the design
/// notes call out, not part of the public generator contract.
#[cfg(test)]
pub struct SeededUniform {
    min: f64,
    max: f64,
    rng: Mutex<rand::rngs::StdRng>,
}

#[cfg(test)]
impl SeededUniform {
    pub fn new(min: f64, max: f64, seed: u64) -> Self {
        use rand::SeedableRng;
        SeededUniform {
            min,
            max,
            rng: Mutex::new(rand::rngs::StdRng::seed_from_u64(seed)),
        }
    }
}

#[cfg(test)]
impl Generator for SeededUniform {
    fn generate(&mut self) -> Value {
        let mut rng = self.rng.lock().expect("rng mutex poisoned");
        json_number(rng.gen_range(self.min..=self.max))
    }

    fn reset(&mut self) {}
}

fn json_number(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
