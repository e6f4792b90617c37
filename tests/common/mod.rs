//! Synthetic telemetry fixtures shared by the integration tests

#![allow(dead_code)]

use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::path::Path;
use telemetry_forest::config::TrainingConfig;

pub const FEATURES: [&str; 5] = ["cpu_usage", "memory_usage", "net_in", "net_out", "load_one"];

pub const MEMORY_TOTAL_KB: f64 = 16_000_000.0;

/// One reading in model feature order, memory as a percentage
#[derive(Debug, Clone, Copy)]
pub struct Reading {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub net_in: f64,
    pub net_out: f64,
    pub load_one: f64,
}

impl Reading {
    pub const fn new(values: [f64; 5]) -> Self {
        Self {
            cpu_usage: values[0],
            memory_usage: values[1],
            net_in: values[2],
            net_out: values[3],
            load_one: values[4],
        }
    }

    pub fn values(&self) -> [f64; 5] {
        [self.cpu_usage, self.memory_usage, self.net_in, self.net_out, self.load_one]
    }

    pub fn memory_used_kb(&self) -> f64 {
        self.memory_usage / 100.0 * MEMORY_TOTAL_KB
    }

    /// Feature name -> value map
    pub fn features(&self) -> HashMap<String, f64> {
        FEATURES
            .iter()
            .zip(self.values())
            .map(|(name, v)| (name.to_string(), v))
            .collect()
    }
}

pub const NORMAL: Reading = Reading::new([25.0, 10.0, 2.0, 2.0, 0.5]);
pub const HIGH_CPU: Reading = Reading::new([96.5, 10.0, 500.0, 250.0, 5.0]);
pub const MEMORY_LEAK: Reading = Reading::new([30.0, 98.9, 100.0, 100.0, 1.0]);
pub const NETWORK_STORM: Reading = Reading::new([60.0, 70.0, 5000.0, 3000.0, 10.0]);

/// Roughly bell-shaped value in [center - spread, center + spread]
fn bell(rng: &mut impl Rng, center: f64, spread: f64) -> f64 {
    let u: f64 = (0..3).map(|_| rng.gen_range(-1.0..1.0)).sum::<f64>() / 3.0;
    center + u * spread
}

/// Reading from a healthy host, centred on [`NORMAL`]
pub fn normal_reading(rng: &mut impl Rng) -> Reading {
    Reading {
        cpu_usage: bell(rng, NORMAL.cpu_usage, 15.0),
        memory_usage: bell(rng, NORMAL.memory_usage, 5.0),
        net_in: bell(rng, NORMAL.net_in, 1.5),
        net_out: bell(rng, NORMAL.net_out, 1.5),
        load_one: bell(rng, NORMAL.load_one, 0.4),
    }
}

/// The four canonical scenarios
pub fn scenarios() -> Vec<(&'static str, Reading)> {
    vec![
        ("normal", NORMAL),
        ("high_cpu", HIGH_CPU),
        ("memory_leak", MEMORY_LEAK),
        ("network_storm", NETWORK_STORM),
    ]
}

/// Telemetry table shaped like the collector output, including drop-list
/// columns and a few missing values
pub fn telemetry_frame(n: usize, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut time = Vec::with_capacity(n);
    let mut system_id = Vec::with_capacity(n);
    let mut cpu = Vec::with_capacity(n);
    let mut used = Vec::with_capacity(n);
    let mut total = Vec::with_capacity(n);
    let mut net_in: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut net_out = Vec::with_capacity(n);
    let mut load_one = Vec::with_capacity(n);
    let mut load_five = Vec::with_capacity(n);

    for i in 0..n {
        let r = normal_reading(&mut rng);
        time.push(1_700_000_000i64 + i as i64 * 10);
        system_id.push("host-a");
        cpu.push(r.cpu_usage);
        used.push(r.memory_used_kb());
        total.push(MEMORY_TOTAL_KB);
        net_in.push(if i % 97 == 13 { None } else { Some(r.net_in) });
        net_out.push(r.net_out);
        load_one.push(r.load_one);
        load_five.push(r.load_one * 0.9);
    }

    df!(
        "time" => time,
        "system_id" => system_id,
        "cpu_usage" => cpu,
        "memory_used_kb" => used,
        "memory_total_kb" => total,
        "net_in" => net_in,
        "net_out" => net_out,
        "load_one" => load_one,
        "load_five" => load_five
    )
    .unwrap()
}

/// Small, fast configuration writing into `output_dir`
pub fn test_config(output_dir: &Path) -> TrainingConfig {
    TrainingConfig::default()
        .with_output_dir(output_dir)
        .with_contamination(0.10)
        .with_n_estimators(100)
        .with_random_state(42)
}
