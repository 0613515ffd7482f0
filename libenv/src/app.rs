//! # Command-line driver
//!
//! Runs the bundled families in-process through [`vecenv::Pool`], without
//! going through the C ABI. `spaces` prints a family's descriptors and
//! `rollout` steps a pool with random in-bounds actions and reports
//! throughput.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use envs::{Echo, GuessNumber, Ramp};
use space::{Scalar, Space, SpaceKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vecenv::{ActionBatch, EnvFamily, OptionValue, Options, Pool};

#[derive(Parser, Debug)]
#[command(name = "libenv", version, about = "Inspect and exercise the bundled environment families")]
pub struct Cli {
    /// Log filter in `EnvFilter` syntax, e.g. `vecenv=debug`.
    #[arg(long, global = true, default_value = "info")]
    pub log: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the space descriptors of a family.
    Spaces {
        family: Family,
        /// Creation option as `name=v1,v2,...` (int32 values). Repeatable.
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(String, Vec<i32>)>,
    },
    /// Step a pool with random actions and report steps per second.
    Rollout {
        family: Family,
        #[arg(long, default_value_t = 8)]
        num_envs: usize,
        #[arg(long, default_value_t = 1000)]
        steps: usize,
        /// Seeds both the pool and the action sampler.
        #[arg(long)]
        seed: Option<u32>,
        #[arg(long)]
        threads: Option<usize>,
        /// Creation option as `name=v1,v2,...` (int32 values). Repeatable.
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(String, Vec<i32>)>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Echo,
    #[value(name = "guess_number")]
    GuessNumber,
    Ramp,
}

/// Parses `name=1,2,3`.
fn parse_option(arg: &str) -> Result<(String, Vec<i32>)> {
    let (name, values) = arg.split_once('=').context("expected name=values")?;
    if name.is_empty() {
        bail!("empty option name");
    }
    let values = values
        .split(',')
        .map(|v| v.trim().parse::<i32>().with_context(|| format!("`{v}` is not an int32")))
        .collect::<Result<Vec<_>>>()?;
    Ok((name.to_owned(), values))
}

fn build_options(pairs: &[(String, Vec<i32>)]) -> Result<Options> {
    let mut options = Options::new();
    for (name, values) in pairs {
        options.insert(name.clone(), OptionValue::I32(values.clone()))?;
    }
    Ok(options)
}

/// Runs the parsed command line.
///
/// # Errors
///
/// Returns any error from option parsing, pool creation or stepping.
pub fn run(cli: Cli) -> Result<()> {
    let filter = EnvFilter::try_new(&cli.log).with_context(|| format!("bad log filter `{}`", cli.log))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Spaces { family, options } => {
            let options = build_options(&options)?;
            match family {
                Family::Echo => spaces::<Echo>(&options),
                Family::GuessNumber => spaces::<GuessNumber>(&options),
                Family::Ramp => spaces::<Ramp>(&options),
            }
        }
        Command::Rollout {
            family,
            num_envs,
            steps,
            seed,
            threads,
            options,
        } => {
            let mut options = build_options(&options)?;
            if let Some(seed) = seed {
                options.insert("seed", OptionValue::I32(vec![i32::from_ne_bytes(seed.to_ne_bytes())]))?;
            }
            if let Some(threads) = threads {
                options.insert("num_threads", OptionValue::I32(vec![i32::try_from(threads)?]))?;
            }
            let rollout = Rollout {
                num_envs,
                steps,
                seed: seed.map_or_else(|| fastrand::u64(..), u64::from),
            };
            match family {
                Family::Echo => rollout.run::<Echo>(&options),
                Family::GuessNumber => rollout.run::<GuessNumber>(&options),
                Family::Ramp => rollout.run::<Ramp>(&options),
            }
        }
    }
}

fn spaces<F: EnvFamily>(options: &Options) -> Result<()> {
    let pool = Pool::<F>::make(1, options)?;
    println!("{}", F::NAME);
    for kind in SpaceKind::ALL {
        for space in pool.registry().spaces(kind) {
            println!("  {}", describe(space));
        }
    }
    pool.close()?;
    Ok(())
}

fn describe(space: &Space) -> String {
    format!(
        "{:<11} {:<20} {:?} {} {:?} [{:?}, {:?}]",
        space.kind().to_string(),
        space.name(),
        space.space_type(),
        space.dtype(),
        space.shape(),
        space.low(),
        space.high(),
    )
}

struct Rollout {
    num_envs: usize,
    steps: usize,
    seed: u64,
}

impl Rollout {
    fn run<F: EnvFamily>(&self, options: &Options) -> Result<()> {
        let mut pool = Pool::<F>::make(self.num_envs, options)?;
        info!(family = F::NAME, num_envs = self.num_envs, threads = pool.threads(), "rollout");
        let rng = fastrand::Rng::with_seed(self.seed);
        let action_spaces = pool.registry().spaces(SpaceKind::Action).to_vec();

        pool.reset()?;
        let mut episodes = 0usize;
        let mut total_reward = 0f64;
        let mut failures = 0usize;
        let started = Instant::now();
        for _ in 0..self.steps {
            // one buffer per (space, env), space-major
            let actions: Vec<Vec<u8>> = action_spaces
                .iter()
                .flat_map(|space| (0..self.num_envs).map(|_| sample(space, &rng)).collect::<Vec<_>>())
                .collect();
            let batch = pool.step(&ActionBatch::new(actions.iter().map(Vec::as_slice).collect()))?;
            episodes += batch.dones().iter().filter(|&&d| d).count();
            total_reward += batch.rewards().iter().map(|&r| f64::from(r)).sum::<f64>();
            failures += batch.failures().count();
        }
        let elapsed = started.elapsed();
        pool.close()?;

        if failures > 0 {
            warn!(failures, "some instance steps failed");
        }
        #[allow(clippy::cast_precision_loss)]
        let per_sec = (self.steps * self.num_envs) as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        println!(
            "{}: {} steps x {} envs in {:.3?} ({per_sec:.0} env-steps/s), {episodes} episodes, total reward {total_reward}",
            F::NAME,
            self.steps,
            self.num_envs,
            elapsed,
        );
        Ok(())
    }
}

/// Uniform random bytes for one action buffer, within the space's bounds.
fn sample(space: &Space, rng: &fastrand::Rng) -> Vec<u8> {
    let count = space.element_count();
    match (space.low(), space.high()) {
        (Scalar::U8(lo), Scalar::U8(hi)) => (0..count).map(|_| rng.u8(lo..=hi)).collect(),
        (Scalar::I32(lo), Scalar::I32(hi)) => (0..count).flat_map(|_| rng.i32(lo..=hi).to_ne_bytes()).collect(),
        (Scalar::F32(lo), Scalar::F32(hi)) => (0..count)
            .flat_map(|_| (lo + rng.f32() * (hi - lo)).to_ne_bytes())
            .collect(),
        _ => vec![0; space.byte_len()],
    }
}
