//! sim-runner: headless runner for rule-driven population worlds.
//!
//! Usage:
//!   sim-runner --config demos/smokers.json
//!   sim-runner --config world.json --seed 12345 --env tax=12.5
//!   sim-runner --config world.json --ipc-mode

use anyhow::{anyhow, Context, Result};
use popsim_core::{
    command::RunCommand,
    config::WorldConfig,
    engine::SimEngine,
    snapshot::{RunResult, WorldSnapshot},
    value::Value,
};
use std::env;
use std::fs;
use std::io::{self, BufRead, Write};

#[derive(serde::Serialize)]
struct UiState {
    paused: bool,
    snapshot: WorldSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<RunResult>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].clone())
        .ok_or_else(|| anyhow!("usage: sim-runner --config <world.json> [--seed N] [--env name=value] [--ipc-mode]"))?;
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");

    let json = fs::read_to_string(&config_path)
        .with_context(|| format!("reading world descriptor {config_path}"))?;
    let mut config = WorldConfig::from_json(&json)?;
    if let Some(seed) = parse_arg::<u64>(&args, "--seed") {
        config.seed = Some(seed);
    }

    let mut engine = SimEngine::build(&config)?;
    for pair in args.windows(2).filter(|w| w[0] == "--env") {
        apply_override(&mut engine, &pair[1])?;
    }

    if !ipc_mode {
        println!("sim-runner");
        println!("  config:    {config_path}");
        println!("  run_id:    {}", engine.run_id);
        println!("  seed:      {}", engine.world().seed());
        println!();
    }

    engine.start()?;
    if ipc_mode {
        run_ipc_loop(&mut engine, io::stdin().lock(), io::stdout())?;
    } else {
        let result = engine.run_to_completion()?;
        print_summary(&engine, &result);
    }

    Ok(())
}

/// `name=value`, typed by the environment variable's declaration.
fn apply_override(engine: &mut SimEngine, pair: &str) -> Result<()> {
    let (name, text) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("--env expects name=value, got '{pair}'"))?;
    let ty = engine
        .world()
        .environment()
        .definition(name)
        .map(|d| d.ty)
        .ok_or_else(|| anyhow!("unknown environment variable '{name}'"))?;
    let value = Value::parse_as(text, ty)
        .ok_or_else(|| anyhow!("'{text}' is not a valid {ty} for '{name}'"))?;
    log::info!("runner: environment '{name}' fixed to {value}");
    engine.world_mut().set_environment(name, value)?;
    Ok(())
}

fn run_ipc_loop(engine: &mut SimEngine, mut input: impl BufRead, mut out: impl Write) -> Result<()> {
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = input.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: RunCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("ipc: ignoring malformed command {:?}: {e}", buffer.trim());
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(out, "{}", err_json)?;
                out.flush()?;
                continue;
            }
        };

        match cmd {
            RunCommand::Quit => break,
            RunCommand::Tick { count } => {
                if !engine.is_completed() {
                    engine.run_ticks(count)?;
                }
            }
            RunCommand::Pause => engine.pause(),
            RunCommand::Resume => engine.resume(),
            RunCommand::Stop => engine.stop(),
            RunCommand::GetState => {}
        }
        let state = UiState {
            paused: engine.control().is_paused(),
            snapshot: engine.snapshot(),
            result: engine.result(),
        };
        writeln!(out, "{}", serde_json::to_string(&state)?)?;
        out.flush()?;
    }
    Ok(())
}

fn print_summary(engine: &SimEngine, result: &RunResult) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", result.run_id);
    println!("  termination:    {}", result.termination);
    println!("  ticks run:      {}", result.ticks);
    println!("  elapsed:        {}s", result.elapsed_seconds);
    println!("  events logged:  {}", engine.events().len());

    println!();
    println!("=== POPULATION ===");
    for (name, initial) in &result.initial_populations {
        let last = result.final_populations.get(name).copied().unwrap_or(0);
        println!("  {name:<16} {initial:>6} -> {last:>6}");
    }

    let snapshot = engine.snapshot();
    println!();
    println!("=== PROPERTY AVERAGES ===");
    for definition in engine.world().population().definitions() {
        for property in definition.properties() {
            if let Some(avg) = snapshot.property_average(&definition.name, &property.name) {
                let consistency = snapshot
                    .consistency_average(&definition.name, &property.name)
                    .unwrap_or(0.0);
                println!(
                    "  {}.{:<20} avg {avg:>10.2} | consistency {consistency:.2}",
                    definition.name, property.name
                );
            }
        }
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
}
