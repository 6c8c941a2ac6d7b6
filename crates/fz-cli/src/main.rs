use anyhow::{Context, Result};
use clap::Parser;
use fz_calculators::CalculatorConfig;
use fz_core::{Case, Cancellation};
use fz_driver::{Algorithm, RandomUniformAlgorithm};
use fz_scheduler::{Callbacks, Engine, EngineConfig};
use fz_template::case_gen::{enumerate_cartesian, enumerate_rows};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;

use cli::{Cli, Commands};
use config::RunSpec;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Discover { spec } => discover(&spec),
        Commands::Compile { spec } => compile(&spec),
        Commands::Extract { spec, case_dir } => extract(&spec, &case_dir).await,
        Commands::Run { spec } => run(&spec).await,
        Commands::Drive { spec } => drive(&spec).await,
    }
}

fn init_tracing() {
    let fz_config = fz_config::Configuration::from_env();
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| tracing_subscriber::EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(fz_config.log_level.as_directive()));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .ok();
}

fn timestamp_suffix() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Rename a preexisting results directory aside and create a fresh one.
/// Existing run output is never deleted, only moved aside.
fn ensure_fresh_results_dir(results_dir: &Path) -> Result<()> {
    if results_dir.exists() {
        let renamed = results_dir.with_file_name(format!(
            "{}_{}",
            results_dir.file_name().and_then(|n| n.to_str()).unwrap_or("results"),
            timestamp_suffix()
        ));
        std::fs::rename(results_dir, &renamed)
            .with_context(|| format!("failed to rename existing {}", results_dir.display()))?;
        tracing::info!(from = %results_dir.display(), to = %renamed.display(), "renamed existing results directory");
    }
    std::fs::create_dir_all(results_dir)
        .with_context(|| format!("failed to create {}", results_dir.display()))?;
    Ok(())
}

fn enumerated_cases(spec: &RunSpec) -> Vec<Case> {
    if let Some((columns, rows)) = spec.table_rows() {
        enumerate_rows(&columns, &rows)
    } else {
        enumerate_cartesian(&spec.cartesian_vars(), &spec.group_variables)
    }
}

fn discover(spec_path: &Path) -> Result<()> {
    let spec = RunSpec::load(spec_path)?;
    let model = spec.model()?;
    let discovered = fz_template::discover_variables(&spec.template, &model)?;
    println!("{}", serde_json::to_string_pretty(&discovered)?);
    Ok(())
}

fn compile(spec_path: &Path) -> Result<()> {
    let spec = RunSpec::load(spec_path)?;
    let model = spec.model()?;
    ensure_fresh_results_dir(&spec.results_dir)?;

    let cases = enumerated_cases(&spec);
    let compiled = fz_template::compile_cases(&spec.template, &cases, &model, &spec.results_dir, &timestamp_suffix())?;

    for c in &compiled {
        println!("{}", c.dir.display());
    }
    Ok(())
}

async fn extract(spec_path: &Path, case_dir: &Path) -> Result<()> {
    let spec = RunSpec::load(spec_path)?;
    let model = spec.model()?;
    let shell_path = fz_process::ShellPathResolver::new(model_shell_path());
    let outputs = fz_extract::extract_outputs(case_dir, &model, &shell_path).await?;
    let as_map: std::collections::HashMap<&str, &fz_core::Value> =
        outputs.iter().map(|o| (o.name.as_str(), &o.value)).collect();
    println!("{}", serde_json::to_string_pretty(&as_map)?);
    Ok(())
}

fn model_shell_path() -> Option<String> {
    let fz_config = fz_config::Configuration::from_env();
    fz_config.shell_path
}

fn calculator_config(submitter_cwd: std::path::PathBuf) -> CalculatorConfig {
    let fz_config = fz_config::Configuration::from_env();
    CalculatorConfig {
        shell_path: Arc::new(fz_process::ShellPathResolver::new(fz_config.shell_path)),
        submitter_cwd,
        ssh_auto_accept_hostkeys: fz_config.ssh_auto_accept_hostkeys,
        ssh_keepalive_secs: fz_config.ssh_keepalive_secs,
        funz_bind_port: 0,
        funz_discovery_timeout: Duration::from_secs(2),
    }
}

fn engine_config(spec: &RunSpec) -> Result<EngineConfig> {
    let fz_config = fz_config::Configuration::from_env();
    Ok(EngineConfig {
        calculator_uris: spec.calculator_uris()?,
        retry_budget: fz_config.max_retries,
        max_workers: fz_config.max_workers,
    })
}

fn install_ctrlc_handler(cancellation: Cancellation) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt, cancelling run");
            cancellation.cancel();
        }
    });
}

async fn run(spec_path: &Path) -> Result<()> {
    let spec = RunSpec::load(spec_path)?;
    let model = spec.model()?;
    ensure_fresh_results_dir(&spec.results_dir)?;

    let cases = enumerated_cases(&spec);
    let compiled = fz_template::compile_cases(&spec.template, &cases, &model, &spec.results_dir, &timestamp_suffix())?;

    let cancellation = Cancellation::new();
    install_ctrlc_handler(cancellation.clone());

    let engine = Engine::new(model, calculator_config(spec.results_dir.clone()), engine_config(&spec)?, cancellation);

    let total = compiled.len();
    let callbacks = Callbacks {
        on_progress: Some(Arc::new(move |completed, total| {
            tracing::info!(completed, total, "run progress");
        })),
        ..Default::default()
    };

    let results = engine.run(compiled, callbacks).await;
    let table = fz_assemble::assemble(results);

    for row in &table.rows {
        println!(
            "{}\t{}\t{}",
            row.case.suffix(),
            row.status,
            row.error.as_deref().unwrap_or("")
        );
    }
    tracing::info!(rows = total, "run complete");
    Ok(())
}

async fn drive(spec_path: &Path) -> Result<()> {
    let spec = RunSpec::load(spec_path)?;
    let model = spec.model()?;
    let driver_spec = spec
        .driver
        .as_ref()
        .context("run spec has no [driver] section; fzd requires one")?;
    ensure_fresh_results_dir(&spec.results_dir)?;

    let cancellation = Cancellation::new();
    install_ctrlc_handler(cancellation.clone());

    let algorithm: Box<dyn Algorithm + Send> =
        Box::new(RandomUniformAlgorithm::new(driver_spec.batch_size, driver_spec.max_iterations));

    let outcome = fz_driver::run_iterative(
        &spec.template,
        driver_spec.input_ranges.clone(),
        driver_spec.fixed_vars.clone(),
        model,
        &driver_spec.output_expression,
        algorithm,
        calculator_config(spec.results_dir.clone()),
        engine_config(&spec)?,
        &spec.results_dir,
        cancellation,
    )
    .await?;

    println!("evaluated {} points", outcome.inputs.len());
    if let Some(text) = &outcome.analysis.text {
        println!("{text}");
    }
    Ok(())
}
