//! Runs a Lua script pack through several reloads and checks that every
//! reload leaves the registries in the same state as the first run.
//!
//! ```text
//! test-runner scripts/run_config.json --reloads 5
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use scriptbox_lua::{DeferredActions, LuaEngine, RegistryBinding, SharedRegistry};
use scriptbox_runtime::{
    EngineConfig, RunConfig, RunReport, Sandbox, UnitOutcome, ValidationError, VirtualizedRegistry,
};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "test-runner")]
#[command(about = "Checks that a script pack converges across reloads.", long_about = None)]
struct Cli {
    /// Run config of the pack
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Reloads after the first run
    #[arg(long, default_value_t = 3)]
    reloads: usize,

    /// Give units the io, os and package libraries
    #[arg(long)]
    privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct Recipe {
    output: String,
    inputs: Vec<String>,
}

impl Recipe {
    fn new(output: &str, inputs: &[&str]) -> Self {
        Self {
            output: output.to_string(),
            inputs: inputs.iter().map(|input| input.to_string()).collect(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::new(format!("Error adding recipe for '{}'", self.output))
            .add_if(self.output.is_empty(), "the output must not be empty")
            .add_if(self.inputs.len() < 2, "an alloy needs at least two inputs")
            .into_result()
    }
}

fn baseline_recipes() -> Vec<Recipe> {
    vec![
        Recipe::new("bronze", &["copper", "tin"]),
        Recipe::new("brass", &["copper", "zinc"]),
        Recipe::new("glass", &["sand", "ash"]),
    ]
}

/// Result of one run or reload
#[derive(Debug)]
struct Cycle {
    report: RunReport,
    recipes: Vec<Recipe>,
}

/// Result of a whole pack check
#[derive(Debug)]
struct Outcome {
    cycles: Vec<Cycle>,
}

impl Outcome {
    /// Index of the first cycle that differs from the first run
    fn first_divergence(&self) -> Option<usize> {
        let first = &self.cycles.first()?.recipes;
        self.cycles.iter().position(|cycle| cycle.recipes != *first)
    }

    fn failed_units(&self) -> usize {
        self.cycles
            .iter()
            .map(|cycle| cycle.report.count(UnitOutcome::Failed))
            .sum()
    }
}

struct Pack {
    sandbox: Sandbox<LuaEngine, RunConfig>,
    recipes: SharedRegistry<Recipe, Vec<Recipe>>,
    deferred: DeferredActions,
}

impl Pack {
    fn open(path: &Path, privileged: bool) -> Result<Self> {
        let config =
            RunConfig::load(path).with_context(|| format!("load run config: {}", path.display()))?;
        log::info!("Loaded pack '{}' with {} roots", config.name, config.roots.len());

        let engine_config = EngineConfig {
            privileged,
            ..EngineConfig::default()
        };
        let mut sandbox = Sandbox::<LuaEngine, _>::new(config.roots.clone(), config)?
            .with_engine_config(engine_config);

        let recipes = Arc::new(Mutex::new(VirtualizedRegistry::new("Recipes", baseline_recipes())));
        let binding = RegistryBinding::new(Arc::clone(&recipes)).with_validator(Recipe::validate);
        sandbox.register_binding("Recipes", binding.into_binding())?;
        sandbox.register_reloadable(Arc::clone(&recipes));

        let deferred = DeferredActions::new();
        sandbox.register_binding("defer", deferred.binding())?;
        sandbox.register_reloadable(deferred.clone());

        Ok(Self {
            sandbox,
            recipes,
            deferred,
        })
    }

    fn cycle(&mut self, reload: bool) -> Result<Cycle> {
        let report = if reload {
            self.sandbox.reload()?
        } else {
            self.sandbox.run()?
        };

        if let Some(engine) = self.sandbox.engine() {
            let summary = self.deferred.run_pending(engine, &mut self.sandbox.invoker());
            log::debug!(
                "Deferred actions: {} completed, {} failed",
                summary.completed,
                summary.failed
            );
        }

        let mut recipes = self
            .recipes
            .lock()
            .map_err(|_| anyhow::anyhow!("recipe registry lock poisoned"))?
            .host()
            .clone();
        recipes.sort();
        Ok(Cycle { report, recipes })
    }
}

fn check_pack(path: &Path, reloads: usize, privileged: bool) -> Result<Outcome> {
    let mut pack = Pack::open(path, privileged)?;
    let mut cycles = Vec::with_capacity(reloads.saturating_add(1));
    cycles.push(pack.cycle(false)?);
    for _ in 0..reloads {
        cycles.push(pack.cycle(true)?);
    }
    Ok(Outcome { cycles })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match try_main() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<bool> {
    let cli = Cli::parse();
    let outcome = check_pack(&cli.config, cli.reloads, cli.privileged)?;

    if let Some(cycle) = outcome.cycles.last() {
        for recipe in &cycle.recipes {
            log::info!("{} <- {}", recipe.output, recipe.inputs.join(" + "));
        }
    }

    match outcome.first_divergence() {
        Some(index) => {
            log::error!("Reload {} diverged from the first run", index);
            Ok(false)
        }
        None => {
            log::info!(
                "{} cycles converged ({} unit failures)",
                outcome.cycles.len(),
                outcome.failed_units()
            );
            Ok(outcome.failed_units() == 0)
        }
    }
}
