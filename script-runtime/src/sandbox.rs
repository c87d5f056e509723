//! Execution orchestrator
//!
//! A [`Sandbox`] owns the environment roots, the binding namespace and the
//! engine of the last run. Each [`Sandbox::run`] walks the state machine
//!
//! ```text
//! Idle -> Preparing -> RunningClassUnits -> RunningScriptUnits -> Idle
//! ```
//!
//! Class units run first so the definitions they establish are available to
//! script units. Failures of single units are isolated and reported; only a
//! failure while preparing the engine aborts the run.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use crate::{
    bindings::{AliasPolicy, BindingNamespace, Bindings},
    context::{ExecutionContext, SandboxId},
    engine::{EngineConfig, ScriptEngine},
    error::{EngineError, Result, SandboxError},
    invoker::Invoker,
    loader::{Resolution, UnitLoader},
    registry::Reloadable,
    report::{Phase, RunReport, Severity, UnitOutcome},
    unit::{Unit, UnitId, UnitKind},
};

/// Hint attached to units missing during the script phase
const MISSING_CLASS_HINT: &str = "did you forget to register the class unit in the run config?";

/// Top-level state of a sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not running
    Idle,
    /// Building the engine and bindings
    Preparing,
    /// Executing class units
    RunningClassUnits,
    /// Executing script units
    RunningScriptUnits,
}

/// Host side of a sandbox: which units to run and lifecycle hooks
///
/// Only the unit lists are required; every hook defaults to doing nothing.
pub trait SandboxHost<E: ScriptEngine> {
    /// Class unit ids in execution order
    fn class_units(&self) -> Vec<UnitId>;

    /// Script unit ids in execution order
    fn script_units(&self) -> Vec<UnitId>;

    /// Adjusts the engine configuration of the coming run
    fn configure_engine(&mut self, _config: &mut EngineConfig) {}

    /// Called once the engine exists, before bindings are installed
    ///
    /// An error aborts the run.
    fn init_engine(&mut self, _engine: &mut E) -> std::result::Result<(), EngineError> {
        Ok(())
    }

    /// First thing a run does
    fn pre_run(&mut self) {}

    /// Adds run-scoped bindings on top of the namespace snapshot
    fn post_init_bindings(&mut self, _bindings: &mut Bindings<E::Binding>) {}

    /// Whether a resolved unit should execute
    fn should_run(&self, _unit: &UnitId) -> bool {
        true
    }

    /// Last thing a run does, also when a unit panics
    fn post_run(&mut self) {}
}

/// Reloadable script sandbox
pub struct Sandbox<E: ScriptEngine, H: SandboxHost<E>> {
    id: SandboxId,
    roots: Vec<PathBuf>,
    host: H,
    namespace: BindingNamespace<E::Binding>,
    engine_config: EngineConfig,
    engine: Option<E>,
    context: ExecutionContext,
    state: RunState,
    reloadables: Vec<Box<dyn Reloadable + Send>>,
}

impl<E: ScriptEngine, H: SandboxHost<E>> Sandbox<E, H> {
    /// Creates an idle sandbox over `roots`
    ///
    /// # Errors
    /// [`SandboxError::EmptyEnvironment`] if `roots` is empty
    pub fn new(roots: Vec<PathBuf>, host: H) -> Result<Self> {
        if roots.is_empty() {
            return Err(SandboxError::EmptyEnvironment);
        }
        Ok(Self {
            id: SandboxId::next(),
            roots,
            host,
            namespace: BindingNamespace::default(),
            engine_config: EngineConfig::default(),
            engine: None,
            context: ExecutionContext::new(),
            state: RunState::Idle,
            reloadables: Vec::new(),
        })
    }

    /// Replaces the alias policy
    ///
    /// Starts a fresh namespace, so call this before registering bindings.
    pub fn with_alias_policy(mut self, policy: Box<dyn AliasPolicy>) -> Self {
        self.namespace = BindingNamespace::new(policy);
        self
    }

    /// Replaces the base engine configuration
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Makes `value` visible to every unit of every following run
    pub fn register_binding(&mut self, name: &str, value: E::Binding) -> Result<()> {
        self.namespace.register(name, value)
    }

    /// Registers something to reset before every reload
    ///
    /// Reloadables are reset in registration order.
    pub fn register_reloadable<R: Reloadable + Send + 'static>(&mut self, reloadable: R) {
        self.reloadables.push(Box::new(reloadable));
    }

    /// Invoker for callbacks created by this sandbox's units
    pub fn invoker(&self) -> Invoker {
        Invoker::new(self.id)
    }

    /// Sandbox identity
    pub fn id(&self) -> SandboxId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Environment roots in search order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The sandbox's execution context; inactive outside a run
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Engine of the most recent successful preparation
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Mutable access to the retained engine
    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// The long-lived binding namespace
    pub fn bindings(&self) -> &BindingNamespace<E::Binding> {
        &self.namespace
    }

    /// Resets every reloadable, then runs
    pub fn reload(&mut self) -> Result<RunReport> {
        log::debug!("[sandbox {}] reloading {} registries", self.id, self.reloadables.len());
        for reloadable in &mut self.reloadables {
            reloadable.on_reload();
        }
        self.engine = None;
        self.run()
    }

    /// Prepares a fresh engine and runs every class and script unit
    ///
    /// # Errors
    /// [`SandboxError::Setup`] if the engine could not be prepared. Unit
    /// failures are reported in the returned [`RunReport`] instead.
    pub fn run(&mut self) -> Result<RunReport> {
        self.state = RunState::Preparing;
        if let Err(source) = self.prepare() {
            self.state = RunState::Idle;
            self.context.deactivate();
            log::error!("[sandbox {}] preparation failed: {}", self.id, source);
            return Err(SandboxError::Setup {
                sandbox: self.id,
                source,
            });
        }

        let mut report = RunReport::new(self.id);
        {
            let mut scope = RunScope::enter(self);
            let already_run = scope.run_class_units(&mut report);
            scope.run_script_units(&already_run, &mut report);
        }
        report.log_summary();
        Ok(report)
    }

    fn prepare(&mut self) -> std::result::Result<(), EngineError> {
        self.host.pre_run();

        let mut config = self.engine_config.clone();
        self.host.configure_engine(&mut config);

        self.engine = None;
        let mut engine = E::create(&self.roots, &config)?;
        self.host.init_engine(&mut engine)?;

        let mut bindings = self.namespace.snapshot();
        self.host.post_init_bindings(&mut bindings);
        engine.bind(&bindings)?;

        log::debug!(
            "[sandbox {}] engine ready with {} bindings over {} roots",
            self.id,
            bindings.len(),
            self.roots.len()
        );
        self.engine = Some(engine);
        Ok(())
    }

    fn run_class_units(&mut self, report: &mut RunReport) -> HashSet<UnitId> {
        self.state = RunState::RunningClassUnits;
        let mut already_run = HashSet::new();

        for id in self.host.class_units() {
            let Some(engine) = self.engine.as_mut() else {
                break;
            };

            let unit = match UnitLoader::new(&self.roots).resolve(engine, &id) {
                Resolution::Loaded(unit) => unit,
                Resolution::NotFound => {
                    report.record(&id, Phase::Class, UnitOutcome::SkippedPending);
                    report.diagnose(Severity::Debug, Some(&id), "class unit not available yet");
                    continue;
                }
                Resolution::Failed(err) => {
                    report.record(&id, Phase::Class, UnitOutcome::SkippedPending);
                    report.diagnose(Severity::Debug, Some(&id), format!("class unit pending: {err}"));
                    continue;
                }
            };

            if unit.kind != UnitKind::Class || !self.host.should_run(&id) {
                log::debug!("[sandbox {}] skipping {} {} in class phase", self.id, unit.kind, id);
                report.record(&id, Phase::Class, UnitOutcome::SkippedByPredicate);
                continue;
            }

            let outcome = execute_unit(engine, &mut self.context, &unit, Phase::Class, report);
            if outcome == UnitOutcome::Executed {
                already_run.insert(id.clone());
            }
            report.record(&id, Phase::Class, outcome);
        }

        already_run
    }

    fn run_script_units(&mut self, already_run: &HashSet<UnitId>, report: &mut RunReport) {
        self.state = RunState::RunningScriptUnits;

        for id in self.host.script_units() {
            if already_run.contains(&id) {
                continue;
            }
            let Some(engine) = self.engine.as_mut() else {
                break;
            };

            let unit = match UnitLoader::new(&self.roots).resolve(engine, &id) {
                Resolution::Loaded(unit) => unit,
                Resolution::NotFound => {
                    report.record(&id, Phase::Script, UnitOutcome::Failed);
                    report.diagnose(
                        Severity::Error,
                        Some(&id),
                        format!("unit not found in any root, {MISSING_CLASS_HINT}"),
                    );
                    continue;
                }
                Resolution::Failed(err) => {
                    report.record(&id, Phase::Script, UnitOutcome::Failed);
                    report.diagnose(Severity::Error, Some(&id), format!("{err}, {MISSING_CLASS_HINT}"));
                    continue;
                }
            };

            if unit.kind == UnitKind::Class {
                report.record(&id, Phase::Script, UnitOutcome::Misconfigured);
                report.diagnose(
                    Severity::Error,
                    Some(&id),
                    "is a class unit but is registered as a script; register it as a class unit",
                );
                continue;
            }

            if !self.host.should_run(&id) {
                report.record(&id, Phase::Script, UnitOutcome::SkippedByPredicate);
                continue;
            }

            let outcome = execute_unit(engine, &mut self.context, &unit, Phase::Script, report);
            report.record(&id, Phase::Script, outcome);
        }
    }
}

fn execute_unit<E: ScriptEngine>(
    engine: &mut E,
    context: &mut ExecutionContext,
    unit: &Unit<E::Compiled>,
    phase: Phase,
    report: &mut RunReport,
) -> UnitOutcome {
    context.enter_unit(unit.id.clone());
    let result = engine.execute(unit, context);
    context.leave_unit();

    match result {
        Ok(()) => UnitOutcome::Executed,
        Err(err) => {
            report.diagnose(Severity::Error, Some(&unit.id), format!("{phase} unit failed: {err}"));
            UnitOutcome::Failed
        }
    }
}

/// Active part of a run
///
/// Activates the context on entry. Dropping the scope, also while
/// unwinding, ends the run exactly once.
struct RunScope<'a, E: ScriptEngine, H: SandboxHost<E>> {
    sandbox: &'a mut Sandbox<E, H>,
}

impl<'a, E: ScriptEngine, H: SandboxHost<E>> RunScope<'a, E, H> {
    fn enter(sandbox: &'a mut Sandbox<E, H>) -> Self {
        let id = sandbox.id;
        sandbox.context.activate(id);
        Self { sandbox }
    }
}

impl<E: ScriptEngine, H: SandboxHost<E>> Deref for RunScope<'_, E, H> {
    type Target = Sandbox<E, H>;

    fn deref(&self) -> &Sandbox<E, H> {
        self.sandbox
    }
}

impl<E: ScriptEngine, H: SandboxHost<E>> DerefMut for RunScope<'_, E, H> {
    fn deref_mut(&mut self) -> &mut Sandbox<E, H> {
        self.sandbox
    }
}

impl<E: ScriptEngine, H: SandboxHost<E>> Drop for RunScope<'_, E, H> {
    fn drop(&mut self) {
        self.sandbox.context.finish();
        self.sandbox.host.post_run();
        self.sandbox.context.deactivate();
        self.sandbox.state = RunState::Idle;
    }
}
