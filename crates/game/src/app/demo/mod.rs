mod grid;
mod scenario;

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use waymark_engine::{
    Action, Area, EntityId, ExecutionContext, ScriptError, ScriptProgram, ScriptRunner,
    Simulation,
};

pub(crate) use scenario::ScenarioError;

use grid::{GridMotion, NavGrid};
use scenario::{parse_scenario, populate_area, to_vec3, Scenario};

pub(crate) const SCENARIO_ENV_VAR: &str = "WAYMARK_SCENARIO";

const EMBEDDED_SCENARIO: &str = include_str!("../../../assets/demo_scenario.json");

pub(crate) fn load_scenario() -> Result<Scenario, ScenarioError> {
    match env::var(SCENARIO_ENV_VAR) {
        Ok(value) => {
            let path = PathBuf::from(value);
            let text = fs::read_to_string(&path).map_err(|source| ScenarioError::Read {
                path: path.clone(),
                source,
            })?;
            parse_scenario(&path.display().to_string(), &text)
        }
        Err(env::VarError::NotPresent) => parse_scenario("embedded", EMBEDDED_SCENARIO),
        Err(err) => {
            warn!(
                env_var = SCENARIO_ENV_VAR,
                error = %err,
                "unable to read scenario env var; using embedded scenario"
            );
            parse_scenario("embedded", EMBEDDED_SCENARIO)
        }
    }
}

/// Builds the scenario's area against `simulation`'s executor and clock and
/// queues every creature's actions.
pub(crate) fn build_demo_area(
    simulation: &Simulation,
    scenario: &Scenario,
) -> Result<Area, ScenarioError> {
    let grid = Arc::new(NavGrid::from_rows(
        to_vec3(scenario.grid.origin),
        scenario.grid.cell_size,
        &scenario.grid.rows,
    )?);
    let runner = LoggingScriptRunner::new(scenario.scripts.iter().cloned());
    let mut area = simulation.build_area_with_motion(
        scenario.area.clone(),
        Arc::clone(&grid) as Arc<dyn waymark_engine::NavigationQuery>,
        Box::new(runner),
        Box::new(GridMotion::new(grid)),
    );
    area.processor_mut()
        .set_dialog_start_handler(Box::new(|creature: EntityId, dialog: &str| {
            info!(creature = creature.0, dialog, "dialog_started");
        }));

    let tags = populate_area(&mut area, scenario)?;
    info!(
        area = area.name(),
        creatures = area.creature_count(),
        objects = tags.len(),
        "scenario_loaded"
    );
    Ok(area)
}

/// True once nothing but open-ended follow actions remains queued.
pub(crate) fn scenario_settled(simulation: &Simulation) -> bool {
    simulation.area().is_some_and(|area| {
        area.creatures().all(|creature| {
            creature
                .actions
                .iter_from_current()
                .all(|action| matches!(action, Action::Follow { .. }))
        })
    })
}

/// Stand-in script backend: programs named in the scenario succeed and are
/// logged; anything else is reported missing.
struct LoggingScriptRunner {
    known: BTreeSet<String>,
}

impl LoggingScriptRunner {
    fn new(known: impl IntoIterator<Item = String>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }
}

impl ScriptRunner for LoggingScriptRunner {
    fn run(&self, program: &ScriptProgram, context: ExecutionContext) -> Result<i32, ScriptError> {
        if !self.known.contains(&program.res_ref) {
            return Err(ScriptError::ProgramNotFound {
                res_ref: program.res_ref.clone(),
            });
        }
        info!(
            script = program.res_ref.as_str(),
            caller = context.caller_id.map(|id| id.0),
            triggerer = context.triggerer_id.map(|id| id.0),
            event_number = context.user_defined_event_number,
            "script_invoked"
        );
        Ok(0)
    }
}
