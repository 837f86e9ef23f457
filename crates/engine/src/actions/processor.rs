use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use super::{Action, ActionKind, ActionOutcome};
use crate::jobs::panic_message;
use crate::nav::PathPlanner;
use crate::script::{ScriptInvocation, ScriptRunner};
use crate::world::{object_position, Creature, EntityId, MovementType, Vec3, Waypoint};

pub type DialogStartHandler = Box<dyn FnMut(EntityId, &str)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStats {
    pub completed: u64,
    pub aborted: u64,
    pub unsupported: u64,
    pub missing_targets: u64,
    pub scripts_run: u64,
    pub script_failures: u64,
    pub dialogs_started: u64,
}

impl ActionStats {
    fn record_outcome(&mut self, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::InProgress => {}
            ActionOutcome::Completed => self.completed = self.completed.saturating_add(1),
            ActionOutcome::Aborted => self.aborted = self.aborted.saturating_add(1),
        }
    }
}

/// What the current action needs this tick, resolved against the world
/// before the acting creature is borrowed mutably.
enum ActionStep {
    Navigate {
        destination: Vec3,
        arrival_distance: f32,
        completes_on_arrival: bool,
    },
    RunScript(ScriptInvocation),
    StartDialog(String),
    MissingTarget {
        kind: ActionKind,
        target: EntityId,
    },
    Unsupported(ActionKind),
}

pub struct ActionProcessor {
    script_runner: Box<dyn ScriptRunner>,
    on_start_dialog: Option<DialogStartHandler>,
    stats: ActionStats,
}

impl ActionProcessor {
    pub fn new(script_runner: Box<dyn ScriptRunner>) -> Self {
        Self {
            script_runner,
            on_start_dialog: None,
            stats: ActionStats::default(),
        }
    }

    pub fn set_dialog_start_handler(&mut self, handler: DialogStartHandler) {
        self.on_start_dialog = Some(handler);
    }

    pub fn clear_dialog_start_handler(&mut self) {
        self.on_start_dialog = None;
    }

    pub fn stats(&self) -> ActionStats {
        self.stats
    }

    /// Advances the current action of every creature that has one.
    pub fn update(
        &mut self,
        creatures: &mut BTreeMap<EntityId, Creature>,
        waypoints: &BTreeMap<EntityId, Waypoint>,
        planner: &mut PathPlanner,
        dt: f32,
    ) {
        let actor_ids = creatures
            .values()
            .filter(|creature| creature.has_actions())
            .map(|creature| creature.id)
            .collect::<Vec<_>>();

        for actor_id in actor_ids {
            let Some(action) = creatures
                .get(&actor_id)
                .and_then(|creature| creature.actions.current())
            else {
                continue;
            };
            let kind = action.kind();
            let is_movement = action.is_movement();
            let step = resolve_step(action, |target| {
                object_position(creatures, waypoints, target)
            });

            let Some(creature) = creatures.get_mut(&actor_id) else {
                continue;
            };
            let outcome = self.execute(step, creature, planner, dt);
            self.retire(creature, kind, is_movement, outcome);
        }
    }

    fn execute(
        &mut self,
        step: ActionStep,
        creature: &mut Creature,
        planner: &mut PathPlanner,
        dt: f32,
    ) -> ActionOutcome {
        match step {
            ActionStep::Navigate {
                destination,
                arrival_distance,
                completes_on_arrival,
            } => {
                let arrived = planner.navigate(creature, destination, arrival_distance, dt);
                if arrived && completes_on_arrival {
                    ActionOutcome::Completed
                } else {
                    ActionOutcome::InProgress
                }
            }
            ActionStep::RunScript(invocation) => {
                self.run_script(creature.id, &invocation);
                ActionOutcome::Completed
            }
            ActionStep::StartDialog(dialog_res_ref) => {
                match self.on_start_dialog.as_mut() {
                    Some(handler) => {
                        handler(creature.id, &dialog_res_ref);
                        self.stats.dialogs_started = self.stats.dialogs_started.saturating_add(1);
                    }
                    None => debug!(
                        creature = creature.id.0,
                        dialog = dialog_res_ref.as_str(),
                        "dialog_start_unhandled"
                    ),
                }
                ActionOutcome::Completed
            }
            ActionStep::MissingTarget { kind, target } => {
                self.stats.missing_targets = self.stats.missing_targets.saturating_add(1);
                warn!(
                    creature = creature.id.0,
                    kind = kind.name(),
                    target = target.0,
                    "action_target_missing"
                );
                ActionOutcome::Aborted
            }
            ActionStep::Unsupported(kind) => {
                self.stats.unsupported = self.stats.unsupported.saturating_add(1);
                warn!(creature = creature.id.0, kind = kind.name(), "action_unsupported");
                ActionOutcome::Aborted
            }
        }
    }

    fn run_script(&mut self, caller_id: EntityId, invocation: &ScriptInvocation) {
        self.stats.scripts_run = self.stats.scripts_run.saturating_add(1);
        let context = invocation.context_for(caller_id);
        let runner = self.script_runner.as_ref();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            runner.run(&invocation.program, context)
        }));

        match outcome {
            Ok(Ok(result)) => debug!(
                creature = caller_id.0,
                script = invocation.program.res_ref.as_str(),
                result,
                "script_executed"
            ),
            Ok(Err(error)) => {
                self.stats.script_failures = self.stats.script_failures.saturating_add(1);
                warn!(
                    creature = caller_id.0,
                    script = invocation.program.res_ref.as_str(),
                    error = %error,
                    "script_failed"
                );
            }
            Err(payload) => {
                self.stats.script_failures = self.stats.script_failures.saturating_add(1);
                warn!(
                    creature = caller_id.0,
                    script = invocation.program.res_ref.as_str(),
                    panic = %panic_message(payload.as_ref()),
                    "script_panicked"
                );
            }
        }
    }

    fn retire(
        &mut self,
        creature: &mut Creature,
        kind: ActionKind,
        is_movement: bool,
        outcome: ActionOutcome,
    ) {
        self.stats.record_outcome(outcome);
        if outcome == ActionOutcome::InProgress {
            return;
        }

        creature.actions.pop_current();
        if is_movement {
            creature.path.discard();
            creature.movement_type = MovementType::Idle;
        }
        debug!(
            creature = creature.id.0,
            kind = kind.name(),
            outcome = ?outcome,
            remaining = creature.actions.len(),
            "action_retired"
        );
    }
}

fn resolve_step(action: &Action, position_of: impl Fn(EntityId) -> Option<Vec3>) -> ActionStep {
    match action {
        Action::MoveToPoint {
            point,
            target,
            arrival_distance,
        } => {
            let destination = match target {
                Some(target) => match position_of(*target) {
                    Some(position) => position,
                    None => {
                        return ActionStep::MissingTarget {
                            kind: ActionKind::MoveToPoint,
                            target: *target,
                        }
                    }
                },
                None => *point,
            };
            ActionStep::Navigate {
                destination,
                arrival_distance: *arrival_distance,
                completes_on_arrival: true,
            }
        }
        Action::Follow {
            target,
            arrival_distance,
        } => match position_of(*target) {
            Some(destination) => ActionStep::Navigate {
                destination,
                arrival_distance: *arrival_distance,
                completes_on_arrival: false,
            },
            None => ActionStep::MissingTarget {
                kind: ActionKind::Follow,
                target: *target,
            },
        },
        Action::DoCommand(invocation) => ActionStep::RunScript(invocation.clone()),
        Action::StartConversation { dialog_res_ref } => {
            ActionStep::StartDialog(dialog_res_ref.clone())
        }
        Action::Unsupported { kind, .. } => ActionStep::Unsupported(*kind),
    }
}
