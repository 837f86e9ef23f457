use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use waymark_engine::{
    Action, ActionKind, Area, EntityId, ExecutionContext, ScriptInvocation, ScriptProgram, Vec3,
};

use super::grid::GridError;

pub(crate) const DEFAULT_ARRIVAL_DISTANCE: f32 = 1.0;

fn default_arrival_distance() -> f32 {
    DEFAULT_ARRIVAL_DISTANCE
}

fn default_cell_size() -> f32 {
    2.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    pub(crate) area: String,
    pub(crate) grid: GridSpec,
    #[serde(default)]
    pub(crate) scripts: Vec<String>,
    #[serde(default)]
    pub(crate) waypoints: Vec<WaypointSpec>,
    #[serde(default)]
    pub(crate) creatures: Vec<CreatureSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GridSpec {
    #[serde(default)]
    pub(crate) origin: [f32; 2],
    #[serde(default = "default_cell_size")]
    pub(crate) cell_size: f32,
    pub(crate) rows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WaypointSpec {
    pub(crate) tag: String,
    pub(crate) position: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreatureSpec {
    pub(crate) tag: String,
    pub(crate) position: [f32; 2],
    #[serde(default)]
    pub(crate) run_speed: Option<f32>,
    #[serde(default)]
    pub(crate) actions: Vec<ActionSpec>,
}

/// One queued action. Object references are tags, resolved once everything
/// in the scenario has been spawned.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub(crate) enum ActionSpec {
    MoveToPoint {
        point: [f32; 2],
        #[serde(default = "default_arrival_distance")]
        arrival_distance: f32,
    },
    MoveToObject {
        target: String,
        #[serde(default = "default_arrival_distance")]
        arrival_distance: f32,
    },
    Follow {
        target: String,
        #[serde(default = "default_arrival_distance")]
        arrival_distance: f32,
    },
    DoCommand {
        script: String,
        #[serde(default)]
        triggerer: Option<String>,
        #[serde(default)]
        event_number: i32,
    },
    StartConversation {
        dialog: String,
    },
    PickUpItem {
        #[serde(default)]
        target: Option<String>,
    },
    OpenDoor {
        #[serde(default)]
        target: Option<String>,
    },
    PlayAnimation,
    Wait,
}

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scenario {origin} at '{field}': {message}")]
    Parse {
        origin: String,
        field: String,
        message: String,
    },
    #[error("invalid navigation grid: {0}")]
    Grid(#[from] GridError),
    #[error("creature '{creature}' references unknown tag '{tag}'")]
    UnknownTag { creature: String, tag: String },
    #[error("tag '{0}' is used by more than one object")]
    DuplicateTag(String),
}

pub(crate) fn parse_scenario(origin: &str, text: &str) -> Result<Scenario, ScenarioError> {
    let deserializer = &mut serde_json::Deserializer::from_str(text);
    serde_path_to_error::deserialize(deserializer).map_err(|error| ScenarioError::Parse {
        origin: origin.to_string(),
        field: error.path().to_string(),
        message: error.inner().to_string(),
    })
}

pub(crate) fn to_vec3(point: [f32; 2]) -> Vec3 {
    Vec3::planar(point[0], point[1])
}

/// Spawns every waypoint and creature, then queues each creature's actions
/// in listed order.
pub(crate) fn populate_area(
    area: &mut Area,
    scenario: &Scenario,
) -> Result<BTreeMap<String, EntityId>, ScenarioError> {
    let mut tags = BTreeMap::new();
    for waypoint in &scenario.waypoints {
        let id = area.spawn_waypoint(waypoint.tag.clone(), to_vec3(waypoint.position));
        if tags.insert(waypoint.tag.clone(), id).is_some() {
            return Err(ScenarioError::DuplicateTag(waypoint.tag.clone()));
        }
    }
    let mut spawned = Vec::with_capacity(scenario.creatures.len());
    for creature in &scenario.creatures {
        let position = to_vec3(creature.position);
        let id = match creature.run_speed {
            Some(speed) => area.spawn_creature_with_speed(creature.tag.clone(), position, speed),
            None => area.spawn_creature(creature.tag.clone(), position),
        };
        if tags.insert(creature.tag.clone(), id).is_some() {
            return Err(ScenarioError::DuplicateTag(creature.tag.clone()));
        }
        spawned.push((id, creature));
    }

    for (id, creature) in spawned {
        for entry in &creature.actions {
            let action = build_action(entry, &tags, &creature.tag)?;
            area.queue_action(id, action);
        }
    }
    Ok(tags)
}

fn build_action(
    entry: &ActionSpec,
    tags: &BTreeMap<String, EntityId>,
    creature: &str,
) -> Result<Action, ScenarioError> {
    let lookup = |tag: &str| {
        tags.get(tag).copied().ok_or_else(|| ScenarioError::UnknownTag {
            creature: creature.to_string(),
            tag: tag.to_string(),
        })
    };
    let optional_lookup = |tag: &Option<String>| tag.as_deref().map(lookup).transpose();

    let action = match entry {
        ActionSpec::MoveToPoint {
            point,
            arrival_distance,
        } => Action::move_to_point(to_vec3(*point), *arrival_distance),
        ActionSpec::MoveToObject {
            target,
            arrival_distance,
        } => Action::move_to_object(lookup(target.as_str())?, *arrival_distance),
        ActionSpec::Follow {
            target,
            arrival_distance,
        } => Action::follow(lookup(target.as_str())?, *arrival_distance),
        ActionSpec::DoCommand {
            script,
            triggerer,
            event_number,
        } => Action::DoCommand(ScriptInvocation::new(
            ScriptProgram::new(script.clone()),
            ExecutionContext {
                caller_id: None,
                triggerer_id: optional_lookup(triggerer)?,
                user_defined_event_number: *event_number,
            },
        )),
        ActionSpec::StartConversation { dialog } => Action::start_conversation(dialog.clone()),
        ActionSpec::PickUpItem { target } => Action::Unsupported {
            kind: ActionKind::PickUpItem,
            target: optional_lookup(target)?,
        },
        ActionSpec::OpenDoor { target } => Action::Unsupported {
            kind: ActionKind::OpenDoor,
            target: optional_lookup(target)?,
        },
        ActionSpec::PlayAnimation => Action::Unsupported {
            kind: ActionKind::PlayAnimation,
            target: None,
        },
        ActionSpec::Wait => Action::Unsupported {
            kind: ActionKind::Wait,
            target: None,
        },
    };
    Ok(action)
}
