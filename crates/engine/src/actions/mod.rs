mod processor;
mod stack;

pub use processor::{ActionProcessor, ActionStats, DialogStartHandler};
pub use stack::ActionStack;

use crate::script::ScriptInvocation;
use crate::world::{EntityId, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Walk to `point`, or to the live position of `target` when one is set.
    MoveToPoint {
        point: Vec3,
        target: Option<EntityId>,
        arrival_distance: f32,
    },
    Follow {
        target: EntityId,
        arrival_distance: f32,
    },
    DoCommand(ScriptInvocation),
    StartConversation {
        dialog_res_ref: String,
    },
    Unsupported {
        kind: ActionKind,
        target: Option<EntityId>,
    },
}

impl Action {
    pub fn move_to_point(point: Vec3, arrival_distance: f32) -> Self {
        Self::MoveToPoint {
            point,
            target: None,
            arrival_distance,
        }
    }

    pub fn move_to_object(target: EntityId, arrival_distance: f32) -> Self {
        Self::MoveToPoint {
            point: Vec3::default(),
            target: Some(target),
            arrival_distance,
        }
    }

    pub fn follow(target: EntityId, arrival_distance: f32) -> Self {
        Self::Follow {
            target,
            arrival_distance,
        }
    }

    pub fn start_conversation(dialog_res_ref: impl Into<String>) -> Self {
        Self::StartConversation {
            dialog_res_ref: dialog_res_ref.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::MoveToPoint { .. } => ActionKind::MoveToPoint,
            Self::Follow { .. } => ActionKind::Follow,
            Self::DoCommand(_) => ActionKind::DoCommand,
            Self::StartConversation { .. } => ActionKind::StartConversation,
            Self::Unsupported { kind, .. } => *kind,
        }
    }

    pub fn is_movement(&self) -> bool {
        matches!(self, Self::MoveToPoint { .. } | Self::Follow { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    MoveToPoint,
    Follow,
    DoCommand,
    StartConversation,
    PickUpItem,
    DropItem,
    AttackObject,
    OpenDoor,
    CloseDoor,
    PlayAnimation,
    Wait,
}

impl ActionKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::MoveToPoint => "move_to_point",
            Self::Follow => "follow",
            Self::DoCommand => "do_command",
            Self::StartConversation => "start_conversation",
            Self::PickUpItem => "pick_up_item",
            Self::DropItem => "drop_item",
            Self::AttackObject => "attack_object",
            Self::OpenDoor => "open_door",
            Self::CloseDoor => "close_door",
            Self::PlayAnimation => "play_animation",
            Self::Wait => "wait",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    InProgress,
    Completed,
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ExecutionContext, ScriptProgram};

    #[test]
    fn kind_matches_variant() {
        let script = ScriptInvocation::new(ScriptProgram::new("k_test"), ExecutionContext::default());
        assert_eq!(
            Action::move_to_point(Vec3::planar(1.0, 2.0), 1.0).kind(),
            ActionKind::MoveToPoint
        );
        assert_eq!(
            Action::move_to_object(EntityId(3), 1.0).kind(),
            ActionKind::MoveToPoint
        );
        assert_eq!(Action::follow(EntityId(3), 1.0).kind(), ActionKind::Follow);
        assert_eq!(Action::DoCommand(script).kind(), ActionKind::DoCommand);
        assert_eq!(
            Action::start_conversation("dlg").kind(),
            ActionKind::StartConversation
        );
        assert_eq!(
            Action::Unsupported {
                kind: ActionKind::OpenDoor,
                target: None
            }
            .kind(),
            ActionKind::OpenDoor
        );
    }

    #[test]
    fn only_move_and_follow_are_movement() {
        assert!(Action::move_to_point(Vec3::default(), 1.0).is_movement());
        assert!(Action::follow(EntityId(1), 1.0).is_movement());
        assert!(!Action::start_conversation("dlg").is_movement());
        assert!(!Action::Unsupported {
            kind: ActionKind::Wait,
            target: None
        }
        .is_movement());
    }
}
