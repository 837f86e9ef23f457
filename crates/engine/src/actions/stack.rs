use std::collections::VecDeque;

use super::Action;

/// LIFO of pending actions; the back element is the current action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionStack {
    entries: VecDeque<Action>,
}

impl ActionStack {
    /// Puts `action` on top, interrupting whatever was current.
    pub fn push(&mut self, action: Action) {
        self.entries.push_back(action);
    }

    /// Puts `action` at the bottom so it runs once everything else is done.
    pub fn queue(&mut self, action: Action) {
        self.entries.push_front(action);
    }

    pub fn current(&self) -> Option<&Action> {
        self.entries.back()
    }

    pub fn pop_current(&mut self) -> Option<Action> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_from_current(&self) -> impl Iterator<Item = &Action> {
        self.entries.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{EntityId, Vec3};

    #[test]
    fn push_interrupts_and_pop_exposes_previous() {
        let mut stack = ActionStack::default();
        stack.push(Action::move_to_point(Vec3::planar(1.0, 0.0), 1.0));
        stack.push(Action::follow(EntityId(7), 2.0));

        assert_eq!(stack.current(), Some(&Action::follow(EntityId(7), 2.0)));
        stack.pop_current();
        assert_eq!(
            stack.current(),
            Some(&Action::move_to_point(Vec3::planar(1.0, 0.0), 1.0))
        );
        stack.pop_current();
        assert!(stack.current().is_none());
        assert!(stack.pop_current().is_none());
    }

    #[test]
    fn queue_runs_after_existing_actions() {
        let mut stack = ActionStack::default();
        stack.push(Action::start_conversation("first"));
        stack.queue(Action::start_conversation("last"));

        let order = stack
            .iter_from_current()
            .map(|action| match action {
                Action::StartConversation { dialog_res_ref } => dialog_res_ref.as_str(),
                _ => "",
            })
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["first", "last"]);
        assert_eq!(stack.len(), 2);

        stack.clear();
        assert!(stack.is_empty());
    }

    #[test]
    fn queued_actions_keep_submission_order_below_pushes() {
        let mut stack = ActionStack::default();
        for dialog in ["a", "b", "c"] {
            stack.queue(Action::start_conversation(dialog));
        }
        stack.push(Action::start_conversation("urgent"));

        let mut order = Vec::new();
        while let Some(Action::StartConversation { dialog_res_ref }) = stack.pop_current() {
            order.push(dialog_res_ref);
        }
        assert_eq!(order, vec!["urgent", "a", "b", "c"]);
    }
}
