use crate::world::{EntityId, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub destination: Vec3,
    pub waypoints: Vec<Vec3>,
    pub computed_at_ms: u64,
    cursor: usize,
}

impl Path {
    pub fn new(destination: Vec3, waypoints: Vec<Vec3>, computed_at_ms: u64) -> Self {
        Self {
            destination,
            waypoints,
            computed_at_ms,
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Next unvisited waypoint, or the destination once every waypoint is visited.
    pub fn current_target(&self) -> Vec3 {
        self.waypoints
            .get(self.cursor)
            .copied()
            .unwrap_or(self.destination)
    }

    pub fn advance_cursor(&mut self) {
        if self.cursor < self.waypoints.len() {
            self.cursor = self.cursor.saturating_add(1);
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }
}

/// Route computed off-thread, delivered back to the simulation through the
/// planner's mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub creature_id: EntityId,
    pub generation: u64,
    pub destination: Vec3,
    pub waypoints: Vec<Vec3>,
    pub computed_at_ms: u64,
    pub direct_line_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathApply {
    Applied,
    Stale,
}

/// Per-creature path bookkeeping. Owned by the simulation thread; workers only
/// ever see copies of the inputs and reply with a [`PathResult`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathState {
    path: Option<Path>,
    in_flight: Option<u64>,
    generation: u64,
}

impl PathState {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub(crate) fn path_mut(&mut self) -> Option<&mut Path> {
        self.path.as_mut()
    }

    pub fn is_update_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks a query as in flight and returns its generation, or `None` when
    /// one is already outstanding.
    pub(crate) fn begin_request(&mut self) -> Option<u64> {
        if self.in_flight.is_some() {
            return None;
        }
        self.generation = self.generation.wrapping_add(1);
        self.in_flight = Some(self.generation);
        Some(self.generation)
    }

    /// Drops the cached path. A query still in flight keeps the pending flag
    /// set but its result will be rejected as stale.
    pub(crate) fn discard(&mut self) {
        self.path = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Forgets an outstanding query that will never report back.
    pub(crate) fn reset_pending(&mut self) {
        if self.in_flight.take().is_some() {
            self.generation = self.generation.wrapping_add(1);
        }
    }

    pub(crate) fn apply(&mut self, result: PathResult) -> PathApply {
        if self.in_flight == Some(result.generation) {
            self.in_flight = None;
        }
        if result.generation != self.generation {
            return PathApply::Stale;
        }
        self.path = Some(Path::new(
            result.destination,
            result.waypoints,
            result.computed_at_ms,
        ));
        PathApply::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_for(generation: u64, destination: Vec3) -> PathResult {
        PathResult {
            creature_id: EntityId(1),
            generation,
            destination,
            waypoints: vec![Vec3::planar(5.0, 0.0)],
            computed_at_ms: 100,
            direct_line_fallback: false,
        }
    }

    #[test]
    fn cursor_never_exceeds_waypoint_count() {
        let mut path = Path::new(
            Vec3::planar(10.0, 0.0),
            vec![Vec3::planar(3.0, 0.0), Vec3::planar(6.0, 0.0)],
            0,
        );
        assert_eq!(path.current_target(), Vec3::planar(3.0, 0.0));
        path.advance_cursor();
        assert_eq!(path.current_target(), Vec3::planar(6.0, 0.0));
        path.advance_cursor();
        assert!(path.is_exhausted());
        assert_eq!(path.current_target(), Vec3::planar(10.0, 0.0));
        for _ in 0..5 {
            path.advance_cursor();
        }
        assert_eq!(path.cursor(), 2);
        assert_eq!(path.current_target(), Vec3::planar(10.0, 0.0));
    }

    #[test]
    fn empty_waypoints_target_destination_directly() {
        let path = Path::new(Vec3::planar(4.0, 4.0), Vec::new(), 0);
        assert!(path.is_exhausted());
        assert_eq!(path.current_target(), Vec3::planar(4.0, 4.0));
    }

    #[test]
    fn only_one_request_may_be_in_flight() {
        let mut state = PathState::default();
        let generation = state.begin_request().expect("first request");
        assert!(state.is_update_pending());
        assert!(state.begin_request().is_none());

        let applied = state.apply(result_for(generation, Vec3::planar(9.0, 0.0)));

        assert_eq!(applied, PathApply::Applied);
        assert!(!state.is_update_pending());
        assert_eq!(
            state.path().map(|path| path.destination),
            Some(Vec3::planar(9.0, 0.0))
        );
        assert!(state.begin_request().is_some());
    }

    #[test]
    fn discarded_request_result_is_stale_but_clears_pending() {
        let mut state = PathState::default();
        let generation = state.begin_request().expect("request");
        state.discard();
        assert!(state.is_update_pending());

        let applied = state.apply(result_for(generation, Vec3::planar(9.0, 0.0)));

        assert_eq!(applied, PathApply::Stale);
        assert!(state.path().is_none());
        assert!(!state.is_update_pending());
    }

    #[test]
    fn reset_pending_rejects_late_result_and_allows_new_request() {
        let mut state = PathState::default();
        let first = state.begin_request().expect("request");
        state.reset_pending();
        let second = state.begin_request().expect("new request after reset");
        assert_ne!(first, second);

        assert_eq!(
            state.apply(result_for(first, Vec3::planar(1.0, 0.0))),
            PathApply::Stale
        );
        assert!(state.is_update_pending());
        assert_eq!(
            state.apply(result_for(second, Vec3::planar(2.0, 0.0))),
            PathApply::Applied
        );
        assert!(!state.is_update_pending());
    }

    #[test]
    fn applied_path_starts_at_cursor_zero() {
        let mut state = PathState::default();
        let generation = state.begin_request().expect("request");
        state.apply(result_for(generation, Vec3::planar(9.0, 0.0)));
        assert_eq!(state.path().map(Path::cursor), Some(0));
    }
}
