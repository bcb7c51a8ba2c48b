/// Work owed to the view, in increasing severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PendingUpdate {
    #[default]
    Idle,
    /// Render again from the current lists.
    Redraw,
    /// Re-apply the filter to `AllFiles`, then render.
    Recompute,
}

/// Coalesces change signals until the view can be observed.
#[derive(Debug, Default)]
pub struct PendingState {
    level: PendingUpdate,
}

impl PendingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> PendingUpdate {
        self.level
    }

    pub fn is_pending(&self) -> bool {
        self.level != PendingUpdate::Idle
    }

    /// Raise the pending level. Never lowers it.
    pub fn escalate(&mut self, level: PendingUpdate) {
        self.level = self.level.max(level);
    }

    /// The work to perform now, if any: nothing while the view is hidden.
    pub fn due(&self, observable: bool) -> Option<PendingUpdate> {
        (observable && self.is_pending()).then_some(self.level)
    }

    /// Mark the owed work as done.
    pub fn settle(&mut self) {
        self.level = PendingUpdate::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(PendingUpdate::Idle < PendingUpdate::Redraw);
        assert!(PendingUpdate::Redraw < PendingUpdate::Recompute);
    }

    #[test]
    fn test_escalation_keeps_the_maximum() {
        let mut state = PendingState::new();
        state.escalate(PendingUpdate::Redraw);
        state.escalate(PendingUpdate::Recompute);
        state.escalate(PendingUpdate::Redraw);
        assert_eq!(state.level(), PendingUpdate::Recompute);

        state.escalate(PendingUpdate::Idle);
        assert_eq!(state.level(), PendingUpdate::Recompute);
    }

    #[test]
    fn test_due_only_when_observable_and_pending() {
        let mut state = PendingState::new();
        assert_eq!(state.due(true), None);

        state.escalate(PendingUpdate::Redraw);
        assert_eq!(state.due(false), None);
        assert_eq!(state.level(), PendingUpdate::Redraw);
        assert_eq!(state.due(true), Some(PendingUpdate::Redraw));

        state.settle();
        assert!(!state.is_pending());
        assert_eq!(state.due(true), None);
    }
}
