// Result Coordinator
//
// Per-execution lookahead state shared between the enumerator and the shaper.

/// Carries one bit of lookahead from the shaper back to the enumerator.
///
/// A shaper that has to read past the end of its logical group records here
/// whether the row it stopped on exists (`true`) or the cursor ran dry
/// (`false`). The enumerator consumes that value instead of reading again, so
/// the row the shaper stopped on is the one the next element starts from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResultCoordinator {
    has_next: Option<bool>,
}

impl ResultCoordinator {
    pub fn new() -> Self {
        ResultCoordinator { has_next: None }
    }

    /// The pending lookahead value, without consuming it
    pub fn peek(&self) -> Option<bool> {
        self.has_next
    }

    /// Record whether a row is already positioned for the next element.
    /// Replaces any value that has not been consumed yet.
    pub fn set_has_next(&mut self, has_next: bool) {
        self.has_next = Some(has_next);
    }

    /// Consume the pending lookahead value, leaving the coordinator empty
    pub fn take(&mut self) -> Option<bool> {
        self.has_next.take()
    }

    pub fn has_pending(&self) -> bool {
        self.has_next.is_some()
    }
}
