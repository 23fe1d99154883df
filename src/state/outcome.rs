use std::fmt;

/// How the traversal of one category ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryOutcome {
    /// Every query unit was paginated to its end
    Complete,

    /// The per-category record limit stopped the traversal early
    LimitReached,

    /// The run was cancelled (timeout or interrupt) before the category finished
    Interrupted,
}

impl CategoryOutcome {
    /// Returns true if nothing was left unvisited
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::LimitReached => "limit_reached",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for CategoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
