use std::fmt;

/// Control-flow signals raised by [`crate::scheduler::Scheduler::schedule`].
///
/// These are not faults: they tell the caller which fallback branch to take.
/// They deliberately do not implement [`std::error::Error`] so that callers
/// cannot accidentally log or propagate them as if something had gone wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// No live peers were found in the context.
    NoSurrogates,
    /// The local host scored best; the caller should run `local_code`.
    DoLocal,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::NoSurrogates => write!(f, "no surrogates available"),
            Signal::DoLocal => write!(f, "local execution preferred"),
        }
    }
}

/// Faults raised by the scheduler or its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer chosen during candidate selection disappeared before the RPC
    /// could be made. Surfaced to the caller as a subkind of `Remote`.
    #[error("peer '{0}' disappeared before the task could be dispatched")]
    PeerGone(String),

    /// Installing code on, or performing a task at, a surrogate failed.
    #[error("remote execution failed: {0}")]
    Remote(String),

    /// A `complexityRelation` or `outputSize` formula could not be evaluated.
    #[error("bad formula '{formula}': {reason}")]
    BadFormula { formula: String, reason: String },
}

/// The `Err` side of [`crate::scheduler::Scheduler::schedule`]'s `Result`.
///
/// Kept distinct from [`Error`] because `Signal` variants are routine
/// control flow, not something `?` on an `Error`-returning function should
/// ever absorb silently.
#[derive(Debug)]
pub enum ScheduleFailure {
    Signal(Signal),
    Err(Error),
}

impl From<Signal> for ScheduleFailure {
    fn from(s: Signal) -> Self {
        ScheduleFailure::Signal(s)
    }
}

impl From<Error> for ScheduleFailure {
    fn from(e: Error) -> Self {
        ScheduleFailure::Err(e)
    }
}

impl fmt::Display for ScheduleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleFailure::Signal(s) => write!(f, "{s}"),
            ScheduleFailure::Err(e) => write!(f, "{e}"),
        }
    }
}
