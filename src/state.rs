use std::fmt;

/// The lifecycle state of a task process.
///
/// The discriminant values cross the wire inside `STATE` messages and must
/// not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum State {
    /// The task adapter has been instantiated.
    Created = 0,
    /// The task has been initialized.
    Initialized = 1,
    /// The task is currently running.
    Running = 2,
    /// The task has completed without an error.
    Completed = 3,
    /// The task has paused.
    Paused = 4,
    /// The task has been terminated without an error.
    Terminated = 5,
    /// The task has stopped with an error.
    Error = 6,
    /// The initial state of a task that has not reported yet.
    Unknown = 9,
}

impl State {
    /// Maps a raw wire value to a `State`; out-of-range values map to
    /// [`State::Unknown`].
    pub fn of(raw: i32) -> State {
        match raw {
            0 => State::Created,
            1 => State::Initialized,
            2 => State::Running,
            3 => State::Completed,
            4 => State::Paused,
            5 => State::Terminated,
            6 => State::Error,
            _ => State::Unknown,
        }
    }

    /// The raw wire value of this state.
    pub fn raw(self) -> i32 {
        self as i32
    }

    /// True for the terminal states a task loop exits on.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Terminated | State::Error)
    }

    /// True for the states the all-stopped fold accepts. `Unknown` counts as
    /// stopped so that tasks that never reported cannot wedge shutdown.
    pub fn is_stopped(self) -> bool {
        self.is_terminal() || self == State::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Created => "CREATED",
            State::Initialized => "INITIALIZED",
            State::Running => "RUNNING",
            State::Completed => "COMPLETED",
            State::Paused => "PAUSED",
            State::Terminated => "TERMINATED",
            State::Error => "ERROR",
            State::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip() {
        for state in [
            State::Created,
            State::Initialized,
            State::Running,
            State::Completed,
            State::Paused,
            State::Terminated,
            State::Error,
            State::Unknown,
        ] {
            assert_eq!(State::of(state.raw()), state);
        }
    }

    #[test]
    fn out_of_range_values_map_to_unknown() {
        assert_eq!(State::of(-1), State::Unknown);
        assert_eq!(State::of(7), State::Unknown);
        assert_eq!(State::of(42), State::Unknown);
    }

    #[test]
    fn stopped_includes_unknown_but_terminal_does_not() {
        assert!(State::Unknown.is_stopped());
        assert!(!State::Unknown.is_terminal());
        assert!(State::Completed.is_terminal());
        assert!(State::Terminated.is_stopped());
        assert!(!State::Running.is_stopped());
        assert!(!State::Paused.is_stopped());
    }

    #[test]
    fn display_matches_log_lines() {
        assert_eq!(State::Completed.to_string(), "COMPLETED");
        assert_eq!(State::Terminated.to_string(), "TERMINATED");
    }
}
