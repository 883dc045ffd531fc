/// Result of one API call after the retry wrapper has done its work.
///
/// Strategies match on this instead of unwinding through error types, so a
/// structural failure in one strategy can be turned into a strategy switch.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Ok(T),
    /// The server answered, but not in a shape this request can use.
    Unsupported(String),
    /// Transient failures outlasted the retry budget.
    Transient(String),
    /// The client cannot talk to this server at all.
    Fatal(String),
}

impl<T> CallOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Ok(value) => CallOutcome::Ok(f(value)),
            CallOutcome::Unsupported(reason) => CallOutcome::Unsupported(reason),
            CallOutcome::Transient(reason) => CallOutcome::Transient(reason),
            CallOutcome::Fatal(reason) => CallOutcome::Fatal(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            CallOutcome::Ok(value) => Some(value),
            _ => None,
        }
    }
}
