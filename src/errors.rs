/// Coarse classification shared by every failure the watchers can observe.
///
/// The waiter and the command layer only need to know whether something was
/// missing, whether talking to a remote end failed, or whether the directory
/// is in a state nothing further can be reasoned about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Transport,
    Fatal,
}

impl AsRef<str> for FailureKind {
    fn as_ref(&self) -> &str {
        match self {
            Self::NotFound => "not_found",
            Self::Transport => "transport",
            Self::Fatal => "fatal",
        }
    }
}
