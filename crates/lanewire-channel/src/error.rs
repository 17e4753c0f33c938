use crate::traits::Direction;

/// Errors raised by lane binding and job submission.
///
/// These describe misuse of the lane contract rather than transport failures;
/// transport failures surface as [`std::io::Error`] from the transfer calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// A job source is already bound to this lane.
    #[error("{direction} lane already has a job source")]
    SourceAlreadyBound { direction: Direction },

    /// The lane is disabled and cannot accept jobs.
    #[error("{direction} lane has no job source")]
    NoJobSource { direction: Direction },
}

pub type Result<T> = std::result::Result<T, ChannelError>;
