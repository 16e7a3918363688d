use thiserror::Error;

/// Broad classification of a [`Tier2Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A precondition was violated by the caller. Fix the calling code.
    UsageViolation,
    /// The data cannot be represented in a packet header. The caller may
    /// recover by choosing different truncation points.
    ExceedsFormatLimit,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier2Error {
    #[error("Restore called without a prior save")]
    RestoreWithoutSave,
    #[error("Tag tree leaf is frozen by a previously encoded threshold")]
    FrozenTagTreeLeaf,
    #[error("Tag tree has no leaves")]
    EmptyTagTree,
    #[error("Tag tree coordinate out of range")]
    TagTreeIndexOutOfRange,
    #[error("No packet body available")]
    NoPacketBody,
    #[error("Invalid image geometry")]
    InvalidGeometry,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Destination too small")]
    DestinationTooSmall,
    #[error("Need more data")]
    NeedMoreData,
    #[error("Progression order not supported")]
    UnsupportedProgressionOrder,
    #[error("Packet header is empty for a non-empty precinct")]
    InconsistentPacketHeader,

    // Format limits
    #[error("Truncation point increment {increment} exceeds the packet header limit")]
    TruncationIncrementTooLarge { increment: usize },
}

impl Tier2Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TruncationIncrementTooLarge { .. } => ErrorKind::ExceedsFormatLimit,
            _ => ErrorKind::UsageViolation,
        }
    }
}
