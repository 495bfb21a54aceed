use core::fmt;

/// Errors returned by the node data plane.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    ///
    /// Frames carrying this defect never make it past the codec; the
    /// dispatcher only ever sees consistent packets.
    InvalidLength,

    /// Invalid value supplied for field.
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// This is returned when trying to fit too much data into a packet
    /// payload or other fixed-size buffer, and also when reaching EOF
    /// prematurely while reading data from a buffer.
    Eof,

    /// The packet pool has no free slot left.
    PoolExhausted,

    /// A bounded mailbox was full and the packet could not be enqueued.
    QueueFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::PoolExhausted => "packet pool exhausted",
            Error::QueueFull => "send queue full",
        })
    }
}
