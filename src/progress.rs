//! Outcome of one call into a resumable coder.

/// Why a coder returned control to the caller.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    /// Progress was made and the coder stopped for a reason other than
    /// starvation, e.g. all supplied operations were encoded.
    Ok,
    /// The stream is complete. Repeated calls keep returning this status
    /// without consuming or producing anything until the coder is reset.
    Finished,
    /// All usable input was consumed; call again with more input.
    NeedMoreInput,
    /// The output window is full; call again with a fresh output window.
    NeedMoreOutput,
}

/// Result of a successful call into a decoder or encoder.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Progress {
    /// Why the call returned.
    pub status: Status,
    /// Number of input bytes (or operations) consumed by the call.
    pub consumed: usize,
    /// Number of bytes written into the output window.
    pub written: usize,
}

impl Progress {
    pub(crate) const fn new(status: Status, consumed: usize, written: usize) -> Self {
        Self {
            status,
            consumed,
            written,
        }
    }

    /// Whether the coder reached the end of the stream.
    pub fn is_finished(&self) -> bool {
        self.status == Status::Finished
    }
}
