//! Buffering of remote ICE candidates received before the remote session
//! description.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use huddle_client_api_proto::IceCandidate;

/// FIFO of remote [`IceCandidate`]s of a single call.
///
/// An [RTCPeerConnection][1] refuses candidates until its remote description
/// is set, while the signalling server may relay the peer's candidates before
/// its description. Such candidates are held here and flushed right after the
/// remote description is applied.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
#[derive(Debug, Default)]
pub struct CandidateQueue {
    /// Candidates waiting for the remote description, in arrival order.
    buffer: RefCell<VecDeque<IceCandidate>>,

    /// Whether the remote description is applied and the queue is flushed.
    remote_description_applied: Cell<bool>,
}

impl CandidateQueue {
    /// Creates a new empty [`CandidateQueue`].
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers the provided `candidate` if the remote description is not
    /// applied yet.
    ///
    /// Otherwise, hands the `candidate` back, so it is applied directly.
    pub fn enqueue(&self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.remote_description_applied.get() {
            Some(candidate)
        } else {
            self.buffer.borrow_mut().push_back(candidate);
            None
        }
    }

    /// Marks the remote description as applied and drains all the buffered
    /// candidates in arrival order.
    ///
    /// Only the first call drains anything.
    pub fn flush(&self) -> Vec<IceCandidate> {
        if self.remote_description_applied.replace(true) {
            log::warn!("Remote ICE candidates are already flushed");
            return Vec::new();
        }
        self.buffer.borrow_mut().drain(..).collect()
    }

    /// Indicates whether [`CandidateQueue::flush()`] was already called.
    #[inline]
    #[must_use]
    pub fn is_remote_description_applied(&self) -> bool {
        self.remote_description_applied.get()
    }

    /// Returns count of the buffered candidates.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.borrow().len()
    }

    /// Indicates whether there are no buffered candidates.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().is_empty()
    }

    /// Drops all the buffered candidates.
    pub fn clear(&self) {
        self.buffer.borrow_mut().clear();
    }
}
