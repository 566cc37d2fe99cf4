//! A single measured stream: one session, one buffer, one result record.

use crate::context::StateHandle;
use crate::measurements::StreamResult;
use crate::session::MeasuredSession;

/// Id of the first stream, matching iperf3.
pub const DEFAULT_STREAM_ID: usize = 5;

/// Stream id for the `index`-th stream (5, 7, 9, ...).
///
/// # Examples
///
/// ```
/// use rperf3_transport::stream::stream_id_for_index;
///
/// assert_eq!(stream_id_for_index(0), 5);
/// assert_eq!(stream_id_for_index(2), 9);
/// ```
pub fn stream_id_for_index(index: usize) -> usize {
    DEFAULT_STREAM_ID + (index * 2)
}

/// One stream of a test run. Owns its session exclusively.
pub struct Stream {
    pub id: usize,
    session: Box<dyn MeasuredSession>,
    /// Payload written by `send`, filled by `recv`
    pub buffer: Vec<u8>,
    pub result: StreamResult,
    state: StateHandle,
}

impl Stream {
    pub fn new(
        id: usize,
        session: Box<dyn MeasuredSession>,
        buffer_size: usize,
        state: StateHandle,
    ) -> Self {
        Self {
            id,
            session,
            buffer: vec![0u8; buffer_size],
            result: StreamResult::new(),
            state,
        }
    }

    pub fn session(&self) -> &dyn MeasuredSession {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> &mut dyn MeasuredSession {
        self.session.as_mut()
    }

    /// Whether received bytes currently count toward throughput.
    pub fn is_counting(&self) -> bool {
        self.state.is_running()
    }

    pub(crate) fn io_parts(&mut self) -> (&mut dyn MeasuredSession, &mut [u8]) {
        (self.session.as_mut(), self.buffer.as_mut_slice())
    }

    pub fn into_session(self) -> Box<dyn MeasuredSession> {
        self.session
    }
}
