//! Per-run context shared by the adapters and every stream.

use crate::config::Config;
use crate::session::{MeasuredSession, SessionListener};
use crate::stream::{stream_id_for_index, Stream};
use parking_lot::RwLock;
use std::sync::Arc;

/// Phase of a test run, as far as the transport layer cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    Start,
    CreateStreams,
    Running,
    End,
    Done,
}

/// Cloneable handle on the run's current [`TestState`].
#[derive(Debug, Clone)]
pub struct StateHandle {
    inner: Arc<RwLock<TestState>>,
}

impl StateHandle {
    pub fn new(state: TestState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn get(&self) -> TestState {
        *self.inner.read()
    }

    pub fn set(&self, state: TestState) {
        *self.inner.write() = state;
    }

    pub fn is_running(&self) -> bool {
        self.get() == TestState::Running
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new(TestState::Start)
    }
}

/// Everything an adapter may consult about the run: configuration, state, and
/// the listeners it accepts on.
///
/// `listener` is the harness's own TCP listener, reused by the TCP adapter.
/// `proto_listener` holds whatever a reliable-UDP adapter's `listen` returned.
pub struct TestContext {
    pub config: Config,
    state: StateHandle,
    listener: Option<Arc<dyn SessionListener>>,
    proto_listener: Option<Arc<dyn SessionListener>>,
}

impl TestContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: StateHandle::default(),
            listener: None,
            proto_listener: None,
        }
    }

    /// Attaches the harness's listener.
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn listener(&self) -> Option<Arc<dyn SessionListener>> {
        self.listener.clone()
    }

    pub fn set_proto_listener(&mut self, listener: Arc<dyn SessionListener>) {
        self.proto_listener = Some(listener);
    }

    pub fn proto_listener(&self) -> Option<Arc<dyn SessionListener>> {
        self.proto_listener.clone()
    }

    pub fn state(&self) -> TestState {
        self.state.get()
    }

    pub fn set_state(&self, state: TestState) {
        self.state.set(state);
    }

    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Wraps a connected session as the `index`-th stream of this run.
    pub fn new_stream(&self, index: usize, session: Box<dyn MeasuredSession>) -> Stream {
        Stream::new(
            stream_id_for_index(index),
            session,
            self.config.buffer_size,
            self.state.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_handle_shared() {
        let handle = StateHandle::default();
        let other = handle.clone();
        assert_eq!(handle.get(), TestState::Start);
        assert!(!other.is_running());

        handle.set(TestState::Running);
        assert!(other.is_running());
    }

    #[test]
    fn test_context_state() {
        let test = TestContext::new(Config::default());
        assert_eq!(test.state(), TestState::Start);
        let handle = test.state_handle();
        test.set_state(TestState::End);
        assert_eq!(handle.get(), TestState::End);
        assert!(test.listener().is_none());
        assert!(test.proto_listener().is_none());
    }
}
