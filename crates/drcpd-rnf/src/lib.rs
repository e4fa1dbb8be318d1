//! Async call envelope (C2): a four-state object wrapping one broker RPC
//! that may run long, plus an absorbing cancelled state.
//!
//! `initial -> requested -> notified -> fetched`, with `cancel()` reachable
//! from the first three. Two broker signals drive the `requested ->
//! notified` edge: `DataAvailable` (success) and `DataError` (failure).

use std::sync::Arc;

use drcpd_ids::{Cookie, EnvelopeError, ListError};
use parking_lot::Mutex;
use tokio::sync::Notify;

enum State<T> {
    Initial,
    Requested(Cookie),
    Notified(Cookie, Result<T, ListError>),
    Fetched(Result<T, ListError>),
    Cancelled,
}

/// One in-flight (or completed) async broker call.
///
/// `T` is the payload type the broker eventually delivers (a range of
/// items, a list of URIs, ...). Cloned cheaply via `Arc` so the caller that
/// issued `request()` and the bus-I/O thread that later calls
/// `on_data_available`/`on_data_error` can share one envelope.
pub struct Envelope<T> {
    state: Mutex<State<T>>,
    notified: Notify,
}

impl<T> Envelope<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Envelope {
            state: Mutex::new(State::Initial),
            notified: Notify::new(),
        })
    }

    /// Move `initial -> requested`. Idempotent once already `requested` with
    /// the same cookie; `BadState` if called after notification or cancel,
    /// or with a different cookie while already requested.
    pub fn request(&self, cookie: Cookie) -> Result<Cookie, EnvelopeError> {
        let mut state = self.state.lock();
        match &*state {
            State::Initial => {
                *state = State::Requested(cookie);
                Ok(cookie)
            }
            State::Requested(existing) if *existing == cookie => Ok(cookie),
            _ => Err(EnvelopeError::BadState),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.state.lock(), State::Cancelled)
    }

    /// Broker signalled success for `cookie`. No-op (and `false`) if this
    /// envelope is not waiting on that exact cookie, or if it has already
    /// been cancelled — a late reply after cancellation is dropped.
    pub fn on_data_available(&self, cookie: Cookie, payload: T) -> bool {
        let mut state = self.state.lock();
        match &*state {
            State::Requested(expected) if *expected == cookie => {
                *state = State::Notified(cookie, Ok(payload));
                drop(state);
                self.notified.notify_waiters();
                true
            }
            _ => false,
        }
    }

    pub fn on_data_error(&self, cookie: Cookie, error: ListError) -> bool {
        let mut state = self.state.lock();
        match &*state {
            State::Requested(expected) if *expected == cookie => {
                *state = State::Notified(cookie, Err(error));
                drop(state);
                self.notified.notify_waiters();
                true
            }
            _ => false,
        }
    }

    /// Atomic transition to `cancelled` from any of the first three states.
    /// A no-op once already `fetched` or `cancelled`.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(&*state, State::Fetched(_) | State::Cancelled) {
            return;
        }
        *state = State::Cancelled;
        drop(state);
        self.notified.notify_waiters();
    }

    /// `notified -> fetched`. Fails with `BadState` before `notified`, or
    /// `Aborted` if cancelled.
    fn try_fetch(&self) -> Result<(), EnvelopeError>
    where
        T: Clone,
    {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Cancelled) {
            State::Notified(_, payload) => {
                *state = State::Fetched(payload);
                Ok(())
            }
            State::Cancelled => {
                *state = State::Cancelled;
                Err(EnvelopeError::Aborted)
            }
            other @ (State::Initial | State::Requested(_)) => {
                *state = other;
                Err(EnvelopeError::BadState)
            }
            State::Fetched(payload) => {
                *state = State::Fetched(payload);
                Err(EnvelopeError::BadState)
            }
        }
    }

    /// Wait for the reply to arrive (or cancellation), then transition into
    /// `fetched`.
    pub async fn fetch_async(&self) -> Result<(), EnvelopeError>
    where
        T: Clone,
    {
        loop {
            // Must be created before inspecting state: Notify's internal
            // generation counter makes this ordering race-free against a
            // concurrent on_data_available/on_data_error/cancel.
            let notified = self.notified.notified();
            if matches!(&*self.state.lock(), State::Notified(..) | State::Cancelled) {
                return self.try_fetch();
            }
            notified.await;
        }
    }

    /// Blocking variant of [`fetch_async`], for call sites that are not
    /// themselves inside the async executor. Spins up a minimal
    /// current-thread runtime if none is already active.
    pub fn fetch_blocking(&self) -> Result<(), EnvelopeError>
    where
        T: Clone,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(self.fetch_async())),
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build a local runtime for fetch_blocking");
                rt.block_on(self.fetch_async())
            }
        }
    }

    /// The payload, once `fetched`. `NoResult` otherwise.
    pub fn get_result(&self) -> Result<T, EnvelopeError>
    where
        T: Clone,
    {
        match &*self.state.lock() {
            State::Fetched(Ok(payload)) => Ok(payload.clone()),
            State::Fetched(Err(_)) | State::Cancelled => Err(EnvelopeError::NoResult),
            _ => Err(EnvelopeError::NoResult),
        }
    }

    /// The broker-level error, if `fetched` with a failure payload.
    pub fn get_error(&self) -> Option<ListError> {
        match &*self.state.lock() {
            State::Fetched(Err(e)) => Some(*e),
            _ => None,
        }
    }
}
