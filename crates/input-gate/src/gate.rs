// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The consumer's single pull interface over its input channels.
//!
//! An [`InputGate`] owns its channels and decides when they request their
//! subpartitions and when they are released. Channels are polled
//! round-robin; one shared [`Notify`] acts as the availability listener of
//! every channel, so a suspended [`get_next`](InputGate::get_next) wakes as
//! soon as any upstream subpartition has something to say.

use crate::channel::{ChannelPoll, InputChannel};
use crate::GateError;
use buffer_pool::Buffer;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};

/// A buffer read through a gate, tagged with its source channel.
#[derive(Debug)]
pub struct BufferOrEvent {
    pub buffer: Buffer,
    pub channel_index: usize,
    /// More data is already queued on the source channel.
    pub more_available: bool,
}

enum Polled {
    Buffer(BufferOrEvent),
    Pending,
    AllFinished,
}

struct GateState {
    requested: bool,
    closed: bool,
    finished: Vec<bool>,
    next_channel: usize,
}

/// Aggregates the input channels of one consuming task.
pub struct InputGate {
    name: String,
    channels: Vec<Box<dyn InputChannel>>,
    available: Arc<Notify>,
    state_consumed: watch::Sender<bool>,
    state: Mutex<GateState>,
}

impl InputGate {
    pub fn new(name: impl Into<String>, channels: Vec<Box<dyn InputChannel>>) -> Self {
        let name = name.into();
        let (state_consumed, _) = watch::channel(false);
        tracing::debug!("gate '{name}' created with {} channels", channels.len());
        Self {
            state: Mutex::new(GateState {
                requested: false,
                closed: false,
                finished: vec![false; channels.len()],
                next_channel: 0,
            }),
            name,
            channels,
            available: Arc::new(Notify::new()),
            state_consumed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// A channel released through this handle counts as finished for
    /// [`get_next`](Self::get_next).
    pub fn channel(&self, index: usize) -> Option<&dyn InputChannel> {
        self.channels.get(index).map(|c| c.as_ref())
    }

    // ── Recovery handshake ──────────────────────────────────────

    /// Completes the recovered-state handshake. Partitions may only be
    /// requested afterwards.
    pub fn finish_read_recovered_state(&self) {
        if !self.state_consumed.send_replace(true) {
            tracing::debug!("gate '{}' recovered state consumed", self.name);
        }
    }

    pub fn is_state_consumed(&self) -> bool {
        *self.state_consumed.borrow()
    }

    /// Resolves once [`finish_read_recovered_state`](Self::finish_read_recovered_state)
    /// has been called.
    pub fn state_consumed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state_consumed.subscribe();
        async move {
            // The sender lives as long as the gate; a dropped gate has
            // nothing left to wait for.
            let _ = rx.wait_for(|consumed| *consumed).await;
        }
    }

    // ── Partition requests ──────────────────────────────────────

    /// Requests the subpartition of every channel. Idempotent.
    pub fn request_partitions(&self) -> Result<(), GateError> {
        let mut state = self.lock();
        if state.closed {
            return Err(GateError::GateClosed(self.name.clone()));
        }
        if !self.is_state_consumed() {
            return Err(GateError::RecoveredStateNotConsumed(self.name.clone()));
        }
        if state.requested {
            return Ok(());
        }
        for channel in &self.channels {
            channel.request_subpartition(self.available.clone())?;
        }
        state.requested = true;
        tracing::info!(
            "gate '{}' requested {} partitions",
            self.name,
            self.channels.len()
        );
        Ok(())
    }

    pub fn is_requested(&self) -> bool {
        self.lock().requested
    }

    // ── Reading ─────────────────────────────────────────────────

    /// Returns the next buffer from any channel, or `None` once every
    /// channel has reached end-of-stream or the gate is closed.
    ///
    /// Suspends while no channel has data.
    pub async fn get_next(&self) -> Result<Option<BufferOrEvent>, GateError> {
        if !self.is_requested() {
            return Err(GateError::PartitionsNotRequested(self.name.clone()));
        }
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.poll_channels()? {
                Polled::Buffer(next) => return Ok(Some(next)),
                Polled::AllFinished => return Ok(None),
                Polled::Pending => notified.await,
            }
        }
    }

    /// Non-blocking variant of [`get_next`](Self::get_next). Returns `None`
    /// while partitions have not been requested yet (recovery phase).
    pub fn poll_next(&self) -> Result<Option<BufferOrEvent>, GateError> {
        if !self.is_requested() {
            return Ok(None);
        }
        match self.poll_channels()? {
            Polled::Buffer(next) => Ok(Some(next)),
            Polled::Pending | Polled::AllFinished => Ok(None),
        }
    }

    /// Returns `true` once every channel has delivered end-of-stream.
    pub fn is_finished(&self) -> bool {
        let state = self.lock();
        state.closed || state.finished.iter().all(|f| *f)
    }

    fn poll_channels(&self) -> Result<Polled, GateError> {
        let mut state = self.lock();
        if state.closed {
            return Ok(Polled::AllFinished);
        }
        let n = self.channels.len();
        for offset in 0..n {
            let i = (state.next_channel + offset) % n;
            if state.finished[i] {
                continue;
            }
            match self.channels[i].poll_next() {
                Ok(ChannelPoll::Buffer(b)) => {
                    state.next_channel = (i + 1) % n;
                    return Ok(Polled::Buffer(BufferOrEvent {
                        buffer: b.buffer,
                        channel_index: self.channels[i].channel_index(),
                        more_available: b.backlog > 0,
                    }));
                }
                Ok(ChannelPoll::Empty) => {}
                Ok(ChannelPoll::EndOfStream) => {
                    state.finished[i] = true;
                    tracing::debug!("gate '{}' channel {i} finished", self.name);
                }
                // Released through `channel()`: it delivers nothing more.
                Err(GateError::ChannelReleased(_)) => {
                    state.finished[i] = true;
                    tracing::debug!("gate '{}' channel {i} released early", self.name);
                }
                Err(e) => return Err(e),
            }
        }
        if state.finished.iter().all(|f| *f) {
            Ok(Polled::AllFinished)
        } else {
            Ok(Polled::Pending)
        }
    }

    // ── Teardown ────────────────────────────────────────────────

    /// Releases every channel and wakes any suspended reader. Idempotent.
    ///
    /// Every channel is released even if one fails; the first error is
    /// returned.
    pub fn close(&self) -> Result<(), GateError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }

        let mut first_error = None;
        let mut recycled = 0;
        for channel in &self.channels {
            match channel.release() {
                Ok(n) => recycled += n,
                Err(e) => {
                    tracing::error!(
                        "gate '{}' channel {} release failed: {e}",
                        self.name,
                        channel.channel_index()
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        self.available.notify_waiters();
        tracing::info!("gate '{}' closed ({recycled} buffers recycled)", self.name);

        first_error.map_or(Ok(()), Err)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl std::fmt::Debug for InputGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InputGate")
            .field("name", &self.name)
            .field("channels", &self.channels.len())
            .field("requested", &state.requested)
            .field("closed", &state.closed)
            .finish()
    }
}
