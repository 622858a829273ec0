//! Scripted Stream Source
//!
//! In-process [`StreamSource`] for tests and dry runs. Each subscription is
//! backed by a pump task that forwards messages pushed through a
//! [`ScriptHandle`], acknowledges stop requests by releasing the feed, and
//! closes the stream when the handle is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::{
    SourceError, SourceMessage, StreamSource, Subscription, SubscriptionFeed,
};
use crate::domain::market::{MarketEvent, StreamKind, Symbol};

type StreamKey = (Symbol, StreamKind);

#[derive(Debug, Default)]
struct ScriptState {
    failures: HashSet<StreamKey>,
    ignore_stop: HashSet<StreamKey>,
    handles: HashMap<StreamKey, ScriptHandle>,
    stopped: HashSet<StreamKey>,
    log: Vec<StreamKey>,
}

/// Test-side producer for one scripted subscription.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    tx: mpsc::UnboundedSender<SourceMessage>,
}

impl ScriptHandle {
    /// Push an event.
    pub fn send_event(&self, event: MarketEvent) {
        let _ = self.tx.send(SourceMessage::Event(event));
    }

    /// Push a source error.
    pub fn send_error(&self, error: SourceError) {
        let _ = self.tx.send(SourceMessage::Error(error));
    }

    /// Close the stream once everything already pushed is delivered.
    pub fn close(self) {
        drop(self);
    }
}

/// A stream source driven entirely by the caller.
#[derive(Debug)]
pub struct ScriptedStreamSource {
    state: Arc<Mutex<ScriptState>>,
    capacity: usize,
}

impl Default for ScriptedStreamSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStreamSource {
    /// Create a source with a small event buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    /// Create a source with the given per-subscription buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            capacity,
        }
    }

    /// Make `subscribe` fail for this pair.
    pub fn fail_on(&self, symbol: &Symbol, kind: StreamKind) {
        self.state.lock().failures.insert((symbol.clone(), kind));
    }

    /// Never acknowledge stop requests for this pair.
    pub fn ignore_stop(&self, symbol: &Symbol, kind: StreamKind) {
        self.state.lock().ignore_stop.insert((symbol.clone(), kind));
    }

    /// Take the producer handle of an open subscription.
    ///
    /// The source keeps no copy: dropping the returned handle closes the
    /// stream.
    #[must_use]
    pub fn handle(&self, symbol: &Symbol, kind: StreamKind) -> Option<ScriptHandle> {
        self.state.lock().handles.remove(&(symbol.clone(), kind))
    }

    /// Every subscribe call, in call order, including failed ones.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(Symbol, StreamKind)> {
        self.state.lock().log.clone()
    }

    /// True once the worker asked this subscription to stop.
    #[must_use]
    pub fn stop_requested(&self, symbol: &Symbol, kind: StreamKind) -> bool {
        self.state.lock().stopped.contains(&(symbol.clone(), kind))
    }
}

#[async_trait]
impl StreamSource for ScriptedStreamSource {
    async fn subscribe(
        &self,
        symbol: &Symbol,
        kind: StreamKind,
    ) -> Result<Subscription, SourceError> {
        let key = (symbol.clone(), kind);
        let ignore_stop = {
            let mut state = self.state.lock();
            state.log.push(key.clone());
            if state.failures.contains(&key) {
                return Err(SourceError::Connect {
                    stream: format!("{}@{kind}", symbol.to_stream_name()),
                    message: "scripted failure".to_string(),
                });
            }
            state.ignore_stop.contains(&key)
        };

        let (subscription, feed) = Subscription::channel(self.capacity);
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .handles
            .insert(key.clone(), ScriptHandle { tx });

        tokio::spawn(pump(
            feed,
            rx,
            Arc::clone(&self.state),
            key,
            ignore_stop,
        ));
        Ok(subscription)
    }
}

async fn pump(
    feed: SubscriptionFeed,
    mut rx: mpsc::UnboundedReceiver<SourceMessage>,
    state: Arc<Mutex<ScriptState>>,
    key: StreamKey,
    ignore_stop: bool,
) {
    if ignore_stop {
        // Hold the feed until the handle goes away, whatever the worker does.
        while let Some(message) = rx.recv().await {
            let _ = feed.publish(message).await;
        }
        return;
    }

    loop {
        tokio::select! {
            biased;

            () = feed.stopped() => {
                state.lock().stopped.insert(key.clone());
                break;
            }

            message = rx.recv() => match message {
                Some(message) => {
                    if !feed.publish(message).await {
                        state.lock().stopped.insert(key.clone());
                        break;
                    }
                }
                None => break,
            },
        }
    }
}
