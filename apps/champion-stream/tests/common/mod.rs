//! Shared test fixtures: a backend driven step by step from the test.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use champion_stream::{
    BackendKind, Endpoint, MessageHandler, StreamBackend, StreamEnd, StreamMessage,
    TransportDefaults, TransportError, TransportEvents, message_handler,
};

/// One scripted transport event.
#[derive(Debug)]
pub enum Step {
    Open,
    Message(StreamMessage),
    Fail(TransportError),
    End,
}

/// Backend whose runs replay steps pushed by the test.
pub struct ScriptedBackend {
    defaults: TransportDefaults,
    runs: AtomicUsize,
    endpoints: Mutex<Vec<Endpoint>>,
    steps: tokio::sync::Mutex<mpsc::UnboundedReceiver<Step>>,
}

/// Test-side handle for pushing steps.
#[derive(Clone)]
pub struct Script {
    tx: mpsc::UnboundedSender<Step>,
    backend: Arc<ScriptedBackend>,
}

impl Script {
    pub fn open(&self) {
        self.push(Step::Open);
    }

    pub fn message(&self, text: &str) {
        self.push(Step::Message(StreamMessage::payload(text)));
    }

    pub fn heartbeat(&self) {
        self.push(Step::Message(StreamMessage::Heartbeat));
    }

    pub fn fail(&self, error: TransportError) {
        self.push(Step::Fail(error));
    }

    pub fn end(&self) {
        self.push(Step::End);
    }

    pub fn push(&self, step: Step) {
        self.tx.send(step).unwrap();
    }

    pub fn runs(&self) -> usize {
        self.backend.runs.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.backend.endpoints.lock().clone()
    }

    pub fn backend(&self) -> Arc<dyn StreamBackend> {
        self.backend.clone()
    }
}

/// Create a scripted backend with the given defaults.
pub fn scripted(auto_reconnect: bool, reconnect_on_end: bool) -> Script {
    let (tx, rx) = mpsc::unbounded_channel();
    let backend = Arc::new(ScriptedBackend {
        defaults: TransportDefaults {
            auto_reconnect,
            reconnect_on_end,
        },
        runs: AtomicUsize::new(0),
        endpoints: Mutex::new(Vec::new()),
        steps: tokio::sync::Mutex::new(rx),
    });
    Script { tx, backend }
}

#[async_trait]
impl StreamBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::EventSource
    }

    fn defaults(&self) -> TransportDefaults {
        self.defaults
    }

    async fn run(
        &self,
        endpoint: &Endpoint,
        events: &dyn TransportEvents,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, TransportError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().push(endpoint.clone());

        let mut steps = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            guard = self.steps.lock() => guard,
        };

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                step = steps.recv() => step,
            };

            match step {
                Some(Step::Open) => events.opened(),
                Some(Step::Message(message)) => {
                    if cancel.is_cancelled() {
                        return Ok(StreamEnd::Cancelled);
                    }
                    events.message(message);
                }
                Some(Step::Fail(error)) => return Err(error),
                Some(Step::End) | None => return Ok(StreamEnd::Completed),
            }
        }
    }
}

/// Handler that records the legacy text of every message.
pub fn recorder() -> (MessageHandler, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = message_handler(move |message| sink.lock().push(message.data().into_owned()));
    (handler, seen)
}

/// Let spawned tasks run without reaching any reconnect timer.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
