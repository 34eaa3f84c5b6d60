//! Per-invocation progress channel.
//!
//! Every tool invocation owns one ordered channel. The [`ProgressEmitter`]
//! half is handed to the handler; the [`Invocation`] half goes to the
//! transport, which renders frames in the order they were pushed. Exactly one
//! terminal frame (`complete` or `error`) is ever sent; anything emitted after
//! it is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::Stream;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::BankError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Initializing,
    InProgress,
    Complete,
    Error,
}

impl ProgressStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressFrame {
    /// Id of the request this frame belongs to.
    pub related_id: Value,
    pub status: ProgressStatus,
    /// Handler-specific fields, flattened into the payload.
    pub data: Value,
}

impl ProgressFrame {
    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    /// `{status, isFinal, ...data}`. Non-object data lands under `result`.
    pub fn payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("status".into(), serde_json::json!(self.status));
        payload.insert("isFinal".into(), Value::Bool(self.is_final()));
        match &self.data {
            Value::Object(fields) => {
                for (k, v) in fields {
                    if k != "status" && k != "isFinal" {
                        payload.insert(k.clone(), v.clone());
                    }
                }
            }
            Value::Null => {}
            other => {
                payload.insert("result".into(), other.clone());
            }
        }
        Value::Object(payload)
    }
}

struct EmitterState {
    related_id: Value,
    tx: mpsc::UnboundedSender<ProgressFrame>,
    /// Held while sending so no frame can follow the terminal one.
    finished: Mutex<bool>,
    disconnected: AtomicBool,
}

/// Sending half of an invocation's progress channel. Cheap to clone and safe
/// to use from blocking threads.
#[derive(Clone)]
pub struct ProgressEmitter {
    inner: Arc<EmitterState>,
}

impl ProgressEmitter {
    pub fn related_id(&self) -> &Value {
        &self.inner.related_id
    }

    pub(crate) fn initializing(&self, data: Value) -> bool {
        self.send(ProgressStatus::Initializing, data)
    }

    /// Report intermediate state. Returns `false` if the frame was not delivered.
    pub fn progress(&self, data: Value) -> bool {
        self.send(ProgressStatus::InProgress, data)
    }

    /// Send the terminal success frame. Returns `false` if the invocation had
    /// already terminated or the receiver is gone.
    pub fn complete(&self, data: Value) -> bool {
        self.send(ProgressStatus::Complete, data)
    }

    /// Send the terminal error frame carrying `{error, kind, fields?}`.
    pub fn error(&self, err: &BankError) -> bool {
        self.send(ProgressStatus::Error, err.to_payload())
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.lock().map(|f| *f).unwrap_or(true)
    }

    /// Whether a send failed because the receiving transport went away.
    pub fn is_disconnected(&self) -> bool {
        self.inner.disconnected.load(Ordering::SeqCst)
    }

    fn send(&self, status: ProgressStatus, data: Value) -> bool {
        let Ok(mut finished) = self.inner.finished.lock() else {
            return false;
        };
        if *finished {
            return false;
        }
        if status.is_final() {
            *finished = true;
        }
        let frame = ProgressFrame {
            related_id: self.inner.related_id.clone(),
            status,
            data,
        };
        if self.inner.tx.send(frame).is_err() {
            self.inner.disconnected.store(true, Ordering::SeqCst);
            return false;
        }
        true
    }
}

/// Receiving half of an invocation's progress channel.
#[derive(Debug)]
pub struct Invocation {
    related_id: Value,
    rx: mpsc::UnboundedReceiver<ProgressFrame>,
}

impl Invocation {
    /// A fresh channel for the request `related_id`.
    pub fn channel(related_id: Value) -> (ProgressEmitter, Invocation) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = ProgressEmitter {
            inner: Arc::new(EmitterState {
                related_id: related_id.clone(),
                tx,
                finished: Mutex::new(false),
                disconnected: AtomicBool::new(false),
            }),
        };
        (emitter, Invocation { related_id, rx })
    }

    pub fn related_id(&self) -> &Value {
        &self.related_id
    }

    /// Next frame, or `None` once every emitter is gone.
    pub async fn next_frame(&mut self) -> Option<ProgressFrame> {
        self.rx.recv().await
    }

    /// Frames in emission order, ending with the terminal frame.
    pub fn into_stream(self) -> impl Stream<Item = ProgressFrame> + Send + 'static {
        futures::stream::unfold(Some(self), |state| async move {
            let mut invocation = state?;
            let frame = invocation.rx.recv().await?;
            let next = if frame.is_final() { None } else { Some(invocation) };
            Some((frame, next))
        })
    }

    /// Skip intermediate frames and return the terminal one.
    pub async fn finish(mut self) -> Option<ProgressFrame> {
        while let Some(frame) = self.rx.recv().await {
            if frame.is_final() {
                return Some(frame);
            }
        }
        None
    }

    /// Every frame up to and including the terminal one.
    pub async fn collect(mut self) -> Vec<ProgressFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.rx.recv().await {
            let done = frame.is_final();
            frames.push(frame);
            if done {
                break;
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_keep_emission_order() {
        let (emitter, invocation) = Invocation::channel(json!(7));
        emitter.initializing(json!({"tool": "t"}));
        emitter.progress(json!({"step": 1}));
        emitter.progress(json!({"step": 2}));
        assert!(emitter.complete(json!({"done": true})));
        drop(emitter);

        let frames = invocation.collect().await;
        let statuses: Vec<ProgressStatus> = frames.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![
                ProgressStatus::Initializing,
                ProgressStatus::InProgress,
                ProgressStatus::InProgress,
                ProgressStatus::Complete
            ]
        );
        assert_eq!(frames.iter().filter(|f| f.is_final()).count(), 1);
        assert_eq!(frames[1].payload()["step"], 1);
    }

    #[tokio::test]
    async fn nothing_follows_terminal_frame() {
        let (emitter, invocation) = Invocation::channel(json!("a"));
        assert!(emitter.error(&BankError::not_found("component", "x")));
        assert!(!emitter.complete(json!({})));
        assert!(!emitter.progress(json!({})));
        assert!(emitter.is_finished());
        let frame = invocation.finish().await.unwrap();
        assert_eq!(frame.status, ProgressStatus::Error);
        assert_eq!(frame.payload()["kind"], "not_found");
    }

    #[tokio::test]
    async fn dropped_receiver_marks_disconnect() {
        let (emitter, invocation) = Invocation::channel(json!(1));
        drop(invocation);
        assert!(!emitter.progress(json!({})));
        assert!(emitter.is_disconnected());
    }

    #[test]
    fn payload_flattens_object_fields() {
        let frame = ProgressFrame {
            related_id: json!(1),
            status: ProgressStatus::InProgress,
            data: json!({"currentIteration": 3}),
        };
        let payload = frame.payload();
        assert_eq!(payload["status"], "in_progress");
        assert_eq!(payload["isFinal"], false);
        assert_eq!(payload["currentIteration"], 3);
    }
}
