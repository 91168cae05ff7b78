//! Test doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::{ConversionError, InputRef};
use crate::ports::Converter;

/// How [`ScriptedConverter`] reacts to one input.
#[derive(Clone)]
pub(crate) enum Behavior {
    Succeed(Vec<u8>),
    /// The named program exits with status 1.
    Fail(String),
    /// Never finishes; counts as cancelled once the future is dropped.
    Hang,
    /// Succeeds after the gate is notified.
    WaitFor(Arc<Notify>),
    Panic,
}

/// Converter scripted per input path. Unscripted inputs succeed with the
/// path's bytes as the payload.
#[derive(Default)]
pub(crate) struct ScriptedConverter {
    script: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<String>>,
    cancelled: Arc<AtomicUsize>,
}

struct CancelGuard(Arc<AtomicUsize>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedConverter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(&self, input: &str, behavior: Behavior) {
        self.script.lock().unwrap().insert(input.to_string(), behavior);
    }

    /// Script `input` to block until the returned gate is notified.
    pub(crate) fn gate(&self, input: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.on(input, Behavior::WaitFor(Arc::clone(&gate)));
        gate
    }

    /// Inputs in the order conversions were started.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for ScriptedConverter {
    async fn convert(&self, input: &InputRef) -> Result<Vec<u8>, ConversionError> {
        let key = input.to_string();
        self.calls.lock().unwrap().push(key.clone());
        let behavior = self.script.lock().unwrap().get(&key).cloned();

        match behavior {
            None => Ok(key.into_bytes()),
            Some(Behavior::Succeed(bytes)) => Ok(bytes),
            Some(Behavior::Fail(program)) => Err(ConversionError::exit_status(program, Some(1), None)),
            Some(Behavior::Hang) => {
                let _guard = CancelGuard(Arc::clone(&self.cancelled));
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Behavior::WaitFor(gate)) => {
                gate.notified().await;
                Ok(key.into_bytes())
            }
            Some(Behavior::Panic) => panic!("scripted panic for {key}"),
        }
    }
}
