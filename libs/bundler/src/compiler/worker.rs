//! Dedicated compiler thread speaking a tagged message protocol.
//!
//! The thread initialises its backend, announces `loaded`, then answers `compile` requests
//! one at a time with `compile_result`. Every request carries an id; the dispatcher task on
//! the async side routes results back to the caller waiting on that id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backend::BackendLoader;
use super::input::CompilerRequest;
use super::output::CompilerOutput;
use crate::internal::errors::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerRequest {
  Compile { id: u64, request: CompilerRequest },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerMessage {
  Loaded,
  CompileResult { id: u64, result: CompileOutcome },
  Failed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileOutcome {
  Output(CompilerOutput),
  Error(String),
}

impl CompileOutcome {
  fn into_result(self) -> Result<CompilerOutput> {
    match self {
      CompileOutcome::Output(output) => Ok(output),
      CompileOutcome::Error(message) => Err(Error::Transport(message)),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum WorkerState {
  Loading,
  Ready,
  Failed(String),
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<CompilerOutput>>>>>;

pub(crate) struct Worker {
  requests: mpsc::UnboundedSender<WorkerRequest>,
  state: watch::Receiver<WorkerState>,
  pending: Pending,
  next_id: AtomicU64,
  dispatcher: JoinHandle<()>,
}

impl Worker {
  /// Start the compiler thread and its dispatcher. Must be called within a Tokio runtime.
  pub(crate) fn spawn(loader: BackendLoader) -> Result<Self> {
    let runtime = Handle::try_current()
      .map_err(|err| Error::Transport(format!("Compiler worker requires a Tokio runtime: {err}")))?;

    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(WorkerState::Loading);
    let pending: Pending = Arc::default();

    thread::Builder::new()
      .name("solc-worker".to_string())
      .spawn(move || run_worker(loader, request_rx, message_tx))
      .map_err(|err| Error::io("Failed to spawn compiler worker", err))?;

    let dispatcher = runtime.spawn(dispatch(message_rx, state_tx, Arc::clone(&pending)));
    debug!("compiler worker spawned");

    Ok(Self {
      requests: request_tx,
      state: state_rx,
      pending,
      next_id: AtomicU64::new(1),
      dispatcher,
    })
  }

  pub(crate) async fn compile(&self, request: CompilerRequest) -> Result<CompilerOutput> {
    self.wait_until_loaded().await?;

    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let (reply_tx, reply_rx) = oneshot::channel();
    lock(&self.pending).insert(id, reply_tx);

    if self
      .requests
      .send(WorkerRequest::Compile { id, request })
      .is_err()
    {
      lock(&self.pending).remove(&id);
      return Err(Error::Transport(
        "compiler worker is no longer accepting requests".to_string(),
      ));
    }

    reply_rx
      .await
      .map_err(|_| Error::Transport("compiler worker exited before replying".to_string()))?
  }

  /// Requests issued before `loaded` wait here instead of racing the runtime start-up.
  async fn wait_until_loaded(&self) -> Result<()> {
    let mut state = self.state.clone();
    let current = state
      .wait_for(|state| !matches!(state, WorkerState::Loading))
      .await
      .map_err(|_| Error::Transport("compiler worker stopped while loading".to_string()))?;
    match &*current {
      WorkerState::Failed(message) => Err(Error::Transport(message.clone())),
      _ => Ok(()),
    }
  }

  /// Close the request channel and wait for the dispatcher to drain.
  pub(crate) async fn shutdown(self) {
    let Worker {
      requests,
      dispatcher,
      ..
    } = self;
    drop(requests);
    if let Err(err) = dispatcher.await {
      warn!(%err, "compiler worker dispatcher ended abnormally");
    }
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(
  loader: BackendLoader,
  mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
  messages: mpsc::UnboundedSender<WorkerMessage>,
) {
  let backend = match loader() {
    Ok(backend) => backend,
    Err(err) => {
      let _ = messages.send(WorkerMessage::Failed {
        message: transport_message(err),
      });
      return;
    }
  };
  if messages.send(WorkerMessage::Loaded).is_err() {
    return;
  }

  while let Some(WorkerRequest::Compile { id, request }) = requests.blocking_recv() {
    let result = match backend.compile(&request) {
      Ok(output) => CompileOutcome::Output(output),
      Err(err) => CompileOutcome::Error(transport_message(err)),
    };
    if messages
      .send(WorkerMessage::CompileResult { id, result })
      .is_err()
    {
      break;
    }
  }
  debug!("compiler worker stopped");
}

fn transport_message(err: Error) -> String {
  match err {
    Error::Transport(message) => message,
    other => other.to_string(),
  }
}

async fn dispatch(
  mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
  state: watch::Sender<WorkerState>,
  pending: Pending,
) {
  while let Some(message) = messages.recv().await {
    match message {
      WorkerMessage::Loaded => {
        debug!("compiler worker loaded");
        state.send_replace(WorkerState::Ready);
      }
      WorkerMessage::CompileResult { id, result } => match lock(&pending).remove(&id) {
        Some(reply) => {
          let _ = reply.send(result.into_result());
        }
        None => warn!(id, "dropping compile result with no pending request"),
      },
      WorkerMessage::Failed { message } => {
        warn!(%message, "compiler worker failed to load");
        state.send_replace(WorkerState::Failed(message));
      }
    }
  }

  state.send_if_modified(|current| {
    if matches!(current, WorkerState::Failed(_)) {
      return false;
    }
    *current = WorkerState::Failed("compiler worker exited".to_string());
    true
  });
  // Dropping the senders wakes every waiter with a transport error.
  lock(&pending).clear();
}
