//! Single-writer state stores.
//!
//! A store owns its state inside a spawned task. Actions arrive over a
//! channel and are applied one at a time by a pure reducer; every applied
//! action publishes a fresh snapshot.

mod chat;
mod project;

pub use chat::{ChatAction, ChatReducer, ChatState, ChatStore, NEW_CHAT_ID};
pub use project::{ProjectAction, ProjectReducer, ProjectState, ProjectStore};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::llm::ModelProvider;
use crate::services::{ExportService, FileService, Persistence};

/// A closed action type and the pure transition applied for each action.
pub trait Reducer: Send + 'static {
    type State: Clone + Send + Sync + 'static;
    type Action: Send + 'static;

    fn reduce(state: &mut Self::State, action: Self::Action);
}

struct Envelope<A> {
    action: A,
    applied: oneshot::Sender<()>,
}

/// Handle to a running reducer task.
pub struct Store<R: Reducer> {
    tx: mpsc::UnboundedSender<Envelope<R::Action>>,
    snapshots: watch::Receiver<R::State>,
}

impl<R: Reducer> Store<R> {
    /// Start the reducer task. Must be called inside a tokio runtime.
    pub fn spawn(initial: R::State) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<R::Action>>();
        let (snapshot_tx, snapshots) = watch::channel(initial.clone());

        tokio::spawn(async move {
            let mut state = initial;
            while let Some(Envelope { action, applied }) = rx.recv().await {
                R::reduce(&mut state, action);
                snapshot_tx.send_replace(state.clone());
                let _ = applied.send(());
            }
        });

        Self { tx, snapshots }
    }

    /// Apply an action; resolves once the reducer has run it.
    pub async fn dispatch(&self, action: R::Action) {
        let (applied, done) = oneshot::channel();
        if self.tx.send(Envelope { action, applied }).is_err() {
            tracing::warn!("store task has stopped; action dropped");
            return;
        }
        let _ = done.await;
    }

    /// Latest published snapshot.
    pub fn state(&self) -> R::State {
        self.snapshots.borrow().clone()
    }

    /// Read from the latest snapshot without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&R::State) -> T) -> T {
        let snapshot = self.snapshots.borrow();
        f(&*snapshot)
    }

    pub fn subscribe(&self) -> watch::Receiver<R::State> {
        self.snapshots.clone()
    }
}

/// External collaborators shared by the stores.
#[derive(Clone)]
pub struct Collaborators {
    pub persistence: Arc<dyn Persistence>,
    pub files: Arc<dyn FileService>,
    pub provider: Arc<dyn ModelProvider>,
    pub exporter: Arc<dyn ExportService>,
}
