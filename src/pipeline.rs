//! # Provider / transformer chain
//!
//! Data flows through two kinds of stages:
//!
//! * a [`DataProvider`] gathers the requirements of its consumers and turns them into one or
//!   more LaTiS requests,
//! * a [`DataTransformer`] reshapes what the stage before it produced.
//!
//! The shared behaviour of a transformer that publishes results (its own requirements
//! manager, the retained "data ready" value, the last raw input for replay, and cancellation
//! of a superseded reload) lives in [`TransformerCore`].
//!
//! ## Data ready
//!
//! [`DataReady`] is a retained-value channel: the last published value is kept, so a consumer
//! that subscribes after the publication still sees it, synchronously through
//! [`DataReady::current`] or asynchronously through a [`tokio::sync::watch`] receiver.
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

use crate::{maven_errors::MavenError, requirements::RequirementsManager};

/// First stage of a chain: fetches raw data according to the gathered requirements.
#[async_trait]
pub trait DataProvider: Send + Sync {
    type Output: Send + Sync;

    /// Manager on which downstream stages register their requirements.
    fn requirements_manager(&self) -> &RequirementsManager;

    async fn request_data(&self) -> Result<Self::Output, MavenError>;
}

/// Pure reshaping stage of a chain.
pub trait DataTransformer: Send + Sync {
    type Input;
    type Output;

    fn transform(&self, input: &Self::Input) -> Result<Self::Output, MavenError>;
}

type Listener<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

/// Retained "data ready" notification.
pub struct DataReady<T> {
    sender: watch::Sender<Option<Arc<T>>>,
    listeners: RwLock<Vec<Listener<T>>>,
}

impl<T> std::fmt::Debug for DataReady<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReady")
            .field("published", &self.sender.borrow().is_some())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Default for DataReady<T> {
    fn default() -> Self {
        DataReady {
            sender: watch::Sender::new(None),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Send + Sync + 'static> DataReady<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last published value, if any.
    pub fn current(&self) -> Option<Arc<T>> {
        self.sender.borrow().clone()
    }

    /// Receiver observing every future publication; its initial value is the current one.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.sender.subscribe()
    }

    /// Call `listener` on every publication. If a value was already published, the listener is
    /// called with it right away.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(listener);
        self.listeners.write().push(listener.clone());
        if let Some(current) = self.current() {
            listener(&current);
        }
    }

    /// Replace the retained value and notify the listeners.
    pub fn publish(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.sender.send_replace(Some(value.clone()));

        // listeners may publish or register in turn: never call them under the lock
        let listeners: Vec<Listener<T>> = self.listeners.read().clone();
        for listener in listeners {
            listener(&value);
        }
        value
    }
}

/// State shared by every publishing transformer.
///
/// * `I`: the raw input kept for replay
/// * `O`: the published output
pub struct TransformerCore<I, O> {
    requirements_manager: RequirementsManager,
    data_ready: DataReady<O>,
    cached_input: RwLock<Option<Arc<I>>>,
    current_reload: Mutex<Option<AbortHandle>>,
    generation: AtomicU64,
}

impl<I, O> std::fmt::Debug for TransformerCore<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerCore")
            .field("requirements_manager", &self.requirements_manager)
            .field("data_ready", &self.data_ready)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl<I, O> Default for TransformerCore<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn default() -> Self {
        TransformerCore {
            requirements_manager: RequirementsManager::new(),
            data_ready: DataReady::new(),
            cached_input: RwLock::new(None),
            current_reload: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }
}

impl<I, O> TransformerCore<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requirements_manager(&self) -> &RequirementsManager {
        &self.requirements_manager
    }

    pub fn data_ready(&self) -> &DataReady<O> {
        &self.data_ready
    }

    pub fn cached_input(&self) -> Option<Arc<I>> {
        self.cached_input.read().clone()
    }

    /// Run one load → transform → publish cycle.
    ///
    /// A cycle started while another is still loading cancels the older one: its load future
    /// is dropped (releasing its fetches) and it resolves to [`MavenError::Aborted`]. Only the
    /// newest cycle publishes.
    ///
    /// Arguments
    /// ---------
    /// * `load`: future producing the raw input
    /// * `transform`: turns the raw input into the published output
    pub async fn reload<Fut, T>(&self, load: Fut, transform: T) -> Result<Arc<O>, MavenError>
    where
        Fut: Future<Output = Result<Arc<I>, MavenError>>,
        T: FnOnce(&I) -> Result<O, MavenError>,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (handle, registration) = AbortHandle::new_pair();
        if let Some(previous) = self.current_reload.lock().replace(handle) {
            debug!(generation, "cancelling previous reload");
            previous.abort();
        }

        let input = Abortable::new(load, registration)
            .await
            .map_err(|_| MavenError::Aborted)??;

        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(MavenError::Aborted);
        }
        *self.cached_input.write() = Some(input.clone());
        let output = transform(&input)?;
        Ok(self.data_ready.publish(output))
    }

    /// Transform the last loaded input again and publish, without fetching.
    ///
    /// Return
    /// ------
    /// * `Ok(None)` if nothing was loaded yet
    pub fn replay<T>(&self, transform: T) -> Result<Option<Arc<O>>, MavenError>
    where
        T: FnOnce(&I) -> Result<O, MavenError>,
    {
        let Some(input) = self.cached_input() else {
            return Ok(None);
        };
        let output = transform(&input)?;
        Ok(Some(self.data_ready.publish(output)))
    }
}
