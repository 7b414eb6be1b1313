// Initialize-once handle for expensive external capabilities
//
// The detector and the learned inpainter are created on first use, not at
// construction. Creation goes through a RetryPolicy; concurrent first callers
// wait on the same initialization instead of racing. A failed initialization
// leaves the handle empty so a later call starts over, unless the handle was
// built with `with_sticky_failure`.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::core::errors::InitializationError;
use crate::core::retry::RetryPolicy;

pub type CapabilityFactory<T> =
    Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<Arc<T>>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Ready,
    /// Last initialization gave up; the next `get` retries from scratch
    /// unless failures are sticky
    Failed { attempts: usize, message: String },
}

pub struct LazyCapability<T: ?Sized + Send + Sync> {
    name: String,
    cell: OnceCell<Arc<T>>,
    factory: Option<CapabilityFactory<T>>,
    policy: RetryPolicy,
    readiness: RwLock<Readiness>,
    sticky_failure: bool,
}

impl<T: ?Sized + Send + Sync> LazyCapability<T> {
    pub fn new<F>(name: impl Into<String>, policy: RetryPolicy, factory: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<Arc<T>>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            cell: OnceCell::new(),
            factory: Some(Box::new(factory)),
            policy,
            readiness: RwLock::new(Readiness::Uninitialized),
            sticky_failure: false,
        }
    }

    /// Keep the first exhausted initialization for the life of the handle.
    ///
    /// Later `get` calls fail immediately with the recorded error instead of
    /// running the retry policy (and its sleeps) again.
    pub fn with_sticky_failure(mut self) -> Self {
        self.sticky_failure = true;
        self
    }

    /// Already-constructed capability
    pub fn ready(name: impl Into<String>, value: Arc<T>) -> Self {
        Self {
            name: name.into(),
            cell: OnceCell::new_with(Some(value)),
            factory: None,
            policy: RetryPolicy::new(1, std::time::Duration::ZERO),
            readiness: RwLock::new(Readiness::Ready),
            sticky_failure: false,
        }
    }

    /// Capability that can never initialize (no backend configured)
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            name: name.into(),
            cell: OnceCell::new(),
            factory: None,
            policy: RetryPolicy::new(1, std::time::Duration::ZERO),
            readiness: RwLock::new(Readiness::Failed {
                attempts: 0,
                message: reason,
            }),
            sticky_failure: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    /// Return the capability, initializing it first if needed
    pub async fn get(&self) -> Result<Arc<T>, InitializationError> {
        if let Some(err) = self.sticky_error() {
            return Err(err);
        }
        let value = self
            .cell
            .get_or_try_init(|| self.initialize())
            .await?;
        Ok(Arc::clone(value))
    }

    /// Recorded failure, when failures are sticky and one has happened
    fn sticky_error(&self) -> Option<InitializationError> {
        if !self.sticky_failure {
            return None;
        }
        match &*self.readiness.read() {
            Readiness::Failed { attempts, message } => Some(InitializationError {
                capability: self.name.clone(),
                attempts: *attempts,
                message: message.clone(),
            }),
            _ => None,
        }
    }

    async fn initialize(&self) -> Result<Arc<T>, InitializationError> {
        // Callers queued behind a failed first attempt land here too
        if let Some(err) = self.sticky_error() {
            return Err(err);
        }

        let Some(factory) = self.factory.as_ref() else {
            return Err(InitializationError {
                capability: self.name.clone(),
                attempts: 0,
                message: "no factory configured".to_string(),
            });
        };

        info!("Initializing {}...", self.name);
        match self.policy.run(&self.name, |_| factory()).await {
            Ok(value) => {
                *self.readiness.write() = Readiness::Ready;
                info!("✓ {} ready", self.name);
                Ok(value)
            }
            Err(exhausted) => {
                let message = format!("{:#}", exhausted.last_error);
                error!(
                    "{} failed to initialize after {} attempt(s): {}",
                    self.name, exhausted.attempts, message
                );
                *self.readiness.write() = Readiness::Failed {
                    attempts: exhausted.attempts,
                    message: message.clone(),
                };
                Err(InitializationError {
                    capability: self.name.clone(),
                    attempts: exhausted.attempts,
                    message,
                })
            }
        }
    }
}
