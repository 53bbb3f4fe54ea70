//! Ordered composition of interceptors around a terminal handler.
//!
//! A pipeline sends one traveler (usually an HTTP request) through a list of
//! stages. Every stage receives the traveler plus a continuation standing for
//! "the rest of the chain" and may:
//! - transform the traveler before calling the continuation,
//! - post-process whatever the continuation returns,
//! - or return early without calling it at all (short-circuit).
//!
//! The first listed stage is the outermost one:
//! `stage1(t, |t| stage2(t, |t| ... stageN(t, destination)))`.
//!
//! The executor is synchronous and generic over the output type. Async callers
//! pick a boxed future as `R`, which is how the stateful HTTP wrapper uses it.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

/// The rest of the chain, handed to a stage. Calling it runs every inner stage
/// and finally the destination.
pub type Continuation<T, R> = Box<dyn FnOnce(T) -> R + Send>;

/// A resolved, invocable stage.
pub type Interceptor<T, R> = Arc<dyn Fn(T, Continuation<T, R>) -> R + Send + Sync>;

/// One entry of a pipeline.
pub enum Stage<T, R> {
    /// A stage ready to run.
    Resolved(Interceptor<T, R>),
    /// A symbolic reference that must be resolved through a [`StageResolver`]
    /// before the chain is built.
    Named(String),
}

impl<T, R> Stage<T, R> {
    /// Wrap a closure as a resolved stage.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(T, Continuation<T, R>) -> R + Send + Sync + 'static,
    {
        Self::Resolved(Arc::new(f))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl<T, R> Clone for Stage<T, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Resolved(f) => Self::Resolved(Arc::clone(f)),
            Self::Named(name) => Self::Named(name.clone()),
        }
    }
}

impl<T, R> fmt::Debug for Stage<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(_) => f.write_str("Stage::Resolved(..)"),
            Self::Named(name) => f.debug_tuple("Stage::Named").field(name).finish(),
        }
    }
}

/// Turns symbolic stage names into invocable stages.
pub trait StageResolver<T, R>: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Interceptor<T, R>>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline stage `{0}` could not be resolved")]
    UnresolvedStage(String),
}

/// A traveler plus the stages it will be sent through.
pub struct Pipeline<T, R> {
    traveler: T,
    stages: Vec<Stage<T, R>>,
}

impl<T, R> Pipeline<T, R>
where
    T: Send + 'static,
    R: 'static,
{
    pub fn send(traveler: T) -> Self {
        Self {
            traveler,
            stages: Vec::new(),
        }
    }

    /// Replace the stage list. Order is the order of execution, outermost first.
    pub fn through(mut self, stages: Vec<Stage<T, R>>) -> Self {
        self.stages = stages;
        self
    }

    /// Resolve every [`Stage::Named`] entry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnresolvedStage`] for the first name the
    /// resolver does not know.
    pub fn resolve(mut self, resolver: &dyn StageResolver<T, R>) -> Result<Self, PipelineError> {
        let mut resolved = Vec::with_capacity(self.stages.len());
        for stage in self.stages {
            match stage {
                Stage::Named(name) => {
                    let f = resolver
                        .resolve(&name)
                        .ok_or(PipelineError::UnresolvedStage(name))?;
                    resolved.push(Stage::Resolved(f));
                }
                stage => resolved.push(stage),
            }
        }
        self.stages = resolved;
        Ok(self)
    }

    /// Build the chain around `destination` and run it.
    ///
    /// Named stages still present at this point are skipped.
    pub fn then<D>(self, destination: D) -> R
    where
        D: FnOnce(T) -> R + Send + 'static,
    {
        let stages = if self.stages.is_empty() {
            vec![pass_through()]
        } else {
            self.stages
        };

        let mut chain: Continuation<T, R> = Box::new(destination);
        for stage in stages.into_iter().rev() {
            match stage {
                Stage::Resolved(interceptor) => {
                    let inner = chain;
                    chain = Box::new(move |traveler| interceptor(traveler, inner));
                }
                Stage::Named(name) => {
                    warn!(stage = %name, "skipping unresolved pipeline stage");
                }
            }
        }

        chain(self.traveler)
    }
}

fn pass_through<T, R>() -> Stage<T, R>
where
    T: 'static,
    R: 'static,
{
    Stage::from_fn(|traveler, next: Continuation<T, R>| next(traveler))
}
