//! Ordered, delayed asynchronous steps.
//!
//! A [`Sequence`] runs each step after its delay, strictly one after the
//! other, and stops at the first failing step.
//!
//! ```rust
//! use std::time::Duration;
//! use rota::sequence::Sequence;
//!
//! # async fn demo() -> Result<(), rota::Failure> {
//! Sequence::new()
//!     .then_after(Duration::from_secs(1), || async { println!("red"); Ok(()) })
//!     .then_after(Duration::from_secs(1), || async { println!("orange"); Ok(()) })
//!     .then_after(Duration::from_secs(1), || async { println!("yellow"); Ok(()) })
//!     .run()
//!     .await
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::failure::Failure;
use crate::handler::BoxFuture;

type Step = Box<dyn FnOnce() -> BoxFuture<Result<(), Failure>> + Send>;

#[derive(Default)]
pub struct Sequence {
    steps: Vec<(Duration, Step)>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `step`, started `delay` after the previous step completes.
    pub fn then_after<F, Fut>(mut self, delay: Duration, step: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let step: Step = Box::new(move || -> BoxFuture<Result<(), Failure>> { Box::pin(step()) });
        self.steps.push((delay, step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order. Returns the first failure; later steps
    /// never start.
    pub async fn run(self) -> Result<(), Failure> {
        let total = self.steps.len();
        for (index, (delay, step)) in self.steps.into_iter().enumerate() {
            tokio::time::sleep(delay).await;
            if let Err(failure) = step().await {
                debug!(step = index, total, "sequence stopped: {failure}");
                return Err(failure);
            }
        }
        Ok(())
    }
}
