use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{Duration, Instant};
use tokio_util::task::TaskTracker;

pub const COMPLETION_LINE: &str = "🔥 Stress test completed successfully!";

// The recipients and commands the workers choose from. Built once at startup and shared
// read-only between every worker, so cloning only bumps the reference counts.
#[derive(Debug, Clone)]
pub struct Catalog {
    recipients: Arc<[String]>,
    commands: Arc<[String]>,
}

impl Catalog {
    pub fn new(recipients: Vec<String>, commands: Vec<String>) -> anyhow::Result<Self> {
        if recipients.is_empty() {
            return Err(anyhow!("Recipient list must not be empty"));
        }
        if commands.is_empty() {
            return Err(anyhow!("Command list must not be empty"));
        }
        Ok(Self {
            recipients: recipients.into(),
            commands: commands.into(),
        })
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Dispatch<'_> {
        // Both lists are non-empty, checked in `new`.
        let recipient = &self.recipients[rng.gen_range(0..self.recipients.len())];
        let command = &self.commands[rng.gen_range(0..self.commands.len())];
        Dispatch { recipient, command }
    }
}

/// Bounds of the pause a worker takes after each dispatch. `min == max` gives a fixed pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> anyhow::Result<Self> {
        if min > max {
            return Err(anyhow!(
                "Minimum pause ({:?}) must not exceed maximum pause ({:?})",
                min,
                max
            ));
        }
        Ok(Self { min, max })
    }

    pub fn fixed(pause: Duration) -> Self {
        Self {
            min: pause,
            max: pause,
        }
    }

    pub fn pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        rng.gen_range(self.min..=self.max)
    }
}

/// A single simulated send. Nothing is delivered anywhere, the line is only printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch<'a> {
    pub recipient: &'a str,
    pub command: &'a str,
}

impl fmt::Display for Dispatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "📨 Sending to {}: {}", self.recipient, self.command)
    }
}

// Where the workers' output goes. Implementations are shared by every worker, and calls
// from different workers can interleave in any order.
pub trait Emitter: Send + Sync + 'static {
    fn dispatch(&self, dispatch: &Dispatch<'_>);
    fn complete(&self);
}

pub struct ConsoleEmitter;

impl Emitter for ConsoleEmitter {
    fn dispatch(&self, dispatch: &Dispatch<'_>) {
        println!("{}", dispatch);
    }

    fn complete(&self) {
        println!("{}", COMPLETION_LINE);
    }
}

pub struct LoadGenerator {
    catalog: Catalog,
    pacing: Pacing,
    workers: usize,
    duration: Duration,
    seed: Option<u64>,
}

impl LoadGenerator {
    pub fn new(catalog: Catalog, pacing: Pacing, workers: usize, duration: Duration) -> Self {
        Self {
            catalog,
            pacing,
            workers,
            duration,
            seed: None,
        }
    }

    // Worker `i` gets an rng seeded with `seed + i`, so a seeded run picks the same
    // recipients and commands every time.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Runs every worker until the deadline, waits for all of them to exit and then emits the
    /// completion line. Returns the number of dispatches across all workers.
    pub async fn run<E: Emitter>(&self, emitter: Arc<E>) -> anyhow::Result<usize> {
        let deadline = Instant::now()
            .checked_add(self.duration)
            .ok_or_else(|| anyhow!("Run duration {:?} is out of range", self.duration))?;
        tracing::info!(
            "Starting load generation [workers={}, duration={:?}, pause={:?}..={:?}]",
            self.workers,
            self.duration,
            self.pacing.min,
            self.pacing.max
        );

        // The tracker is the barrier: once closed, `wait` returns only after every spawned
        // worker has exited. The handles are kept to surface worker failures afterwards.
        let tracker = TaskTracker::new();
        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let worker = Worker {
                id,
                catalog: self.catalog.clone(),
                pacing: self.pacing,
                deadline,
                rng: self.rng_for(id),
            };
            handles.push(tracker.spawn(worker.run(emitter.clone())));
        }
        tracker.close();
        tracker.wait().await;

        let mut dispatched = 0;
        for handle in handles {
            dispatched += handle.await.context("Worker task failed")?;
        }
        tracing::info!("All workers finished [dispatched={}]", dispatched);

        emitter.complete();
        Ok(dispatched)
    }

    fn rng_for(&self, id: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        }
    }
}

struct Worker {
    id: usize,
    catalog: Catalog,
    pacing: Pacing,
    deadline: Instant,
    rng: StdRng,
}

impl Worker {
    async fn run<E: Emitter>(self, emitter: Arc<E>) -> usize {
        let Worker {
            id,
            catalog,
            pacing,
            deadline,
            mut rng,
        } = self;
        tracing::debug!("Worker {} started", id);

        let mut dispatched = 0;
        while Instant::now() < deadline {
            emitter.dispatch(&catalog.pick(&mut rng));
            dispatched += 1;
            tokio::time::sleep(pacing.pause(&mut rng)).await;
        }

        tracing::debug!("Worker {} exited [dispatched={}]", id, dispatched);
        dispatched
    }
}
