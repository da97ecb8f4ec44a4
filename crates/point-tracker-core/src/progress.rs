//! Progress reporting, cooperative cancellation and run scheduling for the
//! long-running pipelines (point propagation, growth computation).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

/// Events emitted by a long-running pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// One more item (frame or frame pair) is done.
    NextItem { index: usize },
    Finished,
    Aborted,
}

pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl ProgressSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

impl ProgressSink for Sender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        // The receiving side may have gone away; the run carries on regardless.
        let _ = self.send(event);
    }
}

/// Sink that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: ProgressEvent) {}
}

/// Shared cancellation flag, set by the initiating side and polled by the worker.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final state of a run. Partial results produced before an abort are kept.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome<T> {
    Completed(T),
    Aborted(T),
}

impl<T> RunOutcome<T> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunOutcome::Aborted(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            RunOutcome::Completed(v) | RunOutcome::Aborted(v) => v,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RunOutcome<U> {
        match self {
            RunOutcome::Completed(v) => RunOutcome::Completed(f(v)),
            RunOutcome::Aborted(v) => RunOutcome::Aborted(f(v)),
        }
    }
}

/// Wraps a sink and guarantees exactly one terminal event.
///
/// If the guard is dropped without [`Completion::finish`] having been called
/// (early return, error, panic or cancellation) it emits `Aborted`.
pub struct Completion<'a> {
    sink: &'a mut dyn ProgressSink,
    done: bool,
}

impl<'a> Completion<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, done: false }
    }

    pub fn next_item(&mut self, index: usize) {
        self.sink.emit(ProgressEvent::NextItem { index });
    }

    pub fn finish(mut self) {
        self.done = true;
        self.sink.emit(ProgressEvent::Finished);
    }

    pub fn abort(mut self) {
        self.done = true;
        self.sink.emit(ProgressEvent::Aborted);
    }
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.sink.emit(ProgressEvent::Aborted);
        }
    }
}

/// Where a pipeline runs. Both modes execute the same code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Inline,
    Background,
}

/// Handle on a job started with [`execute`].
pub enum Execution<T> {
    Done(T),
    Running(JoinHandle<T>),
}

impl<T> Execution<T> {
    /// Wait for the job. A panicking worker yields `None`.
    pub fn join(self) -> Option<T> {
        match self {
            Execution::Done(v) => Some(v),
            Execution::Running(handle) => handle.join().ok(),
        }
    }
}

/// Run `job` inline or on a dedicated worker thread.
pub fn execute<T, F>(mode: RunMode, job: F) -> Execution<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match mode {
        RunMode::Inline => Execution::Done(job()),
        RunMode::Background => Execution::Running(std::thread::spawn(job)),
    }
}
