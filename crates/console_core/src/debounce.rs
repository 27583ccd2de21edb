//! Trailing-edge debounce over a stream of values.

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Starts a debounce scope. Must be called from within a tokio runtime.
    pub fn spawn<V: Send + 'static>(&self) -> Debounced<V> {
        let (input, source) = mpsc::unbounded_channel();
        let (sink, output) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(self.window, source, sink));
        Debounced {
            input,
            output,
            task,
        }
    }
}

/// Handle to one debounce scope. Values pushed in come out once they have been
/// left alone for the whole window; dropping the handle ends the scope and
/// discards anything still waiting.
pub struct Debounced<V> {
    input: mpsc::UnboundedSender<V>,
    output: mpsc::UnboundedReceiver<V>,
    task: JoinHandle<()>,
}

impl<V> Debounced<V> {
    pub fn push(&self, value: V) {
        if self.input.send(value).is_err() {
            tracing::debug!("debounce scope already closed; dropping value");
        }
    }

    /// Waits for the next settled value. `None` once the scope is cancelled.
    pub async fn next(&mut self) -> Option<V> {
        self.output.recv().await
    }

    pub fn try_next(&mut self) -> Option<V> {
        self.output.try_recv().ok()
    }

    /// Ends the scope early; a pending value is never emitted.
    pub fn cancel(&mut self) {
        self.task.abort();
    }
}

impl<V> Drop for Debounced<V> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<V>(
    window: Duration,
    mut source: mpsc::UnboundedReceiver<V>,
    sink: mpsc::UnboundedSender<V>,
) {
    let mut pending: Option<V> = None;
    loop {
        let Some(value) = pending.take() else {
            match source.recv().await {
                Some(value) => {
                    pending = Some(value);
                    continue;
                }
                None => return,
            }
        };

        tokio::select! {
            next = source.recv() => match next {
                // Any change restarts the window, equal values included.
                Some(next) => pending = Some(next),
                None => return,
            },
            () = tokio::time::sleep(window) => {
                if sink.send(value).is_err() {
                    return;
                }
            }
        }
    }
}
