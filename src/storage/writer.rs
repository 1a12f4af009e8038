//! Background persistence for serialized engine state.
//!
//! [`StateWriter`] hands snapshots to a dedicated writer thread so that a slow
//! [`StoragePort`] never stalls the caller (or the async runtime the caller is
//! on). Writes for one key land in submission order; when several snapshots
//! for the same key are queued only the newest is written. Dropping the writer
//! drains the queue before returning.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::StoragePort;

enum Command {
    Write { key: &'static str, value: String },
    Flush(mpsc::Sender<()>),
}

pub struct StateWriter {
    storage: Arc<dyn StoragePort>,
    tx: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl StateWriter {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker_storage = Arc::clone(&storage);
        let spawned = std::thread::Builder::new()
            .name("vitalchat-writer".into())
            .spawn(move || run_worker(worker_storage, rx));

        match spawned {
            Ok(worker) => Self {
                storage,
                tx: Some(tx),
                worker: Some(worker),
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to start writer thread, persisting inline");
                Self {
                    storage,
                    tx: None,
                    worker: None,
                }
            }
        }
    }

    /// Queue `value` for `key`. Returns immediately; failures are logged by the writer.
    pub fn submit(&self, key: &'static str, value: String) {
        let unsent = match &self.tx {
            Some(tx) => match tx.send(Command::Write { key, value }) {
                Ok(()) => None,
                Err(mpsc::SendError(Command::Write { key, value })) => Some((key, value)),
                Err(_) => None,
            },
            None => Some((key, value)),
        };
        if let Some((key, value)) = unsent {
            write(self.storage.as_ref(), key, &value);
        }
    }

    /// Block until everything submitted so far has been written.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (done_tx, done_rx) = mpsc::channel();
        if tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for StateWriter {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish the queue and exit.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("writer thread panicked");
            }
        }
    }
}

fn run_worker(storage: Arc<dyn StoragePort>, rx: mpsc::Receiver<Command>) {
    while let Ok(first) = rx.recv() {
        let mut pending: HashMap<&'static str, String> = HashMap::new();
        let mut order: Vec<&'static str> = Vec::new();
        let mut waiters: Vec<mpsc::Sender<()>> = Vec::new();

        let mut queue_command = |command: Command| match command {
            Command::Write { key, value } => {
                if pending.insert(key, value).is_none() {
                    order.push(key);
                }
            }
            Command::Flush(done) => waiters.push(done),
        };
        queue_command(first);
        while let Ok(next) = rx.try_recv() {
            queue_command(next);
        }

        for key in order {
            if let Some(value) = pending.remove(key) {
                write(storage.as_ref(), key, &value);
            }
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
}

fn write(storage: &dyn StoragePort, key: &str, value: &str) {
    match storage.set(key, value) {
        Ok(()) => tracing::trace!(key, bytes = value.len(), "state persisted"),
        Err(e) => tracing::warn!(key, error = %e, "failed to persist state"),
    }
}
