//! Running an [`Orm`] on a dedicated worker thread.
//!
//! Every operation submitted to an [`OrmWorker`] is queued and executed by
//! the single thread that owns the connection, so the connection is only
//! ever used by one thread at a time. Results come back through a
//! [`JobHandle`], which can be blocked on or awaited.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::task::{Context, Poll};
use std::thread;

use async_trait::async_trait;
use futures::channel::{mpsc as stream_channel, oneshot};
use futures::executor::block_on;
use log::{info, warn};

use crate::error::{OrmError, Result};
use crate::orm::Orm;
use crate::schema::TableSpec;
use crate::sqlite::{
    ConflictMode, CreateTableOptions, IndexDefinition, Query, ReadOperation, UpdateOperation,
};

type Job<T> = Box<dyn FnOnce(&Orm<T>) + Send + 'static>;

/// Entries streamed back from the worker.
pub type EntryStream<T> = stream_channel::UnboundedReceiver<Result<T>>;

/// Result of a submitted job.
pub struct JobHandle<R> {
    receiver: oneshot::Receiver<Result<R>>,
}

impl<R> JobHandle<R> {
    /// Block the calling thread until the job finishes.
    pub fn wait(self) -> Result<R> {
        block_on(self)
    }
}

impl<R> Future for JobHandle<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(OrmError::Worker(
                "worker dropped the job before it completed".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct OrmWorker<T> {
    name: String,
    sender: Option<mpsc::Sender<Job<T>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<T> OrmWorker<T>
where
    T: TableSpec + Send + 'static,
{
    /// Move `orm` onto a new thread named `thread_name`.
    pub fn spawn(orm: Orm<T>, thread_name: &str) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job<T>>();
        let name = thread_name.to_string();
        let table = orm.table_name().to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!("orm worker for {table} started");
                while let Ok(job) = receiver.recv() {
                    job(&orm);
                }
                info!("orm worker for {table} stopped");
            })
            .map_err(|e| OrmError::Worker(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `job` on the worker thread.
    pub fn submit<R, F>(&self, job: F) -> Result<JobHandle<R>>
    where
        R: Send + 'static,
        F: FnOnce(&Orm<T>) -> Result<R> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.dispatch(Box::new(move |orm: &Orm<T>| {
            if result_tx.send(job(orm)).is_err() {
                warn!("orm job finished after its caller went away");
            }
        }))?;
        Ok(JobHandle {
            receiver: result_rx,
        })
    }

    fn dispatch(&self, job: Job<T>) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| OrmError::Worker("worker is shut down".to_string()))?
            .send(job)
            .map_err(|_| OrmError::Worker("worker thread has exited".to_string()))
    }

    pub fn create_table(&self, options: CreateTableOptions) -> Result<()> {
        self.submit(move |orm| orm.create_table(&options))?.wait()
    }

    pub fn create_index(&self, index: IndexDefinition) -> Result<()> {
        self.submit(move |orm| orm.create_index(&index))?.wait()
    }

    pub fn insert_entry(&self, entry: T, conflict: ConflictMode) -> Result<usize> {
        self.submit(move |orm| orm.insert_entry(&entry, conflict))?.wait()
    }

    pub fn insert_entries(&self, entries: Vec<T>, conflict: ConflictMode) -> Result<usize> {
        self.submit(move |orm| orm.insert_entries(&entries, conflict))?
            .wait()
    }

    pub fn select_entries(&self, op: ReadOperation) -> Result<Vec<T>> {
        self.submit(move |orm| orm.select_all(&op))?.wait()
    }

    /// Stream matching entries as the worker reads them.
    ///
    /// The worker reads the whole result set without waiting on the
    /// consumer, so a stream held undrained never blocks later jobs. It
    /// stops reading once the stream is dropped. An error ends the stream
    /// after it is delivered.
    pub fn select_stream(&self, op: ReadOperation) -> Result<EntryStream<T>> {
        let (tx, rx) = stream_channel::unbounded();
        self.dispatch(Box::new(move |orm: &Orm<T>| {
            let mut cursor = match orm.select_entries(&op) {
                Ok(cursor) => cursor,
                Err(err) => {
                    let _ = tx.unbounded_send(Err(err));
                    return;
                }
            };
            let entries = match cursor.entries() {
                Ok(entries) => entries,
                Err(err) => {
                    let _ = tx.unbounded_send(Err(err));
                    return;
                }
            };
            for entry in entries {
                let failed = entry.is_err();
                if tx.unbounded_send(entry).is_err() || failed {
                    break;
                }
            }
        }))?;
        Ok(rx)
    }

    pub fn count_entries(&self, query: Query) -> Result<usize> {
        self.submit(move |orm| orm.count_entries(&query))?.wait()
    }

    pub fn update_entries(&self, op: UpdateOperation) -> Result<usize> {
        self.submit(move |orm| orm.update_entries(&op))?.wait()
    }

    pub fn delete_entries(&self, query: Query) -> Result<usize> {
        self.submit(move |orm| orm.delete_entries(&query))?.wait()
    }

    pub fn delete_entries_returning(&self, query: Query) -> Result<Vec<T>> {
        self.submit(move |orm| orm.delete_entries_returning(&query))?
            .wait()
    }

    /// Finish queued jobs, stop the thread and close the connection.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }
}

impl<T> OrmWorker<T> {
    fn stop(&mut self) -> Result<()> {
        drop(self.sender.take());
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| OrmError::Worker(format!("{} panicked", self.name))),
            None => Ok(()),
        }
    }
}

impl<T> Drop for OrmWorker<T> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("{err}");
        }
    }
}

/// Async access to a table; calls suspend only while awaiting the worker.
#[async_trait]
pub trait AsyncOrm<T: Send + 'static> {
    async fn create_table(&self, options: CreateTableOptions) -> Result<()>;

    async fn create_index(&self, index: IndexDefinition) -> Result<()>;

    async fn insert_entry(&self, entry: T, conflict: ConflictMode) -> Result<usize>;

    async fn insert_entries(&self, entries: Vec<T>, conflict: ConflictMode) -> Result<usize>;

    async fn select_entries(&self, op: ReadOperation) -> Result<Vec<T>>;

    async fn count_entries(&self, query: Query) -> Result<usize>;

    async fn update_entries(&self, op: UpdateOperation) -> Result<usize>;

    async fn delete_entries(&self, query: Query) -> Result<usize>;

    async fn delete_entries_returning(&self, query: Query) -> Result<Vec<T>>;
}

/// The async face of an [`OrmWorker`].
pub struct AsyncOrmWorker<T> {
    worker: OrmWorker<T>,
}

impl<T> AsyncOrmWorker<T>
where
    T: TableSpec + Send + 'static,
{
    pub fn spawn(orm: Orm<T>, thread_name: &str) -> Result<Self> {
        Ok(Self {
            worker: OrmWorker::spawn(orm, thread_name)?,
        })
    }

    /// The blocking worker underneath, e.g. for [`OrmWorker::select_stream`].
    pub fn worker(&self) -> &OrmWorker<T> {
        &self.worker
    }

    pub fn shutdown(self) -> Result<()> {
        self.worker.shutdown()
    }
}

#[async_trait]
impl<T> AsyncOrm<T> for AsyncOrmWorker<T>
where
    T: TableSpec + Send + 'static,
{
    async fn create_table(&self, options: CreateTableOptions) -> Result<()> {
        self.worker
            .submit(move |orm| orm.create_table(&options))?
            .await
    }

    async fn create_index(&self, index: IndexDefinition) -> Result<()> {
        self.worker.submit(move |orm| orm.create_index(&index))?.await
    }

    async fn insert_entry(&self, entry: T, conflict: ConflictMode) -> Result<usize> {
        self.worker
            .submit(move |orm| orm.insert_entry(&entry, conflict))?
            .await
    }

    async fn insert_entries(&self, entries: Vec<T>, conflict: ConflictMode) -> Result<usize> {
        self.worker
            .submit(move |orm| orm.insert_entries(&entries, conflict))?
            .await
    }

    async fn select_entries(&self, op: ReadOperation) -> Result<Vec<T>> {
        self.worker.submit(move |orm| orm.select_all(&op))?.await
    }

    async fn count_entries(&self, query: Query) -> Result<usize> {
        self.worker
            .submit(move |orm| orm.count_entries(&query))?
            .await
    }

    async fn update_entries(&self, op: UpdateOperation) -> Result<usize> {
        self.worker.submit(move |orm| orm.update_entries(&op))?.await
    }

    async fn delete_entries(&self, query: Query) -> Result<usize> {
        self.worker
            .submit(move |orm| orm.delete_entries(&query))?
            .await
    }

    async fn delete_entries_returning(&self, query: Query) -> Result<Vec<T>> {
        self.worker
            .submit(move |orm| orm.delete_entries_returning(&query))?
            .await
    }
}
