//! Background semantic index fed by message passing
//!
//! Graph writes enqueue `IndexTask`s; a single worker drains the queue in
//! batches, embeds on the blocking pool and writes to the vector store.
//! The index therefore trails the graph by the queue depth.

use super::{Embedder, IndexError, VectorStore};
use crate::graph::Endpoint;
use crate::storage::{GraphStore, NodeFilter};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

const BATCH_SIZE: usize = 32;

/// Work item for the index worker
#[derive(Debug)]
pub enum IndexTask {
    Upsert { key: Endpoint, text: String },
    Remove(Endpoint),
    /// Acknowledged once every task queued before it has been applied
    Flush(oneshot::Sender<()>),
}

struct Shared {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    /// Reason of the last failed write, cleared by the next success
    failure: RwLock<Option<String>>,
}

impl Shared {
    fn fail(&self, reason: String) {
        tracing::warn!(error = %reason, "semantic index write failed");
        if let Ok(mut failure) = self.failure.write() {
            *failure = Some(reason);
        }
    }

    fn recover(&self) {
        if let Ok(mut failure) = self.failure.write() {
            if failure.take().is_some() {
                tracing::info!("semantic index recovered");
            }
        }
    }

    fn failure(&self) -> Option<String> {
        match self.failure.read() {
            Ok(failure) => failure.clone(),
            Err(_) => Some("index state lock poisoned".into()),
        }
    }

    fn apply(&self, tasks: Vec<IndexTask>) {
        let mut pending: Vec<(Endpoint, String)> = Vec::new();
        for task in tasks {
            match task {
                IndexTask::Upsert { key, text } => pending.push((key, text)),
                IndexTask::Remove(key) => {
                    self.commit(std::mem::take(&mut pending));
                    if let Err(e) = self.vectors.remove(&key) {
                        self.fail(e.to_string());
                    }
                }
                IndexTask::Flush(ack) => {
                    self.commit(std::mem::take(&mut pending));
                    let _ = ack.send(());
                }
            }
        }
        self.commit(pending);
    }

    fn commit(&self, pending: Vec<(Endpoint, String)>) {
        if pending.is_empty() {
            return;
        }
        let texts: Vec<&str> = pending.iter().map(|(_, t)| t.as_str()).collect();
        let vectors = match self.embedder.embed_batch(&texts) {
            Ok(v) if v.len() == pending.len() => v,
            Ok(_) => return self.fail(IndexError::EmptyResult.to_string()),
            Err(e) => return self.fail(e.to_string()),
        };
        for ((key, _), vector) in pending.iter().zip(vectors) {
            if let Err(e) = self.vectors.upsert(key, vector) {
                return self.fail(e.to_string());
            }
        }
        tracing::debug!(count = pending.len(), "indexed entities");
        self.recover();
    }
}

/// Handle to the semantic index and its worker
#[derive(Clone)]
pub struct SemanticIndex {
    shared: Arc<Shared>,
    tx: mpsc::Sender<IndexTask>,
}

impl SemanticIndex {
    /// Start the worker on the current tokio runtime
    pub fn spawn(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let shared = Arc::new(Shared {
            embedder,
            vectors,
            failure: RwLock::new(None),
        });
        tokio::spawn(run(shared.clone(), rx));
        Self { shared, tx }
    }

    /// Queue a task, waiting for room if the queue is full
    pub async fn enqueue(&self, task: IndexTask) -> Result<(), IndexError> {
        self.tx
            .send(task)
            .await
            .map_err(|_| IndexError::Unavailable("index worker stopped".into()))
    }

    pub async fn upsert(&self, key: Endpoint, text: String) -> Result<(), IndexError> {
        self.enqueue(IndexTask::Upsert { key, text }).await
    }

    pub async fn remove(&self, key: Endpoint) -> Result<(), IndexError> {
        self.enqueue(IndexTask::Remove(key)).await
    }

    /// Wait until everything queued so far has been applied
    pub async fn flush(&self) -> Result<(), IndexError> {
        let (ack, done) = oneshot::channel();
        self.enqueue(IndexTask::Flush(ack)).await?;
        done.await
            .map_err(|_| IndexError::Unavailable("index worker dropped flush".into()))
    }

    /// False after a failed write or once the worker has stopped
    pub fn is_available(&self) -> bool {
        !self.tx.is_closed() && self.shared.failure().is_none()
    }

    /// Nearest entities to `text`. Blocking; call from a blocking context.
    pub fn search(&self, text: &str, k: usize) -> Result<Vec<(Endpoint, f32)>, IndexError> {
        if self.tx.is_closed() {
            return Err(IndexError::Unavailable("index worker stopped".into()));
        }
        if let Some(reason) = self.shared.failure() {
            return Err(IndexError::Unavailable(reason));
        }
        let query = self
            .shared
            .embedder
            .embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or(IndexError::EmptyResult)?;
        self.shared.vectors.search(&query, k)
    }

    /// Re-queue every node and insight. Returns how many were queued.
    pub async fn rebuild(&self, store: &dyn GraphStore) -> Result<usize, crate::error::GraphError> {
        let nodes = store.find_nodes(&NodeFilter::new())?;
        let insights = store.list_insights(None)?;
        let total = nodes.len() + insights.len();
        for node in nodes {
            self.upsert(Endpoint::Node(node.id), node.text_representation())
                .await?;
        }
        for insight in insights {
            self.upsert(Endpoint::Insight(insight.id), insight.text_representation())
                .await?;
        }
        tracing::info!(entities = total, "queued semantic index rebuild");
        Ok(total)
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.shared.vectors
    }
}

async fn run(shared: Arc<Shared>, mut rx: mpsc::Receiver<IndexTask>) {
    let mut buf = Vec::with_capacity(BATCH_SIZE);
    while rx.recv_many(&mut buf, BATCH_SIZE).await > 0 {
        let tasks = std::mem::take(&mut buf);
        let worker = shared.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || worker.apply(tasks)).await {
            shared.fail(format!("index batch panicked: {}", e));
        }
    }
    tracing::debug!("semantic index worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::index::{HashingEmbedder, InMemoryVectorStore};

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
            Err(IndexError::Embedding("model not loaded".into()))
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    fn index() -> SemanticIndex {
        SemanticIndex::spawn(
            Arc::new(HashingEmbedder::new(128)),
            Arc::new(InMemoryVectorStore::new()),
            4,
        )
    }

    #[tokio::test]
    async fn flush_makes_writes_visible() {
        let index = index();
        let fl = Endpoint::Node(NodeId::new());
        let bread = Endpoint::Node(NodeId::new());
        index.upsert(fl, "federated learning".into()).await.unwrap();
        index.upsert(bread, "sourdough bread".into()).await.unwrap();
        index.flush().await.unwrap();

        let hits = index.search("federated learning research", 5).unwrap();
        assert_eq!(hits[0].0, fl);
        assert!(index.is_available());
    }

    #[tokio::test]
    async fn removal_is_ordered_after_upsert() {
        let index = index();
        let key = Endpoint::Node(NodeId::new());
        index.upsert(key, "graph retrieval".into()).await.unwrap();
        index.remove(key).await.unwrap();
        index.flush().await.unwrap();
        assert!(index.search("graph retrieval", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn more_tasks_than_capacity_all_apply() {
        let index = index();
        for i in 0..50 {
            index
                .upsert(Endpoint::Node(NodeId::new()), format!("topic {}", i))
                .await
                .unwrap();
        }
        index.flush().await.unwrap();
        assert_eq!(index.vector_store().len().unwrap(), 50);
    }

    #[tokio::test]
    async fn failed_embedding_marks_index_unavailable() {
        let index = SemanticIndex::spawn(Arc::new(BrokenEmbedder), Arc::new(InMemoryVectorStore::new()), 4);
        index.upsert(Endpoint::Node(NodeId::new()), "x".into()).await.unwrap();
        index.flush().await.unwrap();

        assert!(!index.is_available());
        assert!(matches!(index.search("x", 3), Err(IndexError::Unavailable(_))));
    }
}
