use crate::{Error, View};
use futures::prelude::*;
use tokio::{sync::watch, task::JoinHandle};

/// Maintains the latest view of a single streaming query.
///
/// A background task folds the query's updates into a watch; any number of
/// callers may wait on it. The task is aborted when the materializer is
/// dropped.
#[derive(Debug)]
pub struct Materializer<T> {
    rx: watch::Receiver<Option<View<T>>>,
    task: JoinHandle<()>,
}

// === impl Materializer ===

impl<T> Materializer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawns a task that applies `updates`, each an index and the full value
    /// at that index. Failed updates are logged and skipped.
    pub fn spawn<S>(updates: S) -> Self
    where
        S: Stream<Item = anyhow::Result<(u64, T)>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut updates = Box::pin(updates);
            while let Some(update) = updates.next().await {
                match update {
                    Ok((index, value)) => {
                        tracing::trace!(index, "updated view");
                        tx.send_replace(Some(View { index, value }));
                    }
                    Err(error) => tracing::warn!(%error, "failed to update view"),
                }
            }
            tracing::debug!("view updates ended");
        });
        Self { rx, task }
    }

    /// Waits for a view newer than `min_index`. With a `min_index` of zero any
    /// available view is returned immediately.
    pub async fn fetch(&self, min_index: u64) -> Result<View<T>, Error> {
        let mut rx = self.rx.clone();
        let view = rx
            .wait_for(|view| match view {
                Some(view) => min_index == 0 || view.index > min_index,
                None => false,
            })
            .await
            .map_err(|_| Error::Closed { min_index })?;
        let view = (*view).clone();
        view.ok_or(Error::Closed { min_index })
    }

    /// The most recent view, if any update has been applied.
    pub fn latest(&self) -> Option<View<T>> {
        self.rx.borrow().clone()
    }
}

impl<T> Drop for Materializer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    fn materializer() -> (mpsc::Sender<anyhow::Result<(u64, &'static str)>>, Materializer<&'static str>) {
        let (tx, rx) = mpsc::channel(8);
        (tx, Materializer::spawn(ReceiverStream::new(rx)))
    }

    #[tokio::test]
    async fn waits_for_newer_index() {
        let (tx, m) = materializer();
        assert_eq!(m.latest(), None);

        let mut fetch = task::spawn(m.fetch(0));
        assert_pending!(fetch.poll());

        tx.send(Ok((3, "a"))).await.unwrap();
        tokio::task::yield_now().await;
        assert!(fetch.is_woken());
        assert_eq!(assert_ready_ok!(fetch.poll()), View { index: 3, value: "a" });
        drop(fetch);

        let mut fetch = task::spawn(m.fetch(3));
        assert_pending!(fetch.poll());

        // Failed updates leave the view unchanged.
        tx.send(Err(anyhow::anyhow!("stream reset"))).await.unwrap();
        tokio::task::yield_now().await;
        assert_pending!(fetch.poll());

        tx.send(Ok((4, "b"))).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(assert_ready_ok!(fetch.poll()), View { index: 4, value: "b" });
        assert_eq!(m.latest(), Some(View { index: 4, value: "b" }));
    }

    #[tokio::test]
    async fn closed_feed_fails_pending_fetches() {
        let (tx, m) = materializer();
        tx.send(Ok((1, "a"))).await.unwrap();
        drop(tx);

        // An available view is still served.
        assert_eq!(m.fetch(0).await.unwrap().value, "a");
        assert!(matches!(m.fetch(1).await, Err(Error::Closed { min_index: 1 })));
    }
}
