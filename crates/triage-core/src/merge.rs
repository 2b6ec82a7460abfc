//! First-ready-wins merge of a primary stream and a side queue.
//!
//! The primary stream is the model's own output. The side queue carries
//! events pushed by code running while the primary is being consumed
//! (tool notices, progress markers). Items from each source keep their
//! relative order; nothing is dropped. When the primary ends, the side
//! queue is closed and whatever it still buffers is drained before the
//! merged stream ends.

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

/// Producer handle for the side queue.
#[derive(Debug)]
pub struct SideChannel<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for SideChannel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> SideChannel<T> {
    /// Queue an item. Returns `false` if the queue has been closed, in
    /// which case the item is discarded.
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }

    /// True once the merged stream's primary has ended (or the merged
    /// stream was dropped). Further pushes are discarded.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the side queue, handed to [`merge_with_side_channel`].
#[derive(Debug)]
pub struct SideReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

/// Create a side queue.
pub fn side_channel<T>() -> (SideChannel<T>, SideReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SideChannel { tx }, SideReceiver { rx })
}

enum Next<T> {
    Primary(Option<T>),
    Side(T),
}

/// Merge `primary` with the side queue, yielding whichever is ready first.
pub fn merge_with_side_channel<S, T>(primary: S, side: SideReceiver<T>) -> impl Stream<Item = T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    async_stream::stream! {
        let mut primary = Box::pin(primary);
        let mut rx = side.rx;

        loop {
            // A closed-and-empty side queue disables its branch; the primary
            // branch always matches, so select! never runs out of arms.
            let next = tokio::select! {
                item = primary.next() => Next::Primary(item),
                Some(item) = rx.recv() => Next::Side(item),
            };
            match next {
                Next::Primary(Some(item)) => yield item,
                Next::Primary(None) => break,
                Next::Side(item) => yield item,
            }
        }

        rx.close();
        while let Some(item) = rx.recv().await {
            yield item;
        }
    }
}
