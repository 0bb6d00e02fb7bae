//! Cancellable change subscriptions.

use super::StoreError;
use crate::record::GameRecord;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// One change notification: the document as it now stands (`None` when
/// absent), or a listener error.
pub type Snapshot = Result<Option<GameRecord>, StoreError>;

const BUFFER: usize = 16;

/// A live stream of snapshots for one game document.
///
/// Dropping the subscription, or calling [`Subscription::cancel`], stops the
/// store-side listener.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Snapshot>,
    listener: JoinHandle<()>,
}

impl Subscription {
    /// Spawns `listen` with the sending half of a fresh channel.
    pub fn spawn<F, Fut>(listen: F) -> Self
    where
        F: FnOnce(mpsc::Sender<Snapshot>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(BUFFER);
        let listener = tokio::spawn(listen(tx));
        Self { rx, listener }
    }

    /// Polls `fetch` every `interval`, emitting a snapshot whenever the
    /// document differs from the last one emitted. A failing fetch is
    /// reported once per outage, and recovery re-emits the document.
    #[instrument(skip(fetch))]
    pub fn polling<F, Fut>(interval: Duration, mut fetch: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Snapshot> + Send,
    {
        Self::spawn(move |tx| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Option<GameRecord>> = None;
            let mut failing = false;

            loop {
                ticker.tick().await;
                let sent = match fetch().await {
                    Ok(snapshot) => {
                        failing = false;
                        if last.as_ref() == Some(&snapshot) {
                            continue;
                        }
                        debug!(present = snapshot.is_some(), "Polled new snapshot");
                        last = Some(snapshot.clone());
                        tx.send(Ok(snapshot)).await
                    }
                    Err(e) if !failing => {
                        warn!(error = %e, "Poll failed");
                        failing = true;
                        // The first good fetch after an outage is always emitted.
                        last = None;
                        tx.send(Err(e)).await
                    }
                    Err(_) => continue,
                };
                if sent.is_err() {
                    info!("Subscriber gone; stopping poll");
                    break;
                }
            }
        })
    }

    /// Waits for the next snapshot. Returns `None` once the listener stops.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Stops listening and releases the store-side listener.
    #[instrument(skip(self))]
    pub fn cancel(self) {
        debug!("Subscription cancelled");
        drop(self);
    }
}

impl Stream for Subscription {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
