use tokio::sync::watch;

/// Type alias to abstract a watch channel of `bool` that flips to `true` once signalled.
pub type SignalTx = watch::Sender<bool>;

/// Type alias to abstract the receiving side of a [`SignalTx`].
pub type SignalRx = watch::Receiver<bool>;

/// Creates a new pair of [`SignalTx`] and [`SignalRx`] in the unsignalled state.
pub fn create_signal() -> (SignalTx, SignalRx) {
    let (tx, rx) = watch::channel(false);
    (tx, rx)
}

/// Waits until any of `signals` is raised.
///
/// A signal whose sender was dropped without being raised never completes, and an empty list
/// waits forever.
pub async fn wait_for_any(signals: Vec<SignalRx>) {
    if signals.is_empty() {
        return std::future::pending().await;
    }

    let waits = signals.into_iter().map(|mut rx| {
        Box::pin(async move {
            if rx.wait_for(|raised| *raised).await.is_err() {
                std::future::pending::<()>().await;
            }
        })
    });

    futures::future::select_all(waits).await;
}
