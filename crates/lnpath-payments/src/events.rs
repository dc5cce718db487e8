//! Event streams and cancellation for long-running payment operations.

use std::sync::Arc;

use lnpath_routing::Route;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{PaymentError, ProbeError};
use crate::failure::FailureDetail;
use crate::prober::ProbeReport;
use crate::types::PaymentSuccess;

/// Events of a multi-route payment, in emission order.
#[derive(Debug)]
pub enum PaymentEvent {
    /// About to submit `route`.
    Paying { route: Route },
    /// A hop on `route` failed and the next route will be tried.
    RoutingFailure { route: Route, detail: FailureDetail },
    Success(Box<PaymentSuccess>),
    /// The payment failed; the full error is the task result.
    Error { class: u16, message: String },
    /// Always the last event.
    End,
}

/// Events of a probe, in emission order.
#[derive(Debug)]
pub enum ProbeEvent {
    /// About to try `route`.
    Probing { route: Route },
    /// A hop on `route` failed; its edge is now ignored.
    RoutingFailure { route: Route, detail: FailureDetail },
    /// `route` reaches the destination.
    Success(Box<ProbeReport>),
    /// The probe failed; the full error is the task result.
    Error { message: String },
    /// Always the last event.
    End,
}

/// Optional event destination. Dropped receivers are tolerated.
pub(crate) struct EventSink<E> {
    tx: Option<mpsc::Sender<E>>,
}

impl<E> EventSink<E> {
    pub(crate) fn none() -> Self {
        Self { tx: None }
    }

    pub(crate) fn channel(tx: mpsc::Sender<E>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) async fn emit(&self, event: E) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                tracing::debug!("event receiver dropped");
            }
        }
    }
}

/// Observes cancellation requests.
#[derive(Clone)]
pub(crate) struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    pub(crate) fn never() -> Self {
        Self { rx: None }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Requests cancellation of a running operation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub(crate) fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, CancelToken { rx: Some(rx) })
    }

    /// Stop before the next attempt. An attempt already in flight completes.
    pub fn cancel(&self) {
        // Nobody listening means the operation already finished.
        let _ = self.tx.send(true);
    }
}

/// A running operation: its event stream, a cancel handle and its result.
pub struct Subscription<E, T> {
    events: mpsc::Receiver<E>,
    cancel: CancelHandle,
    task: JoinHandle<T>,
}

pub type PaymentSubscription = Subscription<PaymentEvent, Result<PaymentSuccess, PaymentError>>;
pub type ProbeSubscription = Subscription<ProbeEvent, Result<ProbeReport, ProbeError>>;

impl<E, T> Subscription<E, T> {
    pub(crate) fn new(events: mpsc::Receiver<E>, cancel: CancelHandle, task: JoinHandle<T>) -> Self {
        Self {
            events,
            cancel,
            task,
        }
    }

    /// The next event, or `None` once the stream is closed.
    pub async fn next(&mut self) -> Option<E> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drain remaining events and wait for the result.
    pub async fn finish(mut self) -> (Vec<E>, Result<T, tokio::task::JoinError>) {
        let mut rest = Vec::new();
        while let Some(event) = self.events.recv().await {
            rest.push(event);
        }
        (rest, self.task.await)
    }
}
