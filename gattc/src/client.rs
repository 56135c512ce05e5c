use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::characteristic::{Characteristic, WriteType};
use crate::descriptor::DescriptorDiscovery;
use crate::{AttributeHandle, ConnectionHandle, Error, Result};

// The interface to whatever actually talks ATT to the peer.
//
// Every entry point only *initiates* a procedure: an `Err` means nothing was
// sent, while an `Ok` hands back something that will later resolve with the
// outcome reported by the peer (or the stack). Implementations are expected
// to allow only one outstanding client-initiated procedure per connection
// and to fail others with `Error::StackBusy`; nothing is queued.
//
// Note: the entry points take the full characteristic when scoping a
// descriptor discovery so the implementation doesn't need to track the
// relationship between handles itself.
pub trait GattClient: fmt::Debug + Send + Sync {
    fn read(&self, connection: ConnectionHandle, value_handle: AttributeHandle, offset: u16)
            -> Result<PendingRead>;

    fn write(&self, write_type: WriteType, connection: ConnectionHandle,
             attribute_handle: AttributeHandle, data: &[u8])
             -> Result<PendingWrite>;

    /// Starts enumerating the descriptors that live between the
    /// characteristic's value handle and its last handle.
    fn discover_characteristic_descriptors(&self, characteristic: &Characteristic)
                                           -> Result<DescriptorDiscovery>;

    /// Requests that an in-flight descriptor discovery stops early.
    ///
    /// It must be possible to call this while the initiator is still
    /// consuming events for that discovery. The discovery still ends with
    /// exactly one termination event, reporting
    /// [`DiscoveryStatus::TerminatedEarly`][early] unless it had already
    /// finished or failed.
    ///
    /// [early]: crate::descriptor::DiscoveryStatus::TerminatedEarly
    fn terminate_characteristic_descriptors_discovery(&self, characteristic: &Characteristic);
}

/// The eventual outcome of a GATT request that was successfully initiated.
///
/// If the client drops its [`Completer`] without reporting anything (e.g.
/// because the client itself was torn down) this resolves to
/// `Error::InvalidState`.
#[must_use = "the outcome of the request is only known by awaiting it"]
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

pub type PendingRead = Pending<Vec<u8>>;
pub type PendingWrite = Pending<()>;

impl<T> Pending<T> {
    /// A request whose outcome is already known
    pub fn ready(result: Result<T>) -> Self {
        let (completer, pending) = pending();
        completer.complete(result);
        pending
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::InvalidState)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T>>,
}

pub type ReadCompleter = Completer<Vec<u8>>;
pub type WriteCompleter = Completer<()>;

impl<T> Completer<T> {
    pub fn complete(self, result: Result<T>) {
        // The initiator isn't obliged to wait for the outcome
        let _ = self.tx.send(result);
    }
}

pub fn pending<T>() -> (Completer<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Pending { rx })
}

pub fn pending_read() -> (ReadCompleter, PendingRead) {
    pending()
}

pub fn pending_write() -> (WriteCompleter, PendingWrite) {
    pending()
}
