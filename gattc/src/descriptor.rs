use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use log::trace;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::uuid::CLIENT_CHARACTERISTIC_CONFIGURATION_UUID;
use crate::{AttributeHandle, Error};

/// A descriptor reported while discovering the descriptors of one
/// characteristic.
///
/// This is just the raw (uuid, handle) pair as found in the peer's
/// attribute table and is only used to recognise well known descriptors
/// like the CCCD.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorRef {
    uuid: Uuid,
    handle: AttributeHandle,
}

impl DescriptorRef {
    pub fn new(uuid: Uuid, handle: AttributeHandle) -> Self {
        Self { uuid, handle }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn handle(&self) -> AttributeHandle {
        self.handle
    }

    /// Is this a Client Characteristic Configuration Descriptor?
    pub fn is_cccd(&self) -> bool {
        self.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION_UUID
    }
}

/// How a descriptor discovery procedure ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryStatus {
    /// Every descriptor in the characteristic's handle range was enumerated
    Completed,

    /// Discovery was stopped early via
    /// [`terminate_characteristic_descriptors_discovery`][terminate]
    ///
    /// [terminate]: crate::client::GattClient::terminate_characteristic_descriptors_discovery
    TerminatedEarly,

    /// The procedure failed, e.g. the peer disconnected or replied with an
    /// ATT error other than "Attribute Not Found"
    Failed(Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Descriptor(DescriptorRef),

    /// Always the last event of a discovery
    Terminated(DiscoveryStatus),
}

/// The stream of events for one in-flight descriptor discovery.
///
/// Yields any number of [`DiscoveryEvent::Descriptor`] events followed by
/// exactly one [`DiscoveryEvent::Terminated`]. If the client drops its
/// [`DiscoverySender`] without terminating then the stream simply ends.
#[derive(Debug)]
pub struct DescriptorDiscovery {
    events: UnboundedReceiverStream<DiscoveryEvent>,
}

impl Stream for DescriptorDiscovery {
    type Item = DiscoveryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

/// The client end of a [`DescriptorDiscovery`].
///
/// Terminating consumes the sender so a client can't report the end of a
/// discovery more than once.
#[derive(Debug)]
pub struct DiscoverySender {
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl DiscoverySender {
    /// Reports a discovered descriptor. Returns `false` if nobody is
    /// listening for this discovery any more.
    pub fn descriptor(&self, descriptor: DescriptorRef) -> bool {
        trace!("Descriptor discovered: {:?}", descriptor);
        self.tx.send(DiscoveryEvent::Descriptor(descriptor)).is_ok()
    }

    pub fn terminate(self, status: DiscoveryStatus) {
        trace!("Descriptor discovery terminated: {:?}", status);
        let _ = self.tx.send(DiscoveryEvent::Terminated(status));
    }
}

/// Creates the pair of objects a [`GattClient`][crate::client::GattClient]
/// uses to feed a descriptor discovery back to its initiator
pub fn descriptor_discovery() -> (DiscoverySender, DescriptorDiscovery) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DiscoverySender { tx },
     DescriptorDiscovery { events: UnboundedReceiverStream::new(rx) })
}
