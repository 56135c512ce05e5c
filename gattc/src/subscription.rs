use futures::StreamExt;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::characteristic::Characteristic;
use crate::descriptor::{DescriptorDiscovery, DescriptorRef, DiscoveryEvent, DiscoveryStatus};
use crate::{AttributeHandle, Error, Result};

const CCCD_NOTIFY: u16 = 0x0001;
const CCCD_INDICATE: u16 = 0x0002;

/// Which kinds of server-initiated updates a client wants for a
/// characteristic, i.e. the value of its Client Characteristic Configuration
/// Descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionFlags {
    notify: bool,
    indicate: bool,
}

impl SubscriptionFlags {
    pub const NONE: SubscriptionFlags = SubscriptionFlags { notify: false, indicate: false };
    pub const NOTIFY: SubscriptionFlags = SubscriptionFlags { notify: true, indicate: false };
    pub const INDICATE: SubscriptionFlags = SubscriptionFlags { notify: false, indicate: true };

    pub const fn new(notify: bool, indicate: bool) -> Self {
        Self { notify, indicate }
    }

    /// Unacknowledged value updates
    pub fn notify(&self) -> bool {
        self.notify
    }

    /// Acknowledged value updates
    pub fn indicate(&self) -> bool {
        self.indicate
    }

    /// The CCCD value for these flags (little endian)
    pub fn serialize(&self) -> [u8; 2] {
        let mut value = 0u16;
        if self.notify {
            value |= CCCD_NOTIFY;
        }
        if self.indicate {
            value |= CCCD_INDICATE;
        }
        value.to_le_bytes()
    }

    /// Parses a CCCD value. Reserved bits are ignored.
    pub fn deserialize(value: &[u8]) -> Result<Self> {
        match value {
            [lo, hi] => {
                let value = u16::from_le_bytes([*lo, *hi]);
                Ok(Self {
                    notify: value & CCCD_NOTIFY != 0,
                    indicate: value & CCCD_INDICATE != 0,
                })
            }
            _ => Err(Error::InvalidParam),
        }
    }
}

/// The outcome of [`Characteristic::set_subscription_flags`]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionResult {
    pub characteristic: Characteristic,
    pub status: Result<()>,

    /// The flags that were requested (whether or not they were applied)
    pub flags: SubscriptionFlags,
}

pub type SubscriptionCallback = Box<dyn FnOnce(SubscriptionResult) + Send + 'static>;

#[derive(Debug)]
enum State {
    Discovering,
    // Waiting for the discovery to wind down before writing the CCCD
    CccdFound { handle: AttributeHandle },
}

// Finds a characteristic's CCCD and writes the requested flags to it.
//
// Once launched, the operation is owned by the task spawned to run it and
// nothing else can reference it. It's driven purely by the events of its
// descriptor discovery. The CCCD write is only issued after that discovery
// has terminated, since the client runs one procedure per connection at a
// time, and the callback is called exactly once after that.
pub(crate) struct SubscriptionOperation {
    characteristic: Characteristic,
    flags: SubscriptionFlags,
    callback: SubscriptionCallback,
    discovery: DescriptorDiscovery,
    state: State,
}

impl SubscriptionOperation {
    pub(crate) fn launch(characteristic: &Characteristic, flags: SubscriptionFlags,
                         callback: SubscriptionCallback)
                         -> Result<()> {
        if characteristic.client().is_none() {
            return Err(Error::InvalidState);
        }

        // Something has to own the operation until the discovery ends
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("Can't subscribe to characteristic {} outside of a tokio runtime",
                      characteristic.uuid());
                return Err(Error::InvalidState);
            }
        };

        // NB: if this fails, the callback is dropped without being called
        // since the caller gets to see the error directly
        let discovery = characteristic.discover_descriptors()?;

        debug!("Looking for CCCD of {} on {} (flags = {:?})",
               characteristic.uuid(), characteristic.connection(), flags);
        let operation = SubscriptionOperation {
            characteristic: characteristic.clone(),
            flags,
            callback,
            discovery,
            state: State::Discovering,
        };
        runtime.spawn(operation.run());

        Ok(())
    }

    async fn run(mut self) {
        let status = loop {
            match self.discovery.next().await {
                Some(DiscoveryEvent::Descriptor(descriptor)) => self.on_descriptor(descriptor),
                Some(DiscoveryEvent::Terminated(status)) => break Some(status),
                None => break None,
            }
        };
        self.on_discovery_terminated(status).await;
    }

    fn on_descriptor(&mut self, descriptor: DescriptorRef) {
        if !descriptor.is_cccd() {
            trace!("Ignoring descriptor {} @ {}", descriptor.uuid(), descriptor.handle());
            return;
        }

        if let State::CccdFound { handle } = self.state {
            // We've already asked for the discovery to stop
            warn!("Ignoring redundant CCCD @ {} for characteristic {} (using {})",
                  descriptor.handle(), self.characteristic.uuid(), handle);
            return;
        }

        let handle = descriptor.handle();
        debug!("Found CCCD @ {}, stopping descriptor discovery", handle);
        self.state = State::CccdFound { handle };
        self.characteristic.terminate_descriptor_discovery();
    }

    async fn on_discovery_terminated(self, status: Option<DiscoveryStatus>) {
        let SubscriptionOperation { characteristic, flags, callback, state, .. } = self;

        trace!("Descriptor discovery for {} terminated: {:?}, state = {:?}",
               characteristic.uuid(), status, state);
        let status = match status {
            None => {
                warn!("Descriptor discovery for {} ended without reporting a status",
                      characteristic.uuid());
                Err(Error::InvalidState)
            }
            // Even with a CCCD in hand, nothing gets written
            Some(DiscoveryStatus::Failed(error)) => Err(error),
            Some(DiscoveryStatus::Completed) | Some(DiscoveryStatus::TerminatedEarly) => {
                match state {
                    // Enumerating all the descriptors without error doesn't mean
                    // we've subscribed to anything
                    State::Discovering => Err(Error::ItemNotFound),
                    State::CccdFound { handle } => {
                        write_cccd(&characteristic, handle, flags).await
                    }
                }
            }
        };

        debug!("Subscription for {} complete: {:?}", characteristic.uuid(), status);
        callback(SubscriptionResult { characteristic, status, flags });
    }
}

async fn write_cccd(characteristic: &Characteristic, handle: AttributeHandle,
                    flags: SubscriptionFlags)
                    -> Result<()> {
    let value = flags.serialize();
    debug!("Writing {:02X?} to CCCD @ {}", value, handle);
    let status = characteristic.write_descriptor(handle, &value)?.await;
    trace!("CCCD write @ {} complete: {:?}", handle, status);
    status
}
