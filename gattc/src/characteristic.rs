use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, trace};
use uuid::Uuid;

use crate::client::{GattClient, PendingRead, PendingWrite};
use crate::descriptor::DescriptorDiscovery;
use crate::subscription::{SubscriptionFlags, SubscriptionOperation, SubscriptionResult};
use crate::uuid::{uuid_from_long_bytes, uuid_from_u16, LongUuidBytes};
use crate::{AttributeHandle, ConnectionHandle, Error, Result};

bitflags! {
    /// The properties declared for a characteristic, as found in its
    /// declaration attribute.
    ///
    /// The extended properties bit isn't represented here; it only says
    /// that there's an extended properties descriptor to look at.
    #[derive(Default)]
    pub struct CharacteristicProperties: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
    }
}

impl CharacteristicProperties {
    pub fn from_declaration(properties: u8) -> Self {
        Self::from_bits_truncate(properties)
    }

    pub fn broadcast(&self) -> bool {
        self.contains(Self::BROADCAST)
    }
    pub fn read(&self) -> bool {
        self.contains(Self::READ)
    }
    pub fn write_without_response(&self) -> bool {
        self.contains(Self::WRITE_WITHOUT_RESPONSE)
    }
    pub fn write(&self) -> bool {
        self.contains(Self::WRITE)
    }
    pub fn notify(&self) -> bool {
        self.contains(Self::NOTIFY)
    }
    pub fn indicate(&self) -> bool {
        self.contains(Self::INDICATE)
    }
    pub fn authenticated_signed_writes(&self) -> bool {
        self.contains(Self::AUTHENTICATED_SIGNED_WRITES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriteType {
    /// ATT Write Request, acknowledged by the peer
    WithResponse,

    /// ATT Write Command, completes once sent
    WithoutResponse,
}

// A characteristic as found by attribute discovery on a connected peer.
//
// This is a plain value: it can be cloned and compared freely and the
// discovery procedure that produced it is the only thing expected to
// adjust it afterwards (tightening `last_handle` once the next declaration
// is known).
//
// NB: we don't use the Uuid as a unique key for a characteristic since
// it's possible for devices to expose the same characteristic multiple
// times, differentiated by attribute handle.
#[derive(Clone)]
pub struct Characteristic {
    pub(crate) client: Option<Arc<dyn GattClient>>,
    pub(crate) uuid: Uuid,
    pub(crate) properties: CharacteristicProperties,
    pub(crate) decl_handle: AttributeHandle,
    pub(crate) value_handle: AttributeHandle,
    pub(crate) last_handle: AttributeHandle,
    pub(crate) connection: ConnectionHandle,
}

impl Default for Characteristic {
    /// The "invalid" characteristic: no client and no valid handles
    fn default() -> Self {
        Self {
            client: None,
            uuid: uuid_from_u16(0),
            properties: CharacteristicProperties::empty(),
            decl_handle: AttributeHandle::INVALID,
            value_handle: AttributeHandle::INVALID,
            last_handle: AttributeHandle::INVALID,
            connection: ConnectionHandle::default(),
        }
    }
}

impl PartialEq for Characteristic {
    fn eq(&self, other: &Characteristic) -> bool {
        let same_client = match (&self.client, &other.client) {
            (Some(a), Some(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (None, None) => true,
            _ => false,
        };
        same_client
            && self.uuid == other.uuid
            && self.properties == other.properties
            && self.decl_handle == other.decl_handle
            && self.value_handle == other.value_handle
            && self.last_handle == other.last_handle
            && self.connection == other.connection
    }
}
impl Eq for Characteristic {}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid.to_string())
            .field("properties", &self.properties)
            .field("decl_handle", &self.decl_handle)
            .field("value_handle", &self.value_handle)
            .field("last_handle", &self.last_handle)
            .field("connection", &self.connection)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

impl Characteristic {
    /// Declares a discovered characteristic.
    ///
    /// Fails with `InvalidParam` unless all handles are valid and ordered as
    /// `decl_handle <= value_handle <= last_handle`.
    pub fn new(client: Arc<dyn GattClient>, connection: ConnectionHandle, uuid: Uuid,
               properties: CharacteristicProperties, decl_handle: AttributeHandle,
               value_handle: AttributeHandle, last_handle: AttributeHandle)
               -> Result<Self> {
        if !decl_handle.is_valid() || decl_handle > value_handle || value_handle > last_handle {
            debug!("Rejecting characteristic {} with handles {}/{}/{}",
                   uuid, decl_handle, value_handle, last_handle);
            return Err(Error::InvalidParam);
        }

        Ok(Self {
            client: Some(client),
            uuid,
            properties,
            decl_handle,
            value_handle,
            last_handle,
            connection,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn set_long_uuid(&mut self, uuid: LongUuidBytes) {
        self.uuid = uuid_from_long_bytes(uuid);
    }

    pub fn properties(&self) -> CharacteristicProperties {
        self.properties
    }

    pub fn decl_handle(&self) -> AttributeHandle {
        self.decl_handle
    }

    pub fn value_handle(&self) -> AttributeHandle {
        self.value_handle
    }

    pub fn last_handle(&self) -> AttributeHandle {
        self.last_handle
    }

    /// Tightens the end of the characteristic's handle range, e.g. once the
    /// declaration of the following characteristic has been discovered.
    pub fn set_last_handle(&mut self, last_handle: AttributeHandle) -> Result<()> {
        // The sentinel's handles stay all-invalid
        if !self.decl_handle.is_valid() || last_handle < self.value_handle {
            return Err(Error::InvalidParam);
        }
        self.last_handle = last_handle;
        Ok(())
    }

    pub fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    pub fn client(&self) -> Option<&Arc<dyn GattClient>> {
        self.client.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.client.is_some() && self.decl_handle.is_valid()
    }

    fn client_api(&self) -> Result<&dyn GattClient> {
        match &self.client {
            Some(client) => Ok(client.as_ref()),
            None => Err(Error::InvalidState),
        }
    }

    /// Initiates a read of the characteristic value, starting at `offset`.
    ///
    /// Values longer than ATT_MTU - 1 need multiple reads with increasing
    /// offsets.
    pub fn read(&self, offset: u16) -> Result<PendingRead> {
        if !self.properties.read() {
            return Err(Error::OperationNotPermitted);
        }
        self.client_api()?.read(self.connection, self.value_handle, offset)
    }

    /// Initiates an acknowledged write of the characteristic value.
    pub fn write(&self, value: &[u8]) -> Result<PendingWrite> {
        if !self.properties.write() {
            return Err(Error::OperationNotPermitted);
        }
        self.client_api()?.write(WriteType::WithResponse, self.connection, self.value_handle, value)
    }

    /// Initiates a write of the characteristic value without response.
    ///
    /// The returned `PendingWrite` resolves once the command has been sent.
    /// The stack will limit how many of these can be outstanding so this
    /// can be used for flow control.
    pub fn write_without_response(&self, value: &[u8]) -> Result<PendingWrite> {
        if !self.properties.write_without_response() {
            return Err(Error::OperationNotPermitted);
        }
        self.client_api()?.write(WriteType::WithoutResponse,
                                 self.connection,
                                 self.value_handle,
                                 value)
    }

    /// Initiates discovery of the descriptors within this characteristic.
    pub fn discover_descriptors(&self) -> Result<DescriptorDiscovery> {
        trace!("discover_descriptors()");
        self.client_api()?.discover_characteristic_descriptors(self)
    }

    pub(crate) fn write_descriptor(&self, descriptor_handle: AttributeHandle, value: &[u8])
                                   -> Result<PendingWrite> {
        self.client_api()?.write(WriteType::WithResponse, self.connection, descriptor_handle, value)
    }

    pub(crate) fn terminate_descriptor_discovery(&self) {
        if let Some(client) = &self.client {
            client.terminate_characteristic_descriptors_discovery(self);
        }
    }

    /// Enables or disables notifications and/or indications of this
    /// characteristic's value.
    ///
    /// This finds the characteristic's Client Characteristic Configuration
    /// Descriptor and then writes the given flags to it. An `Err` means
    /// nothing was started and `on_complete` will never be called. An `Ok`
    /// means `on_complete` will be called exactly once with the outcome.
    ///
    /// The requested flags must be supported by the characteristic's
    /// properties, otherwise this fails with `InvalidParam`.
    pub fn set_subscription_flags<F>(&self, flags: SubscriptionFlags, on_complete: F) -> Result<()>
        where F: FnOnce(SubscriptionResult) + Send + 'static
    {
        trace!("set_subscription_flags({:?})", flags);

        if !self.properties.notify() && !self.properties.indicate() {
            return Err(Error::InvalidParam);
        }

        if (flags.notify() && !self.properties.notify())
           || (flags.indicate() && !self.properties.indicate())
        {
            return Err(Error::InvalidParam);
        }

        SubscriptionOperation::launch(self, flags, Box::new(on_complete))
    }

    /// Subscribes to value notifications, or to indications if the
    /// characteristic doesn't support notifications.
    pub fn subscribe<F>(&self, on_complete: F) -> Result<()>
        where F: FnOnce(SubscriptionResult) + Send + 'static
    {
        let flags = if self.properties.notify() {
            SubscriptionFlags::NOTIFY
        } else {
            SubscriptionFlags::INDICATE
        };
        self.set_subscription_flags(flags, on_complete)
    }

    pub fn unsubscribe<F>(&self, on_complete: F) -> Result<()>
        where F: FnOnce(SubscriptionResult) + Send + 'static
    {
        self.set_subscription_flags(SubscriptionFlags::NONE, on_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::client::{FakeClientConfig, FakeGattClient, Request};

    const CONN: ConnectionHandle = ConnectionHandle(7);

    fn characteristic(client: &Arc<FakeGattClient>, properties: CharacteristicProperties)
                      -> Characteristic {
        Characteristic::new(client.clone(),
                            CONN,
                            uuid_from_u16(0x2A19),
                            properties,
                            AttributeHandle(0x0020),
                            AttributeHandle(0x0021),
                            AttributeHandle(0x0023)).unwrap()
    }

    #[test]
    fn properties_from_declaration() {
        // 0x80 (extended properties) is dropped
        let properties = CharacteristicProperties::from_declaration(0x9A);
        assert!(properties.read());
        assert!(properties.write());
        assert!(properties.notify());
        assert!(!properties.indicate());
        assert!(!properties.broadcast());
        assert!(!properties.write_without_response());
        assert!(!properties.authenticated_signed_writes());
        assert_eq!(properties,
                   CharacteristicProperties::READ
                   | CharacteristicProperties::WRITE
                   | CharacteristicProperties::NOTIFY);
    }

    #[test]
    fn handles_must_be_ordered() {
        let client = FakeClientConfig::new().build();
        let uuid = uuid_from_u16(0x2A19);
        let props = CharacteristicProperties::READ;

        let result = Characteristic::new(client.clone(), CONN, uuid, props,
                                         AttributeHandle(0x0021),
                                         AttributeHandle(0x0020),
                                         AttributeHandle(0x0023));
        assert_eq!(result.err(), Some(Error::InvalidParam));

        let result = Characteristic::new(client.clone(), CONN, uuid, props,
                                         AttributeHandle::INVALID,
                                         AttributeHandle(0x0020),
                                         AttributeHandle(0x0023));
        assert_eq!(result.err(), Some(Error::InvalidParam));

        let mut characteristic = characteristic(&client, props);
        assert_eq!(characteristic.set_last_handle(AttributeHandle(0x0020)),
                   Err(Error::InvalidParam));
        assert_eq!(characteristic.set_last_handle(AttributeHandle(0x0022)), Ok(()));
        assert_eq!(characteristic.last_handle(), AttributeHandle(0x0022));
    }

    #[test]
    fn long_uuid() {
        let client = FakeClientConfig::new().build();
        let mut characteristic = characteristic(&client, CharacteristicProperties::READ);
        characteristic.set_long_uuid([0x6e, 0x40, 0x00, 0x03, 0xb5, 0xa3, 0xf3, 0x93,
                                      0xe0, 0xa9, 0xe5, 0x0e, 0x24, 0xdc, 0xca, 0x9e]);
        assert_eq!(characteristic.uuid().to_string(), "6e400003-b5a3-f393-e0a9-e50e24dcca9e");
    }

    #[test]
    fn sentinel() {
        let sentinel = Characteristic::default();
        assert!(!sentinel.is_valid());
        assert!(sentinel.client().is_none());
        assert_eq!(sentinel.value_handle(), AttributeHandle::INVALID);
        assert_eq!(sentinel, Characteristic::default());
        assert_eq!(sentinel.discover_descriptors().err(), Some(Error::InvalidState));

        let mut sentinel = sentinel;
        assert_eq!(sentinel.set_last_handle(AttributeHandle(0x0030)), Err(Error::InvalidParam));
        assert_eq!(sentinel.last_handle(), AttributeHandle::INVALID);
    }

    #[test]
    fn equality_includes_client_identity() {
        let client_a = FakeClientConfig::new().build();
        let client_b = FakeClientConfig::new().build();
        let props = CharacteristicProperties::READ;

        assert_eq!(characteristic(&client_a, props), characteristic(&client_a, props));
        assert_ne!(characteristic(&client_a, props), characteristic(&client_b, props));
        assert_ne!(characteristic(&client_a, props),
                   characteristic(&client_a, CharacteristicProperties::WRITE));
    }

    #[test]
    fn access_gated_by_properties() {
        let client = FakeClientConfig::new().build();
        let characteristic = characteristic(&client,
                                            CharacteristicProperties::NOTIFY
                                            | CharacteristicProperties::BROADCAST);

        assert_eq!(characteristic.read(0).err(), Some(Error::OperationNotPermitted));
        assert_eq!(characteristic.write(&[1, 2]).err(), Some(Error::OperationNotPermitted));
        assert_eq!(characteristic.write_without_response(&[1]).err(),
                   Some(Error::OperationNotPermitted));

        assert!(client.requests().is_empty());
    }

    #[test]
    fn no_client_is_invalid_state() {
        let client = FakeClientConfig::new().build();
        let detached = Characteristic {
            client: None,
            ..characteristic(&client, CharacteristicProperties::all())
        };
        assert!(!detached.is_valid());

        assert_eq!(detached.read(0).err(), Some(Error::InvalidState));
        assert_eq!(detached.write(&[1]).err(), Some(Error::InvalidState));
        assert_eq!(detached.write_without_response(&[1]).err(), Some(Error::InvalidState));
        assert_eq!(detached.discover_descriptors().err(), Some(Error::InvalidState));
        assert_eq!(detached.set_subscription_flags(SubscriptionFlags::NOTIFY, |_| {
                               panic!("unexpected completion");
                           }).err(),
                   Some(Error::InvalidState));

        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn read_and_write_are_delegated() {
        let mut config = FakeClientConfig::new();
        config.set_read_response(Some(Ok(vec![0x64])));
        let client = config.build();
        let characteristic = characteristic(&client,
                                            CharacteristicProperties::READ
                                            | CharacteristicProperties::WRITE
                                            | CharacteristicProperties::WRITE_WITHOUT_RESPONSE);

        let value = characteristic.read(4).unwrap().await;
        assert_eq!(value, Ok(vec![0x64]));
        characteristic.write(&[0xAA, 0xBB]).unwrap().await.unwrap();
        characteristic.write_without_response(&[0xCC]).unwrap().await.unwrap();

        assert_eq!(client.requests(),
                   vec![Request::Read { connection: CONN,
                                        handle: AttributeHandle(0x0021),
                                        offset: 4 },
                        Request::Write { write_type: WriteType::WithResponse,
                                         connection: CONN,
                                         handle: AttributeHandle(0x0021),
                                         data: vec![0xAA, 0xBB] },
                        Request::Write { write_type: WriteType::WithoutResponse,
                                         connection: CONN,
                                         handle: AttributeHandle(0x0021),
                                         data: vec![0xCC] }]);
    }

    #[test]
    fn client_errors_pass_through() {
        let client = FakeClientConfig::new().build();
        let characteristic = characteristic(&client,
                                            CharacteristicProperties::READ
                                            | CharacteristicProperties::WRITE);

        client.fail_next_request(Error::StackBusy);
        assert_eq!(characteristic.read(0).err(), Some(Error::StackBusy));

        client.fail_next_request(Error::OutOfMemory);
        assert_eq!(characteristic.write(&[0]).err(), Some(Error::OutOfMemory));

        // Only the injected failures, no retries
        assert_eq!(client.requests().len(), 2);
    }
}
