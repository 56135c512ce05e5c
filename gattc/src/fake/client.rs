use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{trace, warn};

use crate::characteristic::{Characteristic, WriteType};
use crate::client::{pending_read, pending_write, GattClient, Pending, PendingRead, PendingWrite,
                    ReadCompleter, WriteCompleter};
use crate::descriptor::{descriptor_discovery, DescriptorDiscovery, DescriptorRef, DiscoverySender,
                        DiscoveryStatus};
use crate::{AttributeHandle, ConnectionHandle, Error, Result};

/// A request that reached the fake client, in the order they arrived
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Read {
        connection: ConnectionHandle,
        handle: AttributeHandle,
        offset: u16,
    },
    Write {
        write_type: WriteType,
        connection: ConnectionHandle,
        handle: AttributeHandle,
        data: Vec<u8>,
    },
    DiscoverDescriptors {
        connection: ConnectionHandle,
        characteristic: AttributeHandle,
    },
    TerminateDiscovery {
        connection: ConnectionHandle,
        characteristic: AttributeHandle,
    },
}

#[derive(Clone, Debug)]
pub struct FakeClientConfig {
    enforce_single_procedure: bool,
    write_response: Option<Result<()>>,
    read_response: Option<Result<Vec<u8>>>,
}

impl FakeClientConfig {
    pub fn new() -> Self {
        FakeClientConfig {
            enforce_single_procedure: true,
            write_response: Some(Ok(())),
            read_response: Some(Ok(vec![])),
        }
    }

    /// Fail requests with `StackBusy` while another read, acknowledged
    /// write or descriptor discovery is outstanding on the same connection,
    /// like a real stack would. On by default.
    pub fn set_enforce_single_procedure(&mut self, enforce: bool) -> &mut Self {
        self.enforce_single_procedure = enforce;
        self
    }

    /// How acknowledged writes complete. `None` leaves them pending until
    /// [`FakeGattClient::complete_write`] is called.
    pub fn set_write_response(&mut self, response: Option<Result<()>>) -> &mut Self {
        self.write_response = response;
        self
    }

    /// How reads complete. `None` leaves them pending until
    /// [`FakeGattClient::complete_read`] is called.
    pub fn set_read_response(&mut self, response: Option<Result<Vec<u8>>>) -> &mut Self {
        self.read_response = response;
        self
    }

    pub fn build(self) -> Arc<FakeGattClient> {
        Arc::new(FakeGattClient {
            config: self,
            requests: Mutex::new(vec![]),
            next_failure: Mutex::new(None),
            discoveries: DashMap::new(),
            pending_reads: DashMap::new(),
            pending_writes: DashMap::new(),
        })
    }
}

impl Default for FakeClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

// Discoveries are keyed by the characteristic's declaration handle,
// requests awaiting completion by the attribute they target
type Key = (ConnectionHandle, AttributeHandle);

#[derive(Debug)]
pub struct FakeGattClient {
    config: FakeClientConfig,
    requests: Mutex<Vec<Request>>,
    next_failure: Mutex<Option<Error>>,
    discoveries: DashMap<Key, DiscoverySender>,
    pending_reads: DashMap<Key, ReadCompleter>,
    pending_writes: DashMap<Key, WriteCompleter>,
}

impl FakeGattClient {
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Makes the next request that reaches the client fail with `error`
    pub fn fail_next_request(&self, error: Error) {
        *self.next_failure.lock().unwrap() = Some(error);
    }

    /// Reports a descriptor to an in-flight discovery for `characteristic`.
    ///
    /// Returns `false` if there's no such discovery.
    pub fn discover_descriptor(&self, characteristic: &Characteristic, descriptor: DescriptorRef)
                               -> bool {
        match self.discoveries.get(&discovery_key(characteristic)) {
            Some(sender) => sender.descriptor(descriptor),
            None => false,
        }
    }

    /// Ends an in-flight discovery with the given status
    pub fn finish_discovery(&self, characteristic: &Characteristic, status: DiscoveryStatus)
                            -> bool {
        match self.discoveries.remove(&discovery_key(characteristic)) {
            Some((_, sender)) => {
                sender.terminate(status);
                true
            }
            None => false,
        }
    }

    /// Forgets an in-flight discovery without ever terminating it
    pub fn abandon_discovery(&self, characteristic: &Characteristic) -> bool {
        self.discoveries.remove(&discovery_key(characteristic)).is_some()
    }

    pub fn complete_write(&self, connection: ConnectionHandle, handle: AttributeHandle,
                          result: Result<()>)
                          -> bool {
        match self.pending_writes.remove(&(connection, handle)) {
            Some((_, completer)) => {
                completer.complete(result);
                true
            }
            None => false,
        }
    }

    pub fn complete_read(&self, connection: ConnectionHandle, handle: AttributeHandle,
                         result: Result<Vec<u8>>)
                         -> bool {
        match self.pending_reads.remove(&(connection, handle)) {
            Some((_, completer)) => {
                completer.complete(result);
                true
            }
            None => false,
        }
    }

    // Every request is recorded, even the ones we then fail
    fn begin_request(&self, request: Request) -> Result<()> {
        trace!("Fake GATT request: {:?}", request);
        let connection = match &request {
            Request::Read { connection, .. } => *connection,
            Request::Write { connection, .. } => *connection,
            Request::DiscoverDescriptors { connection, .. } => *connection,
            Request::TerminateDiscovery { connection, .. } => *connection,
        };
        let needs_idle_connection = match &request {
            Request::Write { write_type, .. } => *write_type == WriteType::WithResponse,
            Request::TerminateDiscovery { .. } => false,
            _ => true,
        };
        self.requests.lock().unwrap().push(request);

        if let Some(error) = self.next_failure.lock().unwrap().take() {
            return Err(error);
        }

        if self.config.enforce_single_procedure
           && needs_idle_connection
           && self.is_busy(connection)
        {
            warn!("Fake GATT client busy on {}", connection);
            return Err(Error::StackBusy);
        }

        Ok(())
    }

    fn is_busy(&self, connection: ConnectionHandle) -> bool {
        self.discoveries.iter().any(|entry| entry.key().0 == connection)
            || self.pending_reads.iter().any(|entry| entry.key().0 == connection)
            || self.pending_writes.iter().any(|entry| entry.key().0 == connection)
    }
}

fn discovery_key(characteristic: &Characteristic) -> Key {
    (characteristic.connection(), characteristic.decl_handle())
}

impl GattClient for FakeGattClient {
    fn read(&self, connection: ConnectionHandle, value_handle: AttributeHandle, offset: u16)
            -> Result<PendingRead> {
        self.begin_request(Request::Read { connection, handle: value_handle, offset })?;

        match &self.config.read_response {
            Some(response) => Ok(Pending::ready(response.clone())),
            None => {
                let (completer, pending) = pending_read();
                self.pending_reads.insert((connection, value_handle), completer);
                Ok(pending)
            }
        }
    }

    fn write(&self, write_type: WriteType, connection: ConnectionHandle,
             attribute_handle: AttributeHandle, data: &[u8])
             -> Result<PendingWrite> {
        self.begin_request(Request::Write { write_type,
                                            connection,
                                            handle: attribute_handle,
                                            data: data.to_vec() })?;

        // Commands complete as soon as they are "sent"
        if write_type == WriteType::WithoutResponse {
            return Ok(Pending::ready(Ok(())));
        }

        match &self.config.write_response {
            Some(response) => Ok(Pending::ready(*response)),
            None => {
                let (completer, pending) = pending_write();
                self.pending_writes.insert((connection, attribute_handle), completer);
                Ok(pending)
            }
        }
    }

    fn discover_characteristic_descriptors(&self, characteristic: &Characteristic)
                                           -> Result<DescriptorDiscovery> {
        self.begin_request(Request::DiscoverDescriptors {
                                connection: characteristic.connection(),
                                characteristic: characteristic.decl_handle() })?;

        let (sender, discovery) = descriptor_discovery();
        self.discoveries.insert(discovery_key(characteristic), sender);
        Ok(discovery)
    }

    fn terminate_characteristic_descriptors_discovery(&self, characteristic: &Characteristic) {
        let _ = self.begin_request(Request::TerminateDiscovery {
                                       connection: characteristic.connection(),
                                       characteristic: characteristic.decl_handle() });

        if let Some((_, sender)) = self.discoveries.remove(&discovery_key(characteristic)) {
            sender.terminate(DiscoveryStatus::TerminatedEarly);
        }
    }
}
