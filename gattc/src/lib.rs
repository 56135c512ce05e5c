use serde::{Deserialize, Serialize};
use std::fmt;

pub mod uuid;

pub mod client;

pub mod characteristic;

pub mod descriptor;

pub mod subscription;

pub mod fake;

// Attribute handles are the 16-bit indices into a peer's attribute table
// as reported by discovery. Handle 0x0000 is reserved by the ATT protocol
// and is what we use to mark a characteristic that was never discovered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeHandle(pub u16);

impl AttributeHandle {
    pub const INVALID: AttributeHandle = AttributeHandle(0x0000);

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}
impl Default for AttributeHandle {
    fn default() -> Self {
        Self::INVALID
    }
}
impl fmt::Debug for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AttributeHandle({:#06X})", self.0)
    }
}
impl fmt::Display for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

/// Identifies the link a characteristic was discovered over
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(pub u16);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Errors reported by the peer in an ATT Error Response
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum GattError {
    #[error("Invalid Handle")]
    InvalidHandle,

    #[error("Read Not Permitted")]
    ReadNotPermitted,

    #[error("Write Not Permitted")]
    WriteNotPermitted,

    #[error("Insufficient Authentication")]
    InsufficientAuthentication,

    #[error("Unsupported request")]
    Unsupported,

    #[error("Insufficient Authorization")]
    InsufficientAuthorization,

    #[error("Attribute Not Found")]
    AttributeNotFound,

    #[error("Invalid Attribute Value Length")]
    InvalidAttributeValueLength,

    #[error("Insufficient Encryption")]
    InsufficientEncryption,

    #[error("Insufficient Resources")]
    InsufficientResources,

    #[error("Client Characteristic Configuration Descriptor Improperly Configured")]
    CccdImproperlyConfigured,

    #[error("General Failure (ATT error {0:#04X})")]
    GeneralFailure(u8),
}

impl GattError {
    pub fn from_att_code(code: u8) -> Self {
        match code {
            0x01 => GattError::InvalidHandle,
            0x02 => GattError::ReadNotPermitted,
            0x03 => GattError::WriteNotPermitted,
            0x05 => GattError::InsufficientAuthentication,
            0x06 => GattError::Unsupported,
            0x08 => GattError::InsufficientAuthorization,
            0x0A => GattError::AttributeNotFound,
            0x0D => GattError::InvalidAttributeValueLength,
            0x0F => GattError::InsufficientEncryption,
            0x11 => GattError::InsufficientResources,
            0xFD => GattError::CccdImproperlyConfigured,
            other => GattError::GeneralFailure(other),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("The client or connection backing this request is not in a usable state")]
    InvalidState,

    #[error("Another GATT procedure is already in progress on this connection")]
    StackBusy,

    #[error("No buffer available to stage the request")]
    OutOfMemory,

    #[error("The characteristic's properties don't permit this operation")]
    OperationNotPermitted,

    #[error("Invalid parameter")]
    InvalidParam,

    #[error("The requested item could not be found")]
    ItemNotFound,

    #[error("There was a GATT communication protocol error")]
    Gatt(#[from] GattError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn att_error_codes() {
    assert_eq!(GattError::from_att_code(0x03), GattError::WriteNotPermitted);
    assert_eq!(GattError::from_att_code(0xFD), GattError::CccdImproperlyConfigured);
    assert_eq!(GattError::from_att_code(0x80), GattError::GeneralFailure(0x80));

    let err: Error = GattError::InsufficientEncryption.into();
    assert_eq!(err, Error::Gatt(GattError::InsufficientEncryption));
}

#[test]
fn attribute_handle_sentinel() {
    assert!(!AttributeHandle::default().is_valid());
    assert!(AttributeHandle(0x0001).is_valid());
    assert_eq!(format!("{:?}", AttributeHandle(0x2A)), "AttributeHandle(0x002A)");
    assert_eq!(AttributeHandle(0x2A).to_string(), "0x002A");
}
