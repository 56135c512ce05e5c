use uuid::Uuid;

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const BLUETOOTH_BASE_MASK_32: u128 = 0x00000000_ffff_ffff_ffff_ffffffffffff;
const BLUETOOTH_BASE_MASK_16: u128 = 0xffff0000_ffff_ffff_ffff_ffffffffffff;

pub const CHARACTERISTIC_EXTENDED_PROPERTIES_UUID: Uuid = uuid_from_u16(0x2900);
pub const CHARACTERISTIC_USER_DESCRIPTION_UUID: Uuid = uuid_from_u16(0x2901);
pub const CLIENT_CHARACTERISTIC_CONFIGURATION_UUID: Uuid = uuid_from_u16(0x2902);
pub const SERVER_CHARACTERISTIC_CONFIGURATION_UUID: Uuid = uuid_from_u16(0x2903);
pub const CHARACTERISTIC_PRESENTATION_FORMAT_UUID: Uuid = uuid_from_u16(0x2904);

/// A long UUID as 16 bytes, most significant byte first
pub type LongUuidBytes = [u8; 16];

pub trait BluetoothUuid {
    fn as_u16(&self) -> Option<u16>;
    fn as_u32(&self) -> Option<u32>;
    fn from_u16(v: u16) -> Uuid;
    fn from_u32(v: u32) -> Uuid;

    /// True if this UUID is an alias of the Bluetooth base UUID, i.e.
    /// it could be sent over the air in its 16-bit short form
    fn is_short(&self) -> bool {
        self.as_u16().is_some()
    }
}

impl BluetoothUuid for Uuid {
    fn as_u16(&self) -> Option<u16> {
        let value = self.as_u128();
        if value & BLUETOOTH_BASE_MASK_16 == BLUETOOTH_BASE_UUID {
            Some((value >> 96) as u16)
        } else {
            None
        }
    }

    fn as_u32(&self) -> Option<u32> {
        let value = self.as_u128();
        if value & BLUETOOTH_BASE_MASK_32 == BLUETOOTH_BASE_UUID {
            Some((value >> 96) as u32)
        } else {
            None
        }
    }

    fn from_u16(v: u16) -> Uuid {
        uuid_from_u16(v)
    }

    fn from_u32(v: u32) -> Uuid {
        uuid_from_u32(v)
    }
}

// It's useful to have const functions so apps can declare const Uuids but
// unfortunately we can't have const functions in traits yet

pub const fn uuid_from_u16(v: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((v as u128) << 96))
}
pub const fn uuid_from_u32(v: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((v as u128) << 96))
}
pub fn uuid_from_long_bytes(bytes: LongUuidBytes) -> Uuid {
    Uuid::from_bytes(bytes)
}

#[test]
fn short_form_aliases() {
    let cccd = CLIENT_CHARACTERISTIC_CONFIGURATION_UUID;
    assert_eq!(cccd.to_string(), "00002902-0000-1000-8000-00805f9b34fb");
    assert_eq!(cccd.as_u16(), Some(0x2902));
    assert_eq!(cccd.as_u32(), Some(0x2902));
    assert!(cccd.is_short());

    let wide = uuid_from_u32(0x1234_5678);
    assert_eq!(wide.as_u16(), None);
    assert_eq!(wide.as_u32(), Some(0x1234_5678));
}

#[test]
fn long_form() {
    let bytes: LongUuidBytes = [0x6e, 0x40, 0x00, 0x01, 0xb5, 0xa3, 0xf3, 0x93,
                                0xe0, 0xa9, 0xe5, 0x0e, 0x24, 0xdc, 0xca, 0x9e];
    let uuid = uuid_from_long_bytes(bytes);
    assert_eq!(uuid.to_string(), "6e400001-b5a3-f393-e0a9-e50e24dcca9e");
    assert!(!uuid.is_short());
}
