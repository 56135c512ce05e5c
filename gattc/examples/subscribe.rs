use gattc::characteristic::{Characteristic, CharacteristicProperties};
use gattc::descriptor::{DescriptorRef, DiscoveryStatus};
use gattc::fake::client::FakeClientConfig;
use gattc::subscription::SubscriptionFlags;
use gattc::uuid::{uuid_from_u16, CHARACTERISTIC_USER_DESCRIPTION_UUID,
                  CLIENT_CHARACTERISTIC_CONFIGURATION_UUID};
use gattc::{AttributeHandle, ConnectionHandle};
use log::info;
use tokio::sync::oneshot;
use uuid::Uuid;

const HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0x2A37);
const BODY_SENSOR_LOCATION_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0x2A38);

const CONNECTION: ConnectionHandle = ConnectionHandle(0x0040);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::formatted_builder().filter_level(log::LevelFilter::Info) // Default Log Level
                                          .parse_default_env()
                                          .init();

    // Stand in for a connected heart rate monitor
    let mut config = FakeClientConfig::new();
    config.set_read_response(Some(Ok(vec![0x01]))); // "Chest"
    let client = config.build();

    let body_sensor_location = Characteristic::new(client.clone(),
                                                   CONNECTION,
                                                   BODY_SENSOR_LOCATION_CHARACTERISTIC_UUID,
                                                   CharacteristicProperties::from_declaration(0x02),
                                                   AttributeHandle(0x000E),
                                                   AttributeHandle(0x000F),
                                                   AttributeHandle(0x000F))?;
    let location = body_sensor_location.read(0)?.await?;
    info!("Body sensor location: {:02X?}", location);

    let heart_rate = Characteristic::new(client.clone(),
                                         CONNECTION,
                                         HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID,
                                         CharacteristicProperties::from_declaration(0x10),
                                         AttributeHandle(0x000A),
                                         AttributeHandle(0x000B),
                                         AttributeHandle(0x000D))?;

    let (tx, rx) = oneshot::channel();
    heart_rate.set_subscription_flags(SubscriptionFlags::NOTIFY, move |result| {
                  let _ = tx.send(result);
              })?;

    // Play the part of the peer's attribute table
    client.discover_descriptor(&heart_rate,
                               DescriptorRef::new(CHARACTERISTIC_USER_DESCRIPTION_UUID,
                                                  AttributeHandle(0x000C)));
    client.discover_descriptor(&heart_rate,
                               DescriptorRef::new(CLIENT_CHARACTERISTIC_CONFIGURATION_UUID,
                                                  AttributeHandle(0x000D)));
    client.finish_discovery(&heart_rate, DiscoveryStatus::Completed);

    let result = rx.await?;
    match result.status {
        Ok(()) => info!("Subscribed to {} with {:?}", result.characteristic.uuid(), result.flags),
        Err(err) => info!("Failed to subscribe: {}", err),
    }

    for request in client.requests() {
        println!("{:?}", request);
    }

    Ok(())
}
