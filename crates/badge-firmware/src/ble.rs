//! BLE peripheral: GATT table and the advertise / serve loop
//!
//! The GATT table only stores bytes for the host stack. Every read refreshes
//! the characteristic from [`AttributeService`] before the response goes out,
//! and every write is validated by it before the stack accepts the value.

use badge_core::config::ADVERTISING_WINDOW_SECS;
use badge_core::gatt::{AttError, AttributeId, AttributeService, GapAction, GapEvent};
use embassy_futures::select::{Either, select};
use embassy_time::{Instant, Timer};
use log::{debug, info, warn};
use trouble_host::prelude::*;

/// Max number of connections
pub const CONNECTIONS_MAX: usize = 1;
/// Signal + ATT channels, as required by GATT
pub const L2CAP_CHANNELS_MAX: usize = 2;

#[gatt_server]
pub struct Server {
    pub badge: BadgeService,
}

#[gatt_service(uuid = "deadbeef-1000-2000-3000-aabbccddeeff")]
pub struct BadgeService {
    #[characteristic(uuid = "deadbeef-1001-2000-3000-aabbccddeeff", read, write)]
    pub scratch: heapless::Vec<u8, 64>,
    #[characteristic(uuid = "deadbeef-1002-2000-3000-aabbccddeeff", read)]
    pub pressure: f32,
    #[characteristic(uuid = "deadbeef-1003-2000-3000-aabbccddeeff", read)]
    pub temperature: f32,
    #[characteristic(uuid = "deadbeef-1004-2000-3000-aabbccddeeff", read)]
    pub humidity: f32,
    #[characteristic(uuid = "deadbeef-1005-2000-3000-aabbccddeeff", read, write)]
    pub time: i64,
    #[characteristic(uuid = "deadbeef-1006-2000-3000-aabbccddeeff", read, write)]
    pub timezone: i8,
    #[characteristic(uuid = "deadbeef-1007-2000-3000-aabbccddeeff", read)]
    pub battery: u32,
    #[characteristic(uuid = "deadbeef-1008-2000-3000-aabbccddeeff", read, write)]
    pub display_mode: u8,
}

impl Server<'_> {
    /// Map a GATT handle to the badge attribute it carries
    fn attribute_id(&self, handle: u16) -> Option<AttributeId> {
        let badge = &self.badge;
        [
            (badge.scratch.handle, AttributeId::SCRATCH),
            (badge.pressure.handle, AttributeId::PRESSURE),
            (badge.temperature.handle, AttributeId::TEMPERATURE),
            (badge.humidity.handle, AttributeId::HUMIDITY),
            (badge.time.handle, AttributeId::TIME),
            (badge.timezone.handle, AttributeId::TIMEZONE),
            (badge.battery.handle, AttributeId::BATTERY),
            (badge.display_mode.handle, AttributeId::DISPLAY_MODE),
        ]
        .into_iter()
        .find_map(|(h, id)| (h == handle).then_some(id))
    }

    /// Copy the current value of `id` into the GATT table
    fn refresh(&self, service: &AttributeService<'_>, id: AttributeId) -> Result<(), AttError> {
        let mut buf = [0u8; 64];
        let len = service.read(id, Instant::now(), &mut buf)?;
        let bytes = &buf[..len];
        let badge = &self.badge;
        let stored = match id {
            AttributeId::SCRATCH => {
                let value = heapless::Vec::from_slice(bytes)
                    .map_err(|_| AttError::InsufficientResources)?;
                self.set(&badge.scratch, &value)
            }
            AttributeId::PRESSURE => self.set(&badge.pressure, &f32_le(bytes)?),
            AttributeId::TEMPERATURE => self.set(&badge.temperature, &f32_le(bytes)?),
            AttributeId::HUMIDITY => self.set(&badge.humidity, &f32_le(bytes)?),
            AttributeId::TIME => self.set(&badge.time, &i64::from_le_bytes(fixed(bytes)?)),
            AttributeId::TIMEZONE => self.set(&badge.timezone, &i8::from_le_bytes(fixed(bytes)?)),
            AttributeId::BATTERY => self.set(&badge.battery, &u32::from_le_bytes(fixed(bytes)?)),
            AttributeId::DISPLAY_MODE => self.set(&badge.display_mode, &bytes[0]),
            _ => return Err(AttError::AttributeNotFound),
        };
        stored.map_err(stack_error)
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], AttError> {
    bytes.try_into().map_err(|_| AttError::InsufficientResources)
}

fn f32_le(bytes: &[u8]) -> Result<f32, AttError> {
    Ok(f32::from_le_bytes(fixed(bytes)?))
}

fn stack_error<E: core::fmt::Debug>(e: E) -> AttError {
    warn!("GATT table update failed: {:?}", e);
    AttError::InsufficientResources
}

fn att_error_code(e: AttError) -> AttErrorCode {
    match e {
        AttError::InvalidLength => AttErrorCode::INVALID_ATTRIBUTE_VALUE_LENGTH,
        AttError::InsufficientResources => AttErrorCode::INSUFFICIENT_RESOURCES,
        AttError::ReadNotPermitted => AttErrorCode::READ_NOT_PERMITTED,
        AttError::WriteNotPermitted => AttErrorCode::WRITE_NOT_PERMITTED,
        AttError::AttributeNotFound => AttErrorCode::ATTRIBUTE_NOT_FOUND,
        AttError::InvalidValue => AttErrorCode::VALUE_NOT_ALLOWED,
    }
}

/// Advertise until a central connects or the window elapses
async fn advertise<'values, 'server, C: Controller>(
    name: &'values str,
    peripheral: &mut Peripheral<'values, C, DefaultPacketPool>,
    server: &'server Server<'values>,
) -> Result<Option<GattConnection<'values, 'server, DefaultPacketPool>>, BleHostError<C::Error>> {
    let mut adv_data = [0; 31];
    let adv_len = AdStructure::encode_slice(
        &[
            AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
            AdStructure::CompleteLocalName(name.as_bytes()),
        ],
        &mut adv_data[..],
    )?;

    let advertiser = peripheral
        .advertise(
            &Default::default(),
            Advertisement::ConnectableScannableUndirected {
                adv_data: &adv_data[..adv_len],
                scan_data: &[],
            },
        )
        .await?;
    debug!("Advertising as {}", name);

    match select(
        advertiser.accept(),
        Timer::after_secs(ADVERTISING_WINDOW_SECS),
    )
    .await
    {
        Either::First(conn) => Ok(Some(conn?.with_attribute_server(server)?)),
        Either::Second(()) => Ok(None),
    }
}

/// Serve GATT requests until the peer disconnects; returns the reason code
async fn serve(
    service: &AttributeService<'_>,
    server: &Server<'_>,
    conn: &GattConnection<'_, '_, DefaultPacketPool>,
) -> u8 {
    loop {
        match conn.next().await {
            GattConnectionEvent::Disconnected { reason } => break reason.into_inner(),
            GattConnectionEvent::Gatt { event } => {
                let rejection = match &event {
                    GattEvent::Read(read) => server
                        .attribute_id(read.handle())
                        .and_then(|id| server.refresh(service, id).err()),
                    GattEvent::Write(write) => server
                        .attribute_id(write.handle())
                        .and_then(|id| service.write(id, Instant::now(), write.data()).err()),
                    _ => None,
                };
                let reply = match rejection {
                    Some(e) => event.reject(att_error_code(e)),
                    None => event.accept(),
                };
                match reply {
                    Ok(reply) => reply.send().await,
                    Err(e) => warn!("GATT response error: {:?}", e),
                }
            }
            _ => {}
        }
    }
}

/// Advertise, serve, and re-advertise forever
pub async fn run<C: Controller>(
    name: &str,
    service: &AttributeService<'_>,
    peripheral: &mut Peripheral<'_, C, DefaultPacketPool>,
) -> ! {
    let server = match Server::new_with_config(GapConfig::Peripheral(PeripheralConfig {
        name,
        appearance: &appearance::UNKNOWN,
    })) {
        Ok(server) => server,
        Err(e) => panic!("GATT server setup failed: {:?}", e),
    };
    info!("BLE service ready, advertising as {}", name);

    loop {
        let event = match advertise(name, peripheral, &server).await {
            Ok(Some(conn)) => {
                let handle = conn.raw().handle().raw();
                service.on_gap_event(GapEvent::Connected { handle });
                let reason = serve(service, &server, &conn).await;
                GapEvent::Disconnected { reason }
            }
            Ok(None) => GapEvent::AdvertisingComplete,
            Err(e) => {
                warn!("Advertising/connect failed: {:?}", e);
                GapEvent::ConnectFailed { status: 0 }
            }
        };
        if service.on_gap_event(event) != GapAction::StartAdvertising {
            warn!("Unexpected GAP transition after {:?}", event);
        }
    }
}
