//! Model-aware packet decoder: raw logical packets in, typed records out.
//!
//! [`decode`] never fails. A payload whose shape does not match what its
//! opcode promises comes back with [`Decoded::malformed`] set and no body,
//! and an opcode outside the known set decodes to [`PacketKind::Unknown`];
//! presentation layers must be able to render every response the device
//! produces, however odd.

use crate::model::{Mode, Model};
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Serialize, Serializer};
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{I16, I32, U16, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// Packet kind, dispatched on the opcode (first payload byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PacketKind {
    #[strum(to_string = "link test")]
    LinkTest = 0x01,
    #[strum(to_string = "rename device")]
    RenameAck = 0xC1,
    #[strum(to_string = "serial number")]
    SerialNumber = 0xC9,
    #[strum(to_string = "metrics")]
    Metrics = 0xDF,
    #[strum(to_string = "device information")]
    DeviceInfo = 0xE1,
    #[strum(to_string = "channel status")]
    ChannelStatus = 0xE5,
    #[strum(to_string = "reboot to bootloader")]
    RebootToBootloader = 0xF1,
    #[strum(to_string = "app checksum")]
    AppChecksum = 0xF7,
    #[strum(to_string = "sensors")]
    Sensors = 0xF9,
    #[strum(to_string = "unknown voltages")]
    UnknownVoltages = 0xFB,
    #[strum(to_string = "reboot to app")]
    RebootToApp = 0xFD,
    #[strum(to_string = "unknown")]
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl Serialize for PacketKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A decoded response packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded {
    /// Best-effort packet kind, present even when the body did not parse.
    pub kind: PacketKind,
    /// Length or shape did not match what the opcode promises.
    pub malformed: bool,
    /// Typed body; `None` for malformed or unknown packets.
    pub body: Option<Response>,
}

/// Typed response bodies, one variant per packet kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Response {
    LinkTest {
        result: bool,
        inside_bootloader: bool,
        /// Only the 10-byte form (A4 in any mode, C4 in the bootloader)
        /// carries the model name.
        model: Option<String>,
    },
    DeviceInfo(DeviceInfo),
    RebootToBootloader {
        rebooting: bool,
        next_stop: Option<Mode>,
    },
    RenameAck {
        renamed: bool,
        rebooting: bool,
        next_stop: Mode,
    },
    SerialNumber {
        /// Hex rendition of the MCU's unique device ID register.
        serial_number: String,
    },
    RebootToApp {
        rebooting: bool,
        next_stop: Mode,
        coming_from: Mode,
    },
    /// `None` means the queried channel does not exist on this device.
    Metrics(Option<ChannelMetrics>),
    AppChecksum {
        checksum_matches: bool,
    },
    Sensors(Sensors),
    UnknownVoltages {
        voltages_mv: [u16; 9],
    },
    /// 0xE5 on a C4EVO.
    EvoChannelMetrics(EvoChannelMetrics),
    /// 0xE5 on everything that is not a C4EVO.
    ChannelVoltages(ChannelVoltages),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub hw_version: String,
    pub bl_version: String,
    pub app_version: String,
    pub model_name: String,
    /// Best-effort guess, decoded from the tail of the 39-byte form. These
    /// look like the last bytes of the bootloader section in flash.
    pub loader_build_time: Option<String>,
}

/// One channel's charging state, with labels resolved per model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMetrics {
    pub channel: u8,
    pub mode_id: u8,
    pub mode: &'static str,
    pub chemistry_id: u8,
    pub chemistry: &'static str,
    pub dimensions_id: u8,
    pub dimensions: &'static str,
    pub temperature_c: i8,
    /// Probably the MOSFET temperature; the fan switches on this one.
    pub internal_temperature_c: i8,
    pub progress_pct: u8,
    pub charging_voltage_mv: i16,
    pub charging_current_ma: i16,
    pub resistance_mohm: u16,
    pub power: i16,
    pub energy: i16,
    pub capacity_or_peak_voltage: i32,
    pub seconds: u32,
}

/// The 0xF9 sensor bank. Half of these have no confirmed meaning; the field
/// layout is exact, the names are not to be trusted beyond that.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensors {
    pub psu_voltage_mv: u16,
    pub usb_voltage_mv: u16,
    pub unknown_voltages_mv: [u16; 6],
    pub channel_temperatures_c: [u8; 4],
    pub unknown_temperature_c: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvoChannelMetrics {
    pub channel: u8,
    pub psu_voltage_mv: u16,
    pub charging_voltage_mv: u16,
    pub current_ma: u16,
    pub temperature_c: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelVoltages {
    pub channel_count: u8,
    pub psu_voltage_mv: u16,
    pub total_voltage_mv: u16,
    pub channel_voltages_mv: Vec<u16>,
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct MetricsRaw {
    channel: u8,
    mode_id: u8,
    chemistry_id: u8,
    dimensions_id: u8,
    temperature: i8,
    internal_temperature: i8,
    progress: u8,
    charging_voltage: I16,
    charging_current: I16,
    resistance: U16,
    power: I16,
    energy: I16,
    capacity_or_peak_voltage: I32,
    seconds: U32,
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct SensorsRaw {
    _reserved: [u8; 6],
    voltages: [U16; 8],
    temperatures: [u8; 5],
    _pad: u8,
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct EvoChannelRaw {
    channel: u8,
    psu_voltage: U16,
    charging_voltage: U16,
    current: U16,
    _pad: [u8; 2],
    temperature: u8,
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct ChannelVoltagesRaw {
    channel_count: u8,
    psu_voltage: U16,
    _reserved1: [u8; 4],
    total_voltage: U16,
    _reserved2: [u8; 4],
}

fn ascii_trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

fn dotted_version(bytes: &[u8]) -> String {
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Decode a logical packet into a typed record.
///
/// `model` selects the label tables for metrics enrichment and decides how
/// the ambiguous 0xE5 opcode is read; pass [`Model::Ignore`] while the model
/// is not yet known.
pub fn decode(payload: &[u8], model: Model) -> Decoded {
    let Some(&opcode) = payload.first() else {
        return Decoded {
            kind: PacketKind::Unknown(0),
            malformed: true,
            body: None,
        };
    };
    let kind = PacketKind::from_primitive(opcode);

    let body: Option<Response> = match kind {
        PacketKind::LinkTest => match payload.len() {
            // The C4 in app mode answers with 4 bytes and no model name.
            4 => Some(Response::LinkTest {
                result: true,
                inside_bootloader: false,
                model: None,
            }),
            10 => Some(Response::LinkTest {
                result: true,
                inside_bootloader: payload[1] == 0,
                model: Some(ascii_trimmed(&payload[2..10])),
            }),
            _ => None,
        },
        PacketKind::DeviceInfo => match payload.len() {
            len @ (29 | 31 | 39) => Some(Response::DeviceInfo(DeviceInfo {
                hw_version: dotted_version(&payload[9..13]),
                bl_version: dotted_version(&payload[13..17]),
                app_version: dotted_version(&payload[17..21]),
                model_name: ascii_trimmed(&payload[21..usize::min(31, len)]),
                loader_build_time: (len == 39).then(|| {
                    let t = &payload[0x21..0x21 + 5];
                    format!("20{:02}-{:02}-{:02} {:02}:{:02}", t[0], t[1], t[2], t[3], t[4])
                }),
            })),
            _ => None,
        },
        PacketKind::RebootToBootloader => match payload {
            [_, 0x00] => Some(Response::RebootToBootloader {
                rebooting: true,
                next_stop: Some(Mode::Bootloader),
            }),
            [_, 0x02] => Some(Response::RebootToBootloader {
                rebooting: false,
                next_stop: None,
            }),
            _ => None,
        },
        PacketKind::RenameAck => (payload.len() == 2).then_some(Response::RenameAck {
            renamed: true,
            rebooting: true,
            next_stop: Mode::App,
        }),
        PacketKind::SerialNumber => (payload.len() == 13).then(|| Response::SerialNumber {
            serial_number: hex::encode(&payload[1..13]),
        }),
        PacketKind::RebootToApp => match payload.len() {
            len @ (1 | 2) => Some(Response::RebootToApp {
                rebooting: true,
                next_stop: Mode::App,
                coming_from: if len == 1 { Mode::Bootloader } else { Mode::App },
            }),
            _ => None,
        },
        PacketKind::Metrics => match payload.len() {
            // A bare opcode means the queried channel does not exist.
            1 => Some(Response::Metrics(None)),
            26 => MetricsRaw::read_from_bytes(&payload[1..])
                .ok()
                .map(|raw| Response::Metrics(Some(enrich_metrics(&raw, model)))),
            _ => None,
        },
        PacketKind::AppChecksum => (payload.len() == 15).then(|| Response::AppChecksum {
            checksum_matches: payload[2] == 0x00,
        }),
        PacketKind::Sensors => (payload.len() == 29)
            .then(|| SensorsRaw::read_from_bytes(&payload[1..]).ok())
            .flatten()
            .map(|raw| {
                Response::Sensors(Sensors {
                    psu_voltage_mv: raw.voltages[0].get(),
                    usb_voltage_mv: raw.voltages[1].get(),
                    unknown_voltages_mv: [
                        raw.voltages[2].get(),
                        raw.voltages[3].get(),
                        raw.voltages[4].get(),
                        raw.voltages[5].get(),
                        raw.voltages[6].get(),
                        raw.voltages[7].get(),
                    ],
                    channel_temperatures_c: [
                        raw.temperatures[0],
                        raw.temperatures[1],
                        raw.temperatures[2],
                        raw.temperatures[3],
                    ],
                    unknown_temperature_c: raw.temperatures[4],
                })
            }),
        PacketKind::UnknownVoltages => (payload.len() == 19)
            .then(|| <[U16; 9]>::read_from_bytes(&payload[1..]).ok())
            .flatten()
            .map(|raw| Response::UnknownVoltages {
                voltages_mv: raw.map(|v| v.get()),
            }),
        PacketKind::ChannelStatus => decode_channel_status(payload, model),
        PacketKind::Unknown(_) => None,
    };

    let malformed = body.is_none() && !matches!(kind, PacketKind::Unknown(_));
    Decoded {
        kind,
        malformed,
        body,
    }
}

fn enrich_metrics(raw: &MetricsRaw, model: Model) -> ChannelMetrics {
    ChannelMetrics {
        channel: raw.channel,
        mode_id: raw.mode_id,
        mode: model.mode_label(raw.mode_id),
        chemistry_id: raw.chemistry_id,
        chemistry: model.chemistry_label(raw.chemistry_id),
        dimensions_id: raw.dimensions_id,
        dimensions: model.dimensions_label(raw.dimensions_id),
        temperature_c: raw.temperature,
        internal_temperature_c: raw.internal_temperature,
        progress_pct: raw.progress,
        charging_voltage_mv: raw.charging_voltage.get(),
        charging_current_ma: raw.charging_current.get(),
        resistance_mohm: raw.resistance.get(),
        power: raw.power.get(),
        energy: raw.energy.get(),
        capacity_or_peak_voltage: raw.capacity_or_peak_voltage.get(),
        seconds: raw.seconds.get(),
    }
}

/// The 0xE5 body differs between the C4EVO (one channel's live metrics) and
/// all other models (a per-channel voltage list).
fn decode_channel_status(payload: &[u8], model: Model) -> Option<Response> {
    let body = &payload[1..];
    if model == Model::C4Evo {
        let (raw, _rest) = EvoChannelRaw::read_from_prefix(body).ok()?;
        return Some(Response::EvoChannelMetrics(EvoChannelMetrics {
            channel: raw.channel,
            psu_voltage_mv: raw.psu_voltage.get(),
            charging_voltage_mv: raw.charging_voltage.get(),
            current_ma: raw.current.get(),
            temperature_c: raw.temperature,
        }));
    }

    let (raw, rest) = ChannelVoltagesRaw::read_from_prefix(body).ok()?;
    let count = raw.channel_count as usize;
    if rest.len() != count * 2 {
        return None;
    }
    let channel_voltages_mv = rest
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Some(Response::ChannelVoltages(ChannelVoltages {
        channel_count: raw.channel_count,
        psu_voltage_mv: raw.psu_voltage.get(),
        total_voltage_mv: raw.total_voltage.get(),
        channel_voltages_mv,
    }))
}
