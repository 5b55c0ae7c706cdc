//! Human-readable rendition of decoded packets.

use isdt_lib::firmware::DecryptedImage;
use isdt_lib::record::{Decoded, Response};
use std::fmt::Write;

/// Render a decoded packet as text. Every packet renders to something, even
/// the malformed and unknown ones; the device's quirks must never crash the
/// presentation.
pub fn to_text(decoded: &Decoded) -> String {
    let body = decoded.body.as_ref().map(response_text);
    let text = body.unwrap_or_else(|| format!("Unknown packet type ({}).", decoded.kind));
    if decoded.malformed {
        format!("MALFORMED!\n{text}")
    } else {
        text
    }
}

fn response_text(response: &Response) -> String {
    match response {
        Response::LinkTest {
            result,
            inside_bootloader,
            model,
        } => {
            let mut text = format!(
                "Link test {}\nCurrently running the {}",
                if *result { "succeeded" } else { "failed" },
                if *inside_bootloader { "bootloader" } else { "app" },
            );
            if let Some(model) = model {
                write!(text, "\nModel: {model}").unwrap();
            }
            text
        }
        Response::DeviceInfo(info) => {
            let mut text = format!(
                "Model name: {}\nHardware version {}\nBootloader version {}\nOS/App version {}",
                info.model_name, info.hw_version, info.bl_version, info.app_version
            );
            if let Some(time) = &info.loader_build_time {
                write!(text, "\nLoader build time (probably): {time}").unwrap();
            }
            text
        }
        Response::RebootToBootloader { rebooting: true, .. } => "Rebooting to bootloader.".into(),
        Response::RebootToBootloader {
            rebooting: false, ..
        } => "Not rebooting.".into(),
        Response::RenameAck { .. } => "Device renamed, rebooting.".into(),
        Response::RebootToApp { .. } => "Rebooting to app.".into(),
        Response::SerialNumber { serial_number } => format!("Serial Number: {serial_number}"),
        Response::Metrics(None) => "Channel does not exist.".into(),
        Response::Metrics(Some(m)) => format!(
            "CH {} {:>13}: {:>7} {:>5} at {:>3} %, {:>2} °C, {:>6.3} V * {:>6.3} A, {:>3} Ohm, {} s",
            m.channel,
            m.mode,
            m.chemistry,
            m.dimensions,
            m.progress_pct,
            m.temperature_c,
            f64::from(m.charging_voltage_mv) / 1000.0,
            f64::from(m.charging_current_ma) / 1000.0,
            m.resistance_mohm,
            m.seconds,
        ),
        Response::AppChecksum { checksum_matches } => {
            if *checksum_matches {
                "The checksum matches the checksum of the image in flash.".into()
            } else {
                "The checksum DOES NOT match the checksum of the image in flash.".into()
            }
        }
        Response::Sensors(s) => {
            let mut text = format!(
                "Sensors:\nPSU Voltage: {} mV\nUSB Voltage: {} mV",
                s.psu_voltage_mv, s.usb_voltage_mv
            );
            for (i, v) in s.unknown_voltages_mv.iter().enumerate() {
                write!(text, "\nUnknown Voltage {}: {} mV", i + 1, v).unwrap();
            }
            for (i, t) in s.channel_temperatures_c.iter().enumerate() {
                write!(text, "\nChannel Temperature {}: {} °C", i + 1, t).unwrap();
            }
            write!(text, "\nUnknown Temperature: {} °C", s.unknown_temperature_c).unwrap();
            text
        }
        Response::UnknownVoltages { voltages_mv } => {
            let mut text = String::from("Voltages:");
            for (i, v) in voltages_mv.iter().enumerate() {
                write!(text, "\nUnknown Voltage {}: {} mV", i + 1, v).unwrap();
            }
            text
        }
        Response::EvoChannelMetrics(m) => format!(
            "CH {}: PSU {:.3} V, charging {:.3} V * {:.3} A, {} °C",
            m.channel,
            f64::from(m.psu_voltage_mv) / 1000.0,
            f64::from(m.charging_voltage_mv) / 1000.0,
            f64::from(m.current_ma) / 1000.0,
            m.temperature_c,
        ),
        Response::ChannelVoltages(v) => {
            let mut text = format!(
                "PSU Voltage: {} mV\nTotal Voltage: {} mV ({} channels)",
                v.psu_voltage_mv, v.total_voltage_mv, v.channel_count
            );
            for (i, mv) in v.channel_voltages_mv.iter().enumerate() {
                write!(text, "\nChannel {i} Voltage: {mv} mV").unwrap();
            }
            text
        }
    }
}

/// Render the `fw-info` summary for a decrypted image.
pub fn firmware_summary(image: &DecryptedImage) -> String {
    let header = &image.header;
    let mut text = format!(
        "Firmware Image Summary\n\
         ----------------------\n\
         Embedded Checksum:   0x{:x}\n\
         Calculated Checksum: 0x{:x}\n\
         Checksum {}\n\
         \n\
         App Summary\n\
         -----------\n\
         App Storage Offset: 0x{:x}\n\
         App Size:           {} bytes\n\
         \n\
         Data Summary\n\
         ------------\n\
         Data Storage Offset: 0x{:x}\n\
         Data Size:           {} bytes\n\
         \n\
         Flashing Summary\n\
         ----------------\n\
         Initial Baud Rate: {}\n\
         Fast Baud Rate:    {}",
        header.embedded_checksum,
        image.calculated_checksum,
        if image.checksum_matches() { "OK" } else { "wrong" },
        header.app_storage_offset,
        header.app_size,
        header.data_storage_offset,
        header.data_size,
        header.initial_baud_rate,
        header.fast_baud_rate,
    );

    match &image.info {
        Some(info) => write!(
            text,
            "\n\nFirmware Summary\n\
             ----------------\n\
             Information Structure at 0x{:x}\n\
             Magic:                   0x{:x}\n\
             Model Name:              {}\n\
             Hardware Version:        {}\n\
             Software Version:        {}\n\
             Entrypoint:              0x{:x}\n\
             App Size:                {} bytes",
            info.pointer,
            info.magic,
            info.model_name,
            info.hw_version,
            info.sw_version,
            info.entrypoint,
            info.app_image_size,
        )
        .unwrap(),
        None => text.push_str("\n\nCould not read firmware info table."),
    }
    text
}
