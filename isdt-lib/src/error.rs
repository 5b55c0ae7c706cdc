use std::io;
use thiserror::Error;

/// The primary error type for the `isdt-lib` library.
///
/// Protocol-shape anomalies (bad sync byte, bad direction, checksum mismatch,
/// short frames) are deliberately *not* represented here. The protocol is
/// reverse engineered and varies across firmware revisions, so those are
/// downgraded to `tracing` warnings and decoding continues best-effort.
#[derive(Error, Debug)]
pub enum IsdtError {
    #[error("HID device not found. Is the charger connected?")]
    DeviceNotFound,

    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timed out waiting for a frame from the charger")]
    Timeout,

    #[error("Unsupported charger model: {0:?}")]
    UnsupportedModel(String),

    #[error("Firmware image truncated: header needs {expected} bytes, image has {actual}")]
    TruncatedHeader { expected: usize, actual: usize },

    #[error("Command payload too long: {0} bytes, the length field is one byte (max 255)")]
    PayloadTooLong(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),
}
