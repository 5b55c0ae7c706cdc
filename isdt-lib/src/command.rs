//! Commands the chargers understand, and their raw payload bytes.

/// Maximum length of a device name, in bytes. Longer names are cut off.
pub const NAME_LEN: usize = 8;

/// A command to send to the charger.
///
/// [`Command::payload`] yields the raw opcode byte sequence; the frame codec
/// takes care of framing, escaping and checksumming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Well-supported nop, answered in both app and bootloader mode.
    LinkTest,
    /// Hardware, bootloader and app versions plus the model name.
    Version,
    /// Rename the device. Causes an immediate reboot.
    Rename(String),
    /// The unique device ID register of the STM32-like MCU.
    SerialNumber,
    /// Charging metrics for one 0-indexed channel.
    Metrics { channel: u8 },
    /// Reboot into the bootloader.
    RebootToBootloader,
    /// Reboot into the app.
    RebootToApp,
    /// A bank of sensors, meanings partially unknown.
    Sensors,
    /// Per-channel sensor block for one 0-indexed channel.
    ChannelSensors { channel: u8 },
    /// Supply and per-channel voltages.
    ChannelVoltages,
    /// Ask the device to checksum `size` bytes of flash at `offset` and
    /// compare against `checksum` (the u32 sum over the decrypted image).
    VerifyFirmware { offset: u32, size: u32, checksum: u32 },
    /// Arbitrary payload, no questions asked.
    Raw(Vec<u8>),
}

impl Command {
    /// Raw payload bytes for this command.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::LinkTest => vec![0x00],
            Command::Version => vec![0xE0],
            Command::Rename(name) => {
                let mut cmd = vec![0xC0];
                cmd.extend_from_slice(name.as_bytes());
                cmd.extend_from_slice(&[0u8; NAME_LEN]);
                cmd.truncate(1 + NAME_LEN);
                cmd
            }
            Command::SerialNumber => vec![0xC8],
            Command::Metrics { channel } => vec![0xDE, *channel],
            Command::RebootToBootloader => vec![0xF0, 0xAC],
            Command::RebootToApp => vec![0xFC, 0xCA],
            Command::Sensors => vec![0xF8],
            Command::ChannelSensors { channel } => vec![0xE4, *channel],
            Command::ChannelVoltages => vec![0xE4],
            Command::VerifyFirmware {
                offset,
                size,
                checksum,
            } => {
                let mut cmd = vec![0xF6, 0x35, 0x00];
                cmd.extend_from_slice(&offset.to_le_bytes());
                cmd.extend_from_slice(&size.to_le_bytes());
                cmd.extend_from_slice(&checksum.to_le_bytes());
                cmd
            }
            Command::Raw(payload) => payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_command_payloads() {
        assert_eq!(Command::LinkTest.payload(), [0x00]);
        assert_eq!(Command::Version.payload(), [0xE0]);
        assert_eq!(Command::SerialNumber.payload(), [0xC8]);
        assert_eq!(Command::Metrics { channel: 2 }.payload(), [0xDE, 0x02]);
        assert_eq!(Command::RebootToBootloader.payload(), [0xF0, 0xAC]);
        assert_eq!(Command::RebootToApp.payload(), [0xFC, 0xCA]);
        assert_eq!(Command::Sensors.payload(), [0xF8]);
        assert_eq!(Command::ChannelSensors { channel: 1 }.payload(), [0xE4, 0x01]);
        assert_eq!(Command::ChannelVoltages.payload(), [0xE4]);
    }

    #[test]
    fn rename_pads_and_truncates_to_eight_bytes() {
        assert_eq!(
            Command::Rename("C4".into()).payload(),
            [0xC0, b'C', b'4', 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            Command::Rename("longername".into()).payload(),
            [0xC0, b'l', b'o', b'n', b'g', b'e', b'r', b'n', b'a']
        );
    }

    #[test]
    fn verify_firmware_is_little_endian() {
        let cmd = Command::VerifyFirmware {
            offset: 0x0800_4000,
            size: 0x0001_2345,
            checksum: 0xDEAD_BEEF,
        };
        assert_eq!(
            cmd.payload(),
            [
                0xF6, 0x35, 0x00, // opcode
                0x00, 0x40, 0x00, 0x08, // offset
                0x45, 0x23, 0x01, 0x00, // size
                0xEF, 0xBE, 0xAD, 0xDE, // checksum
            ]
        );
    }
}
