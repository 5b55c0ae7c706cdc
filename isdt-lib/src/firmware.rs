//! Firmware image codec.
//!
//! ISDT ships firmware updates as encrypted images: a 32-byte plaintext
//! header followed by the image, XORed block-wise against a rolling key
//! seeded from the header. The decrypted image embeds a small information
//! structure (model, versions, entry point) that a pointer at offset 40
//! locates.

use crate::error::IsdtError;
use tracing::debug;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// Byte offset of the pointer to the embedded info structure, inside the
/// decrypted image.
const INFO_POINTER_OFFSET: usize = 40;

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct HeaderRaw {
    encryption_key: U32,
    checksum: U32,
    app_storage_offset: U32,
    data_storage_offset: U32,
    app_size: U32,
    data_size: U32,
    initial_baud_rate: U32,
    fast_baud_rate: U32,
}

#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct InfoRaw {
    magic: U32,
    model_name: [u8; 8],
    hw_version: [i8; 4],
    sw_version: [i8; 4],
    entrypoint: U32,
    app_image_size: U32,
}

/// The 32-byte plaintext header at the start of every image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FirmwareHeader {
    pub encryption_key: u32,
    /// u32 sum over the decrypted image, as recorded by the vendor.
    pub embedded_checksum: u32,
    pub app_storage_offset: u32,
    pub data_storage_offset: u32,
    pub app_size: u32,
    pub data_size: u32,
    /// Baud rates for the serial flashing path, unused over USB.
    pub initial_baud_rate: u32,
    pub fast_baud_rate: u32,
}

/// The embedded information structure, when it could be located.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FirmwareInfo {
    /// Where in the decrypted image the structure was found.
    pub pointer: usize,
    pub magic: u32,
    pub model_name: String,
    pub hw_version: String,
    pub sw_version: String,
    pub entrypoint: u32,
    pub app_image_size: u32,
}

/// A fully decrypted firmware image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedImage {
    pub header: FirmwareHeader,
    /// u32 sum over the decrypted blocks; compare against
    /// [`FirmwareHeader::embedded_checksum`].
    pub calculated_checksum: u32,
    pub data: Vec<u8>,
    /// `None` when the info structure could not be read; that is not a
    /// defect of the image, some images simply lack it.
    pub info: Option<FirmwareInfo>,
}

impl DecryptedImage {
    pub fn checksum_matches(&self) -> bool {
        self.calculated_checksum == self.header.embedded_checksum
    }
}

/// Decrypt an encrypted firmware image.
///
/// Fails only when the 32-byte header is missing. A trailing partial block
/// is silently dropped, and a missing or unreadable info structure degrades
/// to `info: None`.
pub fn decrypt(image: &[u8]) -> Result<DecryptedImage, IsdtError> {
    let Ok((raw, ciphertext)) = HeaderRaw::read_from_prefix(image) else {
        return Err(IsdtError::TruncatedHeader {
            expected: size_of::<HeaderRaw>(),
            actual: image.len(),
        });
    };
    let header = FirmwareHeader {
        encryption_key: raw.encryption_key.get(),
        embedded_checksum: raw.checksum.get(),
        app_storage_offset: raw.app_storage_offset.get(),
        data_storage_offset: raw.data_storage_offset.get(),
        app_size: raw.app_size.get(),
        data_size: raw.data_size.get(),
        initial_baud_rate: raw.initial_baud_rate.get(),
        fast_baud_rate: raw.fast_baud_rate.get(),
    };

    let key1 = header.encryption_key;
    let mut key2 = header.embedded_checksum;
    let mut calculated_checksum = 0u32;
    let mut data = Vec::with_capacity(ciphertext.len());

    for block in ciphertext.chunks_exact(4) {
        let plain = u32::from_le_bytes([block[0], block[1], block[2], block[3]]) ^ key2;
        key2 = key2.wrapping_add(key1) ^ key1;
        data.extend_from_slice(&plain.to_le_bytes());
        calculated_checksum = calculated_checksum.wrapping_add(plain);
    }

    let info = read_info(&data, header.app_storage_offset);
    debug!(
        image_len = image.len(),
        decrypted_len = data.len(),
        info_found = info.is_some(),
        "decrypted firmware image"
    );

    Ok(DecryptedImage {
        header,
        calculated_checksum,
        data,
        info,
    })
}

fn read_info(data: &[u8], app_storage_offset: u32) -> Option<FirmwareInfo> {
    let pointer_bytes = data.get(INFO_POINTER_OFFSET..INFO_POINTER_OFFSET + 4)?;
    let flash_address = u32::from_le_bytes(pointer_bytes.try_into().ok()?);
    // The pointer is a flash address; images start at the app storage offset.
    let pointer = flash_address.wrapping_sub(app_storage_offset) as usize;

    let raw = InfoRaw::read_from_prefix(data.get(pointer..)?).ok()?.0;
    Some(FirmwareInfo {
        pointer,
        magic: raw.magic.get(),
        model_name: String::from_utf8_lossy(&raw.model_name)
            .trim_end_matches('\0')
            .to_string(),
        hw_version: dotted(&raw.hw_version),
        sw_version: dotted(&raw.sw_version),
        entrypoint: raw.entrypoint.get(),
        app_image_size: raw.app_image_size.get(),
    })
}

fn dotted(version: &[i8; 4]) -> String {
    format!("{}.{}.{}.{}", version[0], version[1], version[2], version[3])
}
