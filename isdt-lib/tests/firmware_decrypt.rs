//! Firmware image codec: a small synthetic image with a known header, key
//! stream and embedded info structure.

use isdt_lib::IsdtError;
use isdt_lib::firmware::decrypt;

/// 32-byte header + 72 encrypted bytes. Key 0x12345678, checksum
/// 0x9AAD4473, app storage at 0x08004000; the decrypted image carries an
/// info pointer at offset 40 aiming at an info structure at offset 44
/// (model "C4", hw 1.2.3.4, sw 1.0.0.17, entry 0x08004101, 40000 bytes).
const IMAGE: &str = "785634127344ad9a0040000800000408409c00000010000000c20100000807007344bc8b\
                     97ccc4af7b752fd29f9d57d663a25fda87aea7de6b53cee28fff360553007925b700b945\
                     5f41e87c9ef1d65f303a68b59332a8d572ddebf19263290b72ad6936d388aa42";

const PLAINTEXT: &str = "0000111104001111080011110c0011111000111114001111180011111c001111200011\
                         11240011112c4000080df0feca4334000000000000010203040100001101410008409c\
                         0000";

#[test]
fn synthetic_image_decrypts_deterministically() {
    let image = hex::decode(IMAGE).unwrap();
    let first = decrypt(&image).unwrap();
    let second = decrypt(&image).unwrap();
    assert_eq!(first, second);

    assert_eq!(first.header.encryption_key, 0x1234_5678);
    assert_eq!(first.header.embedded_checksum, 0x9AAD_4473);
    assert_eq!(first.header.app_storage_offset, 0x0800_4000);
    assert_eq!(first.header.data_storage_offset, 0x0804_0000);
    assert_eq!(first.header.app_size, 40000);
    assert_eq!(first.header.data_size, 4096);
    assert_eq!(first.header.initial_baud_rate, 115_200);
    assert_eq!(first.header.fast_baud_rate, 460_800);

    assert_eq!(first.data, hex::decode(PLAINTEXT).unwrap());
    assert_eq!(first.calculated_checksum, 0x9AAD_4473);
    assert!(first.checksum_matches());
}

#[test]
fn info_structure_is_located_via_the_pointer() {
    let image = hex::decode(IMAGE).unwrap();
    let info = decrypt(&image).unwrap().info.expect("info structure");
    assert_eq!(info.pointer, 44);
    assert_eq!(info.magic, 0xCAFE_F00D);
    assert_eq!(info.model_name, "C4");
    assert_eq!(info.hw_version, "1.2.3.4");
    assert_eq!(info.sw_version, "1.0.0.17");
    assert_eq!(info.entrypoint, 0x0800_4101);
    assert_eq!(info.app_image_size, 40000);
}

#[test]
fn truncated_header_is_fatal() {
    let image = hex::decode(IMAGE).unwrap();
    assert!(matches!(
        decrypt(&image[..31]),
        Err(IsdtError::TruncatedHeader {
            expected: 32,
            actual: 31
        })
    ));
    // A header alone is fine, it just decrypts to nothing.
    let empty = decrypt(&image[..32]).unwrap();
    assert!(empty.data.is_empty());
    assert_eq!(empty.calculated_checksum, 0);
    assert!(empty.info.is_none());
}

#[test]
fn trailing_partial_block_is_dropped() {
    let mut image = hex::decode(IMAGE).unwrap();
    let full = decrypt(&image).unwrap();
    image.extend_from_slice(&[0x01, 0x02, 0x03]);
    let ragged = decrypt(&image).unwrap();
    assert_eq!(ragged.data, full.data);
    assert_eq!(ragged.calculated_checksum, full.calculated_checksum);
}

#[test]
fn unreachable_info_structure_degrades_to_none() {
    let image = hex::decode(IMAGE).unwrap();
    // Keep the pointer word but cut the image short of the structure.
    let truncated = decrypt(&image[..32 + 44]).unwrap();
    assert!(truncated.info.is_none());
    // Still deterministic and checksummed over what is there.
    assert_eq!(truncated.data.len(), 44);
}
