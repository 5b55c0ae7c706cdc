//! Session-level behavior over a replayed transport.

use isdt_lib::record::Response;
use isdt_lib::transport::ReplayTransport;
use isdt_lib::{Charger, Command, IsdtError, Mode, Model};

/// Captured link-test response: 10-byte form, in the bootloader, model "C4".
const LINK_TEST_FRAME: &str =
    "020eaa210a01004334000000000000a300000000000000000000000000000000\
     0000000000000000000000000000000000000000000000000000000000000000";

/// Captured A4 version response (39-byte device information packet).
const VERSION_FRAME: &str =
    "022daa2127e14134000000000000010200000100000101000011413400000000\
     00000000000012081d11153bc200000000000000000000000000000000000000";

#[test]
fn send_writes_framed_command() {
    let mut charger = Charger::new(ReplayTransport::default());
    charger.send(&Command::LinkTest).unwrap();
    charger.send(&Command::Metrics { channel: 3 }).unwrap();

    let written = charger.transport().written();
    assert_eq!(written.len(), 2);
    // 0xAA 0x12 <len> <payload> <checksum>, framed as a request.
    assert_eq!(&written[0][..7], &[0x01, 0x05, 0xAA, 0x12, 0x01, 0x00, 0x13]);
    assert_eq!(
        &written[1][..8],
        &[0x01, 0x06, 0xAA, 0x12, 0x02, 0xDE, 0x03, 0xF5]
    );
}

#[test]
fn query_decodes_a_replayed_response() {
    let transport = ReplayTransport::new([hex::decode(LINK_TEST_FRAME).unwrap()]);
    let mut charger = Charger::new(transport);
    let decoded = charger.query(&Command::LinkTest, Model::Ignore).unwrap();
    assert_eq!(
        decoded.body,
        Some(Response::LinkTest {
            result: true,
            inside_bootloader: true,
            model: Some("C4".into()),
        })
    );
}

#[test]
fn identity_discovery() {
    let transport = ReplayTransport::new([
        hex::decode(LINK_TEST_FRAME).unwrap(),
        hex::decode(VERSION_FRAME).unwrap(),
    ]);
    let mut charger = Charger::new(transport);
    let (model, mode) = charger.model_and_mode().unwrap();
    assert_eq!(model, "A4");
    assert_eq!(mode, Mode::Bootloader);
    assert_eq!(model.parse::<Model>().unwrap(), Model::A4);
}

#[test]
fn exhausted_transport_times_out() {
    let mut charger = Charger::new(ReplayTransport::default());
    charger.send(&Command::Version).unwrap();
    assert!(matches!(
        charger.read_response(),
        Err(IsdtError::Timeout)
    ));
}
