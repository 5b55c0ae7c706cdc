//! Protocol engine for ISDT battery chargers, reverse engineered over USB
//! HID. Frame codec, model-aware packet decoder, firmware image codec, and a
//! thin session type tying them to a blocking transport.

pub mod command;
pub mod device;
pub mod error;
pub mod firmware;
pub mod frame;
pub mod model;
pub mod record;
pub mod transport;

pub use command::Command;
pub use device::Charger;
pub use error::IsdtError;
pub use model::{Mode, Model};
pub use record::{Decoded, PacketKind, Response, decode};
pub use transport::{HidTransport, ReplayTransport, Transport};
