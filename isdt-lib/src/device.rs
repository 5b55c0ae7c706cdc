//! The charger session: sequences commands and responses over a transport.
//!
//! All protocol knowledge lives in the frame codec and the packet decoder;
//! this type only pairs them with a transport handle.

use crate::command::Command;
use crate::error::IsdtError;
use crate::frame::{self, Reassembler, Reassembly};
use crate::model::{Mode, Model};
use crate::record::{Decoded, Response, decode};
use crate::transport::Transport;
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

/// Matches the chargers' pacing; they answer well within this.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// An exclusively-owned charger session over some [`Transport`].
pub struct Charger<T: Transport> {
    transport: T,
    read_timeout: Duration,
}

impl<T: Transport> Charger<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_timeout(transport: T, read_timeout: Duration) -> Self {
        Self {
            transport,
            read_timeout,
        }
    }

    /// Borrow the underlying transport, e.g. to inspect a replay.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one command, as one or more frames.
    pub fn send(&mut self, command: &Command) -> Result<(), IsdtError> {
        for frame in frame::encode_command(&command.payload())? {
            self.transport.write_frame(&frame)?;
        }
        Ok(())
    }

    /// Read and reassemble one logical response packet.
    ///
    /// Transport errors (including timeouts) abort the read and discard any
    /// partial state; protocol anomalies are logged and tolerated.
    pub fn read_response(&mut self) -> Result<Bytes, IsdtError> {
        let mut reassembler = Reassembler::new();
        loop {
            let frame = self.transport.read_frame(self.read_timeout)?;
            if let Reassembly::Complete(payload) = reassembler.push_frame(&frame) {
                return Ok(payload);
            }
        }
    }

    /// Send a command and decode the response with `model`'s tables.
    pub fn query(&mut self, command: &Command, model: Model) -> Result<Decoded, IsdtError> {
        self.send(command)?;
        let payload = self.read_response()?;
        Ok(decode(&payload, model))
    }

    /// Discover what we are talking to: a link test tells us the mode, a
    /// version query the model name. Decoding runs without model enrichment
    /// since the model is exactly what we do not know yet.
    pub fn model_and_mode(&mut self) -> Result<(String, Mode), IsdtError> {
        let link = self.query(&Command::LinkTest, Model::Ignore)?;
        let mode = match link.body {
            Some(Response::LinkTest {
                inside_bootloader, ..
            }) => {
                if inside_bootloader {
                    Mode::Bootloader
                } else {
                    Mode::App
                }
            }
            _ => {
                return Err(IsdtError::Protocol(format!(
                    "link test answered with {}",
                    link.kind
                )));
            }
        };

        let version = self.query(&Command::Version, Model::Ignore)?;
        let Some(Response::DeviceInfo(info)) = version.body else {
            return Err(IsdtError::Protocol(format!(
                "version query answered with {}",
                version.kind
            )));
        };

        info!(model = %info.model_name, %mode, "identified charger");
        Ok((info.model_name, mode))
    }
}
