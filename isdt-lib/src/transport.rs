//! Blocking frame transport: the one seam between the protocol engine and
//! the host HID stack.

use crate::error::IsdtError;
use crate::frame::FRAME_SIZE;
use hidapi::{HidApi, HidDevice};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

/// USB vendor ID shared by the supported chargers (GDMicroelectronics).
pub const DEFAULT_VID: u16 = 0x28E9;
/// USB product ID of the C4. The A4 reports the same IDs and even calls
/// itself C4 in the descriptor; telling them apart requires asking.
pub const DEFAULT_PID: u16 = 0x028A;

/// A byte-oriented request/response channel carrying 64-byte frames.
///
/// Strictly synchronous: one outstanding request at a time, blocking reads
/// with a per-frame timeout. Transport failures are fatal to the operation
/// in progress and propagate unmodified.
pub trait Transport {
    /// Write one 64-byte frame to the device.
    fn write_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), IsdtError>;

    /// Read one frame of up to 64 bytes, waiting at most `timeout`.
    fn read_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, IsdtError>;
}

/// [`Transport`] over a hidapi device handle.
pub struct HidTransport {
    device: HidDevice,
}

impl HidTransport {
    /// Open the first device matching `vid`/`pid`.
    pub fn open(vid: u16, pid: u16) -> Result<Self, IsdtError> {
        let api = HidApi::new()?;
        if !api
            .device_list()
            .any(|d| d.vendor_id() == vid && d.product_id() == pid)
        {
            return Err(IsdtError::DeviceNotFound);
        }
        let device = api.open(vid, pid)?;
        debug!(vid = format_args!("{vid:04x}"), pid = format_args!("{pid:04x}"), "opened charger");
        Ok(Self { device })
    }

    /// Open a device by its platform-specific HID path. Needed to pick one
    /// charger when several share the same IDs.
    pub fn open_path(path: &str) -> Result<Self, IsdtError> {
        let api = HidApi::new()?;
        let path = std::ffi::CString::new(path)
            .map_err(|_| IsdtError::Protocol("HID path contains a NUL byte".into()))?;
        let device = api.open_path(&path)?;
        Ok(Self { device })
    }
}

impl Transport for HidTransport {
    fn write_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), IsdtError> {
        trace!(frame = hex::encode(frame), "writing frame");
        self.device.write(frame)?;
        Ok(())
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, IsdtError> {
        let mut buf = [0u8; FRAME_SIZE];
        let n = self.device.read_timeout(&mut buf, timeout_millis(timeout))?;
        if n == 0 {
            return Err(IsdtError::Timeout);
        }
        trace!(frame = hex::encode(&buf[..n]), "read frame");
        Ok(buf[..n].to_vec())
    }
}

/// hidapi takes the timeout as `i32` milliseconds; clamp oversized
/// `Duration`s instead of letting the cast wrap negative (blocking forever).
fn timeout_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

/// In-memory transport replaying captured frames; records written frames.
/// For tests and for decoding captures offline.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<[u8; FRAME_SIZE]>,
}

impl ReplayTransport {
    pub fn new<I, F>(frames: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Vec<u8>>,
    {
        Self {
            incoming: frames.into_iter().map(Into::into).collect(),
            written: Vec::new(),
        }
    }

    /// Frames written so far, in order.
    pub fn written(&self) -> &[[u8; FRAME_SIZE]] {
        &self.written
    }
}

impl Transport for ReplayTransport {
    fn write_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), IsdtError> {
        self.written.push(*frame);
        Ok(())
    }

    fn read_frame(&mut self, _timeout: Duration) -> Result<Vec<u8>, IsdtError> {
        self.incoming.pop_front().ok_or(IsdtError::Timeout)
    }
}
