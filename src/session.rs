//! Capture session state machine
//!
//! A [`Session`] walks a device through connect, start, the per-frame poll loop, stop and
//! disconnect:
//!
//! ```no_run
//! use v4l_capture::{Config, Frame, Session};
//! use v4l_capture::io::Mode;
//!
//! let config = Config::new("/dev/video0").with_mode(Mode::Mmap);
//! let mut session = Session::new(config);
//!
//! session.connect().expect("failed to connect");
//! session.start().expect("failed to start streaming");
//! for _ in 0..10 {
//!     let _ = session.update(&mut |frame: &Frame| {
//!         println!("frame {}: {} bytes", frame.number, frame.data.len());
//!     });
//! }
//! session.disconnect().expect("failed to disconnect");
//! ```

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use crate::buffer::Metadata;
use crate::capability::{self, Capabilities};
use crate::config::Config;
use crate::device::{Device, Open, System};
use crate::error::{Error, Result};
use crate::field::FieldOrder;
use crate::format::Format;
use crate::fourcc::FourCC;
use crate::io::{Mode, Transport};

/// Longest time a single poll waits for the device to become readable
pub const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// One captured frame
///
/// The data is borrowed from the transport and only valid during the [`Sink`] call.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Raw frame data in the negotiated format
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCC,
    pub field_order: FieldOrder,
    /// Frame number assigned by the session, starting at 1
    pub number: u64,
    /// Driver metadata, zeroed for read i/o except for `bytesused`
    pub meta: Metadata,
}

/// Receives captured frames
pub trait Sink {
    fn frame(&mut self, frame: &Frame<'_>);
}

impl<F> Sink for F
where
    F: FnMut(&Frame<'_>),
{
    fn frame(&mut self, frame: &Frame<'_>) {
        self(frame)
    }
}

/// Capture session on a single device
pub struct Session<O: Open = System> {
    config: Config,
    opener: O,

    handle: Option<Arc<O::Device>>,
    caps: Option<Capabilities>,
    format: Option<Format>,
    transport: Option<Box<dyn Transport>>,

    streaming: bool,
    frame_number: u64,
}

impl Session<System> {
    /// Returns a disconnected session for real device nodes
    pub fn new(config: Config) -> Self {
        Session::with_opener(config, System)
    }
}

impl<O: Open> Session<O> {
    /// Returns a disconnected session which opens its device through `opener`
    pub fn with_opener(config: Config, opener: O) -> Self {
        Session {
            config,
            opener,
            handle: None,
            caps: None,
            format: None,
            transport: None,
            streaming: false,
            frame_number: 0,
        }
    }

    /// Opens the device, negotiates the format and sets up the transport buffers
    ///
    /// On error the session stays disconnected and everything acquired so far is released.
    pub fn connect(&mut self) -> Result<()>
    where
        O::Device: 'static,
    {
        if self.handle.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let path = self.config.device_name.clone();
        let mode = self.config.mode();
        let requested = if self.config.force() {
            Some(self.config.requested_format()?)
        } else {
            None
        };

        self.opener
            .check(&path)
            .map_err(|source| Error::DeviceNotFound {
                path: path.clone(),
                source,
            })?;

        let dev = self.opener.open(&path).map_err(|source| Error::OpenFailed {
            path: path.clone(),
            source,
        })?;

        let caps = dev.query_caps().map_err(|e| Error::NotACaptureDevice {
            path: path.clone(),
            source: Some(e),
        })?;
        if !caps.can_capture() {
            return Err(Error::NotACaptureDevice { path, source: None });
        }

        let required = if mode.streaming() {
            capability::Flags::STREAMING
        } else {
            capability::Flags::READ_WRITE
        };
        if !caps.capabilities.contains(required) {
            return Err(Error::UnsupportedTransport { path, mode });
        }

        crop(&dev);
        let format = negotiate(&dev, requested)?;
        debug!(
            path = ?path,
            "negotiated format {}x{} {} ({} bytes)",
            format.width,
            format.height,
            format.fourcc,
            format.frame_size()
        );

        let handle = Arc::new(dev);
        let transport = crate::io::init(mode, handle.clone(), &format)?;
        debug!(path = ?path, %mode, count = transport.len(), "buffers ready");

        info!(path = ?path, %mode, card = %caps.card, "connected");
        self.handle = Some(handle);
        self.caps = Some(caps);
        self.format = Some(format);
        self.transport = Some(transport);
        Ok(())
    }

    /// Stops streaming, releases all buffers and closes the device
    ///
    /// Does nothing if the session is not connected.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Ok(());
        }

        let res = self.teardown();
        info!(path = ?self.config.device_name, "disconnected");
        res
    }

    /// Stops streaming, frees the buffers and closes the device
    fn teardown(&mut self) -> Result<()> {
        self.stop();
        if let Some(mut transport) = self.transport.take() {
            transport.release();
        }
        self.caps = None;
        self.format = None;

        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        match Arc::try_unwrap(handle) {
            Ok(dev) => dev.close().map_err(Error::CloseFailed),
            // someone still holds a buffer, the last reference closes the device
            Err(_) => {
                warn!("device still referenced, deferring close");
                Ok(())
            }
        }
    }

    /// Queues all buffers and starts streaming, a no-op for read i/o
    pub fn start(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        if self.streaming {
            return Ok(());
        }

        transport.start()?;
        self.streaming = true;
        debug!(mode = %transport.mode(), "streaming started");
        Ok(())
    }

    /// Stops streaming
    ///
    /// Failures are logged, the session is considered stopped either way.
    pub fn stop(&mut self) {
        if !self.streaming {
            return;
        }
        self.streaming = false;

        if let Some(transport) = self.transport.as_mut() {
            match transport.stop() {
                Ok(()) => debug!(mode = %transport.mode(), "streaming stopped"),
                Err(e) => warn!(error = %e, "VIDIOC_STREAMOFF failed"),
            }
        }
    }

    /// Waits for one frame and passes it to `sink`
    ///
    /// Returns the new frame number. No error disconnects the session.
    pub fn poll<S: Sink + ?Sized>(&mut self, sink: &mut S) -> Result<u64> {
        let (handle, transport, format) = match (&self.handle, &mut self.transport, &self.format)
        {
            (Some(handle), Some(transport), Some(format)) => (handle, transport, format),
            _ => return Err(Error::NotConnected),
        };

        match handle.wait_readable(POLL_TIMEOUT) {
            Ok(true) => {}
            Ok(false) => return Err(Error::PollTimeout(POLL_TIMEOUT)),
            Err(e) => return Err(Error::PollError(e)),
        }

        let number = self.frame_number + 1;
        transport.acquire(&mut |data: &[u8], meta: &Metadata| {
            sink.frame(&Frame {
                data,
                width: format.width,
                height: format.height,
                fourcc: format.fourcc,
                field_order: format.field_order,
                number,
                meta: *meta,
            })
        })?;

        self.frame_number = number;
        Ok(number)
    }

    /// Runs one capture cycle and logs its failure at a fitting level
    pub fn update<S: Sink + ?Sized>(&mut self, sink: &mut S) -> Result<u64> {
        let res = self.poll(sink);
        if let Err(e) = &res {
            match e {
                Error::PollTimeout(_) => warn!(error = %e, "no frame"),
                e if e.is_recoverable() => debug!(error = %e, "no frame"),
                e => error!(error = %e, "capture failed"),
            }
        }
        res
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Configured transport mode
    pub fn mode(&self) -> Mode {
        self.config.mode()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Capabilities of the connected device
    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.caps.as_ref()
    }

    /// Format in effect, `None` while disconnected
    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Number of frames captured so far, kept across stop and start
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of live transport buffers, 0 while disconnected
    pub fn buffer_count(&self) -> usize {
        self.transport.as_ref().map_or(0, |t| t.len())
    }
}

impl<O: Open> Drop for Session<O> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "failed to release device");
        }
    }
}

/// Resets cropping to the driver default, ignoring drivers which do not support it
fn crop<D: Device>(dev: &D) {
    let res = dev.crop_default().and_then(|rect| dev.set_crop(rect));
    if let Err(e) = res {
        match e.raw_os_error() {
            Some(libc::EINVAL) | Some(libc::ENOTTY) => debug!("cropping not supported"),
            _ => warn!(error = %e, "cannot reset cropping"),
        }
    }
}

/// Applies the requested format, if any, and returns the format in effect
fn negotiate<D: Device>(dev: &D, requested: Option<Format>) -> Result<Format> {
    let requested = match requested {
        Some(fmt) => fmt,
        None => {
            return dev.format().map_err(|source| Error::FormatNegotiationFailed {
                op: "VIDIOC_G_FMT",
                source,
            })
        }
    };

    let actual = dev
        .set_format(&requested)
        .map_err(|source| Error::FormatNegotiationFailed {
            op: "VIDIOC_S_FMT",
            source,
        })?;
    if (actual.width, actual.height) != (requested.width, requested.height) {
        debug!(
            "driver adjusted {}x{} to {}x{}",
            requested.width, requested.height, actual.width, actual.height
        );
    }
    Ok(actual)
}
