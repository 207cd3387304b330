//! Device configuration record
//!
//! The record is plain serde data with the key names used by existing configuration files, e.g.
//!
//! ```json
//! { "DeviceName": "/dev/video0", "IOMethod": "IO_METHOD_MMAP", "FrameSize": [640, 480] }
//! ```
//!
//! Reading and writing the file itself is up to the caller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::field::FieldOrder;
use crate::fourcc::FourCC;
use crate::format::Format;
use crate::io::Mode;

/// Width and height used when forcing a format without a `FrameSize`
pub const DEFAULT_FRAME_SIZE: [u32; 2] = [640, 480];

/// Pixel format used when forcing a format without a `PixelFormat`
pub const DEFAULT_FOURCC: FourCC = FourCC::YUYV;

/// Field order used when forcing a format without a `FieldOrder`
pub const DEFAULT_FIELD_ORDER: FieldOrder = FieldOrder::Interlaced;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Path of the device node
    pub device_name: PathBuf,

    /// One of `IO_METHOD_READ`, `IO_METHOD_MMAP` or `IO_METHOD_USERPTR`
    #[serde(rename = "IOMethod", default, skip_serializing_if = "Option::is_none")]
    pub io_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<[u32; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_order: Option<String>,

    /// Whether to set a format on connect instead of keeping the current one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_format: Option<bool>,
}

/// What a session writes back: the device and the canonical i/o method name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub device_name: PathBuf,
    #[serde(rename = "IOMethod")]
    pub io_method: String,
}

impl Config {
    /// Returns a configuration for `path` using read i/o and the current device format
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Config {
            device_name: path.as_ref().to_path_buf(),
            io_method: None,
            frame_size: None,
            pixel_format: None,
            field_order: None,
            force_format: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.io_method = Some(mode.name().to_string());
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some([width, height]);
        self
    }

    pub fn with_pixel_format(mut self, fourcc: FourCC) -> Self {
        self.pixel_format = Some(fourcc.to_string());
        self
    }

    pub fn with_field_order(mut self, order: FieldOrder) -> Self {
        self.field_order = Some(order.name().to_string());
        self
    }

    pub fn with_force_format(mut self, force: bool) -> Self {
        self.force_format = Some(force);
        self
    }

    /// Transport mode to use
    ///
    /// Unknown names fall back to [`Mode::Read`].
    pub fn mode(&self) -> Mode {
        match &self.io_method {
            None => Mode::default(),
            Some(name) => name.parse::<Mode>().unwrap_or_else(|e| {
                warn!(error = %e, "falling back to {}", Mode::default().name());
                Mode::default()
            }),
        }
    }

    /// Whether connect sets a format
    ///
    /// Without an explicit `ForceFormat` this is true as soon as any format key is present.
    pub fn force(&self) -> bool {
        self.force_format.unwrap_or(
            self.frame_size.is_some() || self.pixel_format.is_some() || self.field_order.is_some(),
        )
    }

    /// Format to request when forcing, missing values taken from the defaults
    pub fn requested_format(&self) -> Result<Format> {
        let [width, height] = self.frame_size.unwrap_or(DEFAULT_FRAME_SIZE);
        if width == 0 || height == 0 {
            return Err(Error::Config {
                key: "FrameSize",
                reason: format!("{}x{} is empty", width, height),
            });
        }

        let fourcc = match &self.pixel_format {
            Some(code) => code.parse::<FourCC>().map_err(|reason| Error::Config {
                key: "PixelFormat",
                reason,
            })?,
            None => DEFAULT_FOURCC,
        };

        let field_order = match &self.field_order {
            Some(name) => name.parse::<FieldOrder>().map_err(|reason| Error::Config {
                key: "FieldOrder",
                reason,
            })?,
            None => DEFAULT_FIELD_ORDER,
        };

        Ok(Format {
            field_order,
            ..Format::new(width, height, fourcc)
        })
    }

    /// Record to persist after a session was set up
    pub fn to_record(&self) -> Record {
        Record {
            device_name: self.device_name.clone(),
            io_method: self.mode().name().to_string(),
        }
    }
}
