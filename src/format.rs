use std::{convert::TryFrom, fmt};

use crate::field::FieldOrder;
use crate::fourcc::FourCC;
use crate::v4l2::videodev::v4l2_pix_format;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Streaming format (single-planar)
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,
    /// field order for interlacing
    pub field_order: FieldOrder,

    /// bytes per line
    pub stride: u32,
    /// maximum number of bytes required to store an image
    pub size: u32,
}

impl Format {
    /// Returns a capture format
    ///
    /// # Arguments
    ///
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `fourcc` - Four character code (pixelformat)
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::{Format, FourCC};
    /// let fmt = Format::new(640, 480, FourCC::new(b"YUYV"));
    /// ```
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Format {
            width,
            height,
            fourcc,
            field_order: FieldOrder::Any,
            stride: 0,
            size: 0,
        }
    }

    /// Number of bytes one captured frame occupies
    ///
    /// Some drivers report a zero or too small `sizeimage`, so the value is raised to at least
    /// `stride * height`, with the stride raised to at least two bytes per pixel.
    pub fn frame_size(&self) -> usize {
        let stride = self.stride.max(self.width.saturating_mul(2)) as usize;
        (self.size as usize).max(stride * self.height as usize)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width          : {}", self.width)?;
        writeln!(f, "height         : {}", self.height)?;
        writeln!(f, "fourcc         : {}", self.fourcc)?;
        writeln!(f, "field          : {}", self.field_order)?;
        writeln!(f, "stride         : {}", self.stride)?;
        writeln!(f, "size           : {}", self.size)?;
        Ok(())
    }
}

impl From<v4l2_pix_format> for Format {
    fn from(fmt: v4l2_pix_format) -> Self {
        Self {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.pixelformat),
            field_order: FieldOrder::try_from(fmt.field).unwrap_or(FieldOrder::Any),
            stride: fmt.bytesperline,
            size: fmt.sizeimage,
        }
    }
}

impl From<Format> for v4l2_pix_format {
    fn from(format: Format) -> Self {
        Self {
            width: format.width,
            height: format.height,
            pixelformat: format.fourcc.into(),
            field: format.field_order as u32,
            bytesperline: format.stride,
            sizeimage: format.size,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_trusts_the_driver_when_plausible() {
        let fmt = Format {
            stride: 1280,
            size: 640 * 480 * 2 + 4096,
            ..Format::new(640, 480, FourCC::YUYV)
        };
        assert_eq!(fmt.frame_size(), 614_400 + 4096);
    }

    #[test]
    fn frame_size_covers_bogus_driver_values() {
        let fmt = Format::new(640, 480, FourCC::YUYV);
        assert_eq!(fmt.frame_size(), 614_400);

        let fmt = Format {
            stride: 100,
            size: 10,
            ..Format::new(320, 240, FourCC::YUYV)
        };
        assert_eq!(fmt.frame_size(), 320 * 2 * 240);
    }

    #[test]
    fn converts_from_raw_format() {
        let raw = v4l2_pix_format {
            width: 800,
            height: 600,
            pixelformat: u32::from(FourCC::new(b"MJPG")),
            field: FieldOrder::Progressive as u32,
            bytesperline: 0,
            sizeimage: 123_456,
            ..Default::default()
        };

        let fmt = Format::from(raw);
        assert_eq!(fmt.fourcc, FourCC::new(b"MJPG"));
        assert_eq!(fmt.field_order, FieldOrder::Progressive);
        assert_eq!(fmt.size, 123_456);
        assert_eq!(v4l2_pix_format::from(fmt).sizeimage, 123_456);
    }
}
