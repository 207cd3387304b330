use std::fmt;

use crate::v4l2::videodev::v4l2_capability;

bitflags::bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        const VIDEO_CAPTURE         = 0x00000001;
        const VIDEO_OUTPUT          = 0x00000002;
        const VIDEO_OVERLAY         = 0x00000004;
        const VBI_CAPTURE           = 0x00000010;
        const VBI_OUTPUT            = 0x00000020;
        const SLICED_VBI_CAPTURE    = 0x00000040;
        const SLICED_VBI_OUTPUT     = 0x00000080;
        const RDS_CAPTURE           = 0x00000100;
        const VIDEO_OUTPUT_OVERLAY  = 0x00000200;
        const HW_FREQ_SEEK          = 0x00000400;
        const RDS_OUTPUT            = 0x00000800;

        const VIDEO_CAPTURE_MPLANE  = 0x00001000;
        const VIDEO_OUTPUT_MPLANE   = 0x00002000;
        const VIDEO_M2M_MPLANE      = 0x00004000;
        const VIDEO_M2M             = 0x00008000;

        const TUNER                 = 0x00010000;
        const AUDIO                 = 0x00020000;
        const RADIO                 = 0x00040000;
        const MODULATOR             = 0x00080000;

        const SDR_CAPTURE           = 0x00100000;
        const EXT_PIX_FORMAT        = 0x00200000;
        const SDR_OUTPUT            = 0x00400000;
        const META_CAPTURE          = 0x00800000;

        const READ_WRITE            = 0x01000000;
        const ASYNC_IO              = 0x02000000;
        const STREAMING             = 0x04000000;
        const META_OUTPUT           = 0x08000000;

        const TOUCH                 = 0x10000000;

        const DEVICE_CAPS           = 0x80000000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_retain(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Device capabilities
pub struct Capabilities {
    /// Driver name, e.g. uvc for usb video class devices
    pub driver: String,
    /// Card name
    pub card: String,
    /// Bus name, e.g. USB or PCI
    pub bus: String,
    /// Version number MAJOR.MINOR.PATCH
    pub version: (u8, u8, u8),

    /// Capability flags of the opened node
    pub capabilities: Flags,
}

impl Capabilities {
    /// Returns capabilities with empty identification strings
    ///
    /// # Arguments
    ///
    /// * `capabilities` - Capability flags of the node
    pub fn new(capabilities: Flags) -> Self {
        Capabilities {
            driver: String::new(),
            card: String::new(),
            bus: String::new(),
            version: (0, 0, 0),
            capabilities,
        }
    }

    /// Whether the node can capture video at all
    pub fn can_capture(&self) -> bool {
        self.capabilities.contains(Flags::VIDEO_CAPTURE)
    }
}

fn c_str(raw: &[u8]) -> String {
    let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..len]).into_owned()
}

impl From<v4l2_capability> for Capabilities {
    fn from(cap: v4l2_capability) -> Self {
        // device_caps describes the opened node, capabilities the whole physical device
        let flags = if Flags::from(cap.capabilities).contains(Flags::DEVICE_CAPS) {
            cap.device_caps
        } else {
            cap.capabilities
        };

        Capabilities {
            driver: c_str(&cap.driver),
            card: c_str(&cap.card),
            bus: c_str(&cap.bus_info),
            version: (
                ((cap.version >> 16) & 0xff) as u8,
                ((cap.version >> 8) & 0xff) as u8,
                (cap.version & 0xff) as u8,
            ),
            capabilities: Flags::from(flags),
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Driver      : {}", self.driver)?;
        writeln!(f, "Card        : {}", self.card)?;
        writeln!(f, "Bus         : {}", self.bus)?;
        writeln!(
            f,
            "Version     : {}.{}.{}",
            self.version.0, self.version.1, self.version.2
        )?;
        writeln!(f, "Capabilites : {}", self.capabilities)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(capabilities: u32, device_caps: u32) -> v4l2_capability {
        let mut cap = v4l2_capability {
            driver: [0; 16],
            card: [0; 32],
            bus_info: [0; 32],
            version: 0x0005_0a03,
            capabilities,
            device_caps,
            reserved: [0; 3],
        };
        cap.driver[..3].copy_from_slice(b"uvc");
        cap
    }

    #[test]
    fn prefers_device_caps_when_advertised() {
        let caps = Capabilities::from(raw(
            (Flags::DEVICE_CAPS | Flags::VIDEO_CAPTURE | Flags::STREAMING).bits(),
            Flags::VIDEO_CAPTURE.bits(),
        ));
        assert!(caps.can_capture());
        assert!(!caps.capabilities.contains(Flags::STREAMING));
    }

    #[test]
    fn falls_back_to_physical_caps() {
        let caps = Capabilities::from(raw((Flags::VIDEO_CAPTURE | Flags::READ_WRITE).bits(), 0));
        assert!(caps.capabilities.contains(Flags::READ_WRITE));
        assert_eq!(caps.driver, "uvc");
        assert_eq!(caps.version, (5, 10, 3));
    }
}
