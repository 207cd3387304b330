use std::{fmt, str};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
/// Four character code representing a pixelformat
pub struct FourCC {
    pub repr: [u8; 4],
}

impl FourCC {
    /// Packed YUV 4:2:2, two bytes per pixel
    pub const YUYV: FourCC = FourCC { repr: *b"YUYV" };

    /// Returns a pixelformat as four character code
    ///
    /// # Arguments
    ///
    /// * `repr` - Four characters as raw bytes
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::FourCC;
    /// let fourcc = FourCC::new(b"YUYV");
    /// ```
    pub const fn new(repr: &[u8; 4]) -> FourCC {
        FourCC { repr: *repr }
    }

    /// Returns the string representation of a four character code
    pub fn str(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.repr)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.str() {
            Ok(string) => write!(f, "{}", string),
            Err(_) => write!(f, "{:#010x}", u32::from(*self)),
        }
    }
}

impl str::FromStr for FourCC {
    type Err = String;

    /// Parses codes such as "YUYV" or "MJPG". Codes shorter than four characters are padded
    /// with spaces, the way the kernel spells e.g. "Y16 ".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || !s.is_ascii() {
            return Err(format!("invalid four character code: {:?}", s));
        }

        let mut repr = [b' '; 4];
        repr[..bytes.len()].copy_from_slice(bytes);
        Ok(FourCC { repr })
    }
}

impl From<u32> for FourCC {
    fn from(code: u32) -> Self {
        FourCC::new(&code.to_le_bytes())
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        Self::from_le_bytes(fourcc.repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_little_endian() {
        // v4l2_fourcc('Y', 'U', 'Y', 'V')
        assert_eq!(u32::from(FourCC::YUYV), 0x5659_5559);
        assert_eq!(FourCC::from(0x5659_5559), FourCC::YUYV);
    }

    #[test]
    fn parses_names() {
        assert_eq!("MJPG".parse::<FourCC>().unwrap(), FourCC::new(b"MJPG"));
        assert_eq!("Y16".parse::<FourCC>().unwrap(), FourCC::new(b"Y16 "));
        assert!("".parse::<FourCC>().is_err());
        assert!("TOOLONG".parse::<FourCC>().is_err());
    }

    #[test]
    fn displays_non_printable_codes_as_hex() {
        assert_eq!(FourCC::YUYV.to_string(), "YUYV");
        assert_eq!(FourCC::new(&[0xff, 0, 0, 0]).to_string(), "0x000000ff");
    }
}
