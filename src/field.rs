use std::convert::TryFrom;
use std::{fmt, str};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
/// Represents how fields are interlaced (if they are)
pub enum FieldOrder {
    /// Progressive, Top, Bottom, or Interlaced is acceptable; driver will pick one
    Any = 0,
    /// progressive, not interlaced
    Progressive = 1,
    /// top, or odd, field
    Top = 2,
    /// bottom, or even, field
    Bottom = 3,
    /// both fields interlaced
    Interlaced = 4,
    /// top field stored first, then bottom field
    SequentialTB = 5,
    /// bottom field stored first, then top field
    SequentialBT = 6,
    /// one field at a time, alternates between top and bottom
    Alternate = 7,
    /// both fields interlaced, starts with top
    InterlacedTB = 8,
    /// both fields interlaced, starts with bottom
    InterlacedBT = 9,
}

impl FieldOrder {
    /// Short name as accepted by [`str::FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Progressive => "none",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Interlaced => "interlaced",
            Self::SequentialTB => "seq_tb",
            Self::SequentialBT => "seq_bt",
            Self::Alternate => "alternate",
            Self::InterlacedTB => "interlaced_tb",
            Self::InterlacedBT => "interlaced_bt",
        }
    }
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Progressive => write!(f, "progressive"),
            Self::Top => write!(f, "top"),
            Self::Bottom => write!(f, "bottom"),
            Self::Interlaced => write!(f, "interlaced"),
            Self::SequentialTB => write!(f, "sequential, top then bottom"),
            Self::SequentialBT => write!(f, "sequential, bottom then top"),
            Self::Alternate => write!(f, "alternate between fields"),
            Self::InterlacedTB => write!(f, "interlaced, starting with top"),
            Self::InterlacedBT => write!(f, "interlaced, starting with bottom"),
        }
    }
}

impl TryFrom<u32> for FieldOrder {
    type Error = ();

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Any),
            1 => Ok(Self::Progressive),
            2 => Ok(Self::Top),
            3 => Ok(Self::Bottom),
            4 => Ok(Self::Interlaced),
            5 => Ok(Self::SequentialTB),
            6 => Ok(Self::SequentialBT),
            7 => Ok(Self::Alternate),
            8 => Ok(Self::InterlacedTB),
            9 => Ok(Self::InterlacedBT),
            _ => Err(()),
        }
    }
}

impl str::FromStr for FieldOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "none" | "progressive" => Ok(Self::Progressive),
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "interlaced" => Ok(Self::Interlaced),
            "seq_tb" => Ok(Self::SequentialTB),
            "seq_bt" => Ok(Self::SequentialBT),
            "alternate" => Ok(Self::Alternate),
            "interlaced_tb" => Ok(Self::InterlacedTB),
            "interlaced_bt" => Ok(Self::InterlacedBT),
            other => Err(format!("unknown field order: {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for code in 0..=9 {
            let order = FieldOrder::try_from(code).unwrap();
            assert_eq!(order.name().parse::<FieldOrder>(), Ok(order));
        }
        assert!(FieldOrder::try_from(10).is_err());
    }

    #[test]
    fn parsing_ignores_case() {
        assert_eq!("Progressive".parse::<FieldOrder>(), Ok(FieldOrder::Progressive));
        assert_eq!("INTERLACED".parse::<FieldOrder>(), Ok(FieldOrder::Interlaced));
        assert!("sideways".parse::<FieldOrder>().is_err());
    }
}
