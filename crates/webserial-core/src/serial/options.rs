//! Serial line settings.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::constants::DEFAULT_BAUD_RATE;
use crate::error::ResourceError;

/// Baud rates accepted by `set_speed`.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19_200, 38_400, 57_600,
    115_200, 230_400, 460_800, 500_000, 576_000, 921_600, 1_000_000, 1_152_000, 1_500_000,
    2_000_000, 2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// Validate a requested baud rate.
pub fn validate_baud_rate(baud: u32) -> Result<u32, ResourceError> {
    if STANDARD_BAUD_RATES.contains(&baud) {
        Ok(baud)
    } else {
        Err(ResourceError::InvalidBaud)
    }
}

/// Validate a character size (data bits).
pub fn validate_character_size(bits: u8) -> Result<u8, ResourceError> {
    if (5..=8).contains(&bits) {
        Ok(bits)
    } else {
        Err(ResourceError::BadValue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl FromStr for Parity {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Parity::None),
            "odd" => Ok(Parity::Odd),
            "even" => Ok(Parity::Even),
            _ => Err(ResourceError::BadValue),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

impl FromStr for StopBits {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "one" => Ok(StopBits::One),
            "1.5" | "onepointfive" => Ok(StopBits::OnePointFive),
            "2" | "two" => Ok(StopBits::Two),
            _ => Err(ResourceError::BadValue),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

impl FromStr for FlowControl {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(FlowControl::None),
            "hw" | "hardware" => Ok(FlowControl::Hardware),
            "sw" | "software" => Ok(FlowControl::Software),
            _ => Err(ResourceError::BadValue),
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowControl::None => "none",
            FlowControl::Hardware => "hardware",
            FlowControl::Software => "software",
        })
    }
}

/// Line settings applied when a port is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortOptions {
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub character_size: u8,
    pub flow_control: FlowControl,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::None,
            stop_bits: StopBits::One,
            character_size: 8,
            flow_control: FlowControl::None,
        }
    }
}

impl fmt::Display for PortOptions {
    /// Compact `115200 8N1` style summary.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate, self.character_size, parity, self.stop_bits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_115200_8n1() {
        let opts = PortOptions::default();
        assert_eq!(opts.baud_rate, 115_200);
        assert_eq!(opts.character_size, 8);
        assert_eq!(opts.to_string(), "115200 8N1");
        assert_eq!(opts.flow_control, FlowControl::None);
    }

    #[test]
    fn parity_aliases() {
        assert_eq!("off".parse::<Parity>(), Ok(Parity::None));
        assert_eq!("EVEN".parse::<Parity>(), Ok(Parity::Even));
        assert_eq!("mark".parse::<Parity>(), Err(ResourceError::BadValue));
    }

    #[test]
    fn stop_bit_aliases() {
        assert_eq!("onepointfive".parse::<StopBits>(), Ok(StopBits::OnePointFive));
        assert_eq!("2".parse::<StopBits>(), Ok(StopBits::Two));
        assert_eq!(StopBits::OnePointFive.to_string(), "1.5");
        assert!("3".parse::<StopBits>().is_err());
    }

    #[test]
    fn flow_control_aliases() {
        assert_eq!("hw".parse::<FlowControl>(), Ok(FlowControl::Hardware));
        assert_eq!("software".parse::<FlowControl>(), Ok(FlowControl::Software));
        assert!("xon".parse::<FlowControl>().is_err());
    }

    #[test]
    fn baud_validation() {
        assert_eq!(validate_baud_rate(9600), Ok(9600));
        assert_eq!(validate_baud_rate(0), Err(ResourceError::InvalidBaud));
        assert_eq!(validate_baud_rate(12345), Err(ResourceError::InvalidBaud));
    }

    #[test]
    fn character_size_validation() {
        assert_eq!(validate_character_size(5), Ok(5));
        assert_eq!(validate_character_size(9), Err(ResourceError::BadValue));
        assert_eq!(validate_character_size(4), Err(ResourceError::BadValue));
    }
}
