// level.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Water tank level as reported by the tank switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WaterLevel {
    Down = 0,
    Filling = 1,
    Up = 2,
    Clearing = 3,
}

impl WaterLevel {
    pub const ALL: [WaterLevel; 4] = [
        WaterLevel::Down,
        WaterLevel::Filling,
        WaterLevel::Up,
        WaterLevel::Clearing,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WaterLevel::Down),
            1 => Some(WaterLevel::Filling),
            2 => Some(WaterLevel::Up),
            3 => Some(WaterLevel::Clearing),
            _ => None,
        }
    }
}

impl From<WaterLevel> for u8 {
    fn from(level: WaterLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for WaterLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        WaterLevel::from_u8(value).ok_or(value)
    }
}

impl fmt::Display for WaterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaterLevel::Down => "DOWN",
            WaterLevel::Filling => "FILLING",
            WaterLevel::Up => "UP",
            WaterLevel::Clearing => "CLEARING",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_levels_map_to_0_3() {
        let values: Vec<u8> = WaterLevel::ALL.iter().map(|l| l.as_u8()).collect();
        assert_eq!(values, vec![0, 1, 2, 3]);
        for l in WaterLevel::ALL {
            assert_eq!(WaterLevel::try_from(u8::from(l)), Ok(l));
        }
        assert_eq!(WaterLevel::try_from(4), Err(4));
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(WaterLevel::Down < WaterLevel::Filling);
        assert!(WaterLevel::Filling < WaterLevel::Up);
        assert!(WaterLevel::Up < WaterLevel::Clearing);
        assert_eq!(WaterLevel::Filling.to_string(), "FILLING");
    }
}

// EOF
