// config.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::layout::{Field, TEXT_CAPACITY};

pub type Text = heapless::String<TEXT_CAPACITY>;

// "Default time definition" in the hardware headers: FAN_ON, FAN_OFF, MODE
pub const DEFAULT_DELTA_ON: u8 = 4;
pub const DEFAULT_DELTA_OFF: u8 = 2;
pub const DEFAULT_SEASON: Season = Season::Winter;

pub const DEFAULT_API_PORT: u16 = 80;

pub fn api_port() -> u16 {
    option_env!("API_PORT")
        .unwrap_or("-")
        .parse()
        .unwrap_or(DEFAULT_API_PORT)
}

pub fn fixed_text(s: &str) -> Text {
    let mut end = s.len().min(TEXT_CAPACITY);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut t = Text::new();
    // cannot fail, the prefix fits
    let _ = t.push_str(&s[..end]);
    t
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    #[default]
    Winter,
    Summer,
}

impl Season {
    pub const fn is_summer(self) -> bool {
        matches!(self, Season::Summer)
    }

    pub const fn as_byte(self) -> u8 {
        self.is_summer() as u8
    }

    pub const fn from_byte(b: u8) -> Self {
        if b == 0 {
            Season::Winter
        } else {
            Season::Summer
        }
    }
}

impl From<bool> for Season {
    fn from(summer: bool) -> Self {
        if summer {
            Season::Summer
        } else {
            Season::Winter
        }
    }
}

impl From<Season> for bool {
    fn from(season: Season) -> Self {
        season.is_summer()
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Season::Winter => f.write_str("winter"),
            Season::Summer => f.write_str("summer"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    BadText(Field),
    Hysteresis { delta_on: u8, delta_off: u8 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BadText(field) => {
                write!(f, "{field} must be ASCII without NUL bytes")
            }
            ConfigError::Hysteresis {
                delta_on,
                delta_off,
            } => write!(
                f,
                "delta_off ({delta_off}) must not be greater than delta_on ({delta_on})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirKitConfig {
    // runtime only, not persisted
    #[serde(default)]
    pub mac: u64,

    pub ssid: Text,
    pub password: Text,
    pub thingspeak_api: Text,

    pub delta_on: u8,
    pub delta_off: u8,
    pub season: Season,
}

impl Default for AirKitConfig {
    fn default() -> Self {
        Self {
            mac: 0,
            ssid: fixed_text(option_env!("WIFI_SSID").unwrap_or("internet")),
            password: fixed_text(option_env!("WIFI_PASS").unwrap_or("password")),
            thingspeak_api: fixed_text(option_env!("THINGSPEAK_API").unwrap_or("")),
            delta_on: DEFAULT_DELTA_ON,
            delta_off: DEFAULT_DELTA_OFF,
            season: DEFAULT_SEASON,
        }
    }
}

impl AirKitConfig {
    pub fn text(&self, field: Field) -> Option<&Text> {
        match field {
            Field::Ssid => Some(&self.ssid),
            Field::Password => Some(&self.password),
            Field::ThingspeakApi => Some(&self.thingspeak_api),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for field in Field::ALL.into_iter().filter(|f| f.is_text()) {
            if let Some(t) = self.text(field) {
                if t.bytes().any(|b| b == 0 || !b.is_ascii()) {
                    return Err(ConfigError::BadText(field));
                }
            }
        }
        if self.delta_off > self.delta_on {
            return Err(ConfigError::Hysteresis {
                delta_on: self.delta_on,
                delta_off: self.delta_off,
            });
        }
        Ok(())
    }

    pub fn set_mac(&mut self, mac: [u8; 6]) {
        self.mac = mac.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    }

    pub fn mac_bytes(&self) -> [u8; 6] {
        let b = self.mac.to_be_bytes();
        [b[2], b[3], b[4], b[5], b[6], b[7]]
    }

    pub fn mac_string(&self) -> String {
        let m = self.mac_bytes();
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }

    pub fn device_id(&self) -> String {
        format!("airkit-{}", self.mac_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_header_values() {
        let c = AirKitConfig::default();
        assert_eq!(c.delta_on, 4);
        assert_eq!(c.delta_off, 2);
        assert_eq!(c.season, Season::Winter);
        assert_eq!(c.mac, 0);
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn test_fixed_text_truncates_to_capacity() {
        let long = "x".repeat(40);
        assert_eq!(fixed_text(&long).len(), TEXT_CAPACITY);
        assert_eq!(fixed_text("short").as_str(), "short");

        // 31 ASCII bytes + a two byte char must not be split
        let s = format!("{}é", "a".repeat(31));
        assert_eq!(fixed_text(&s).as_str(), "a".repeat(31));
    }

    #[test]
    fn test_validate_rejects_inverted_hysteresis() {
        let c = AirKitConfig {
            delta_on: 2,
            delta_off: 3,
            ..Default::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigError::Hysteresis {
                delta_on: 2,
                delta_off: 3
            })
        );

        let equal = AirKitConfig {
            delta_on: 3,
            delta_off: 3,
            ..Default::default()
        };
        assert_eq!(equal.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_text() {
        let c = AirKitConfig {
            password: fixed_text("pässword"),
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::BadText(Field::Password)));

        let c = AirKitConfig {
            ssid: fixed_text("a\0b"),
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::BadText(Field::Ssid)));
    }

    #[test]
    fn test_season_byte_mapping() {
        assert_eq!(Season::Winter.as_byte(), 0);
        assert_eq!(Season::Summer.as_byte(), 1);
        assert_eq!(Season::from_byte(0), Season::Winter);
        assert_eq!(Season::from_byte(1), Season::Summer);
        assert_eq!(Season::from_byte(0xFF), Season::Summer);
        assert!(bool::from(Season::from(true)));
    }

    #[test]
    fn test_mac_formatting() {
        let mut c = AirKitConfig::default();
        c.set_mac([0x24, 0x0a, 0xc4, 0x01, 0x02, 0xff]);
        assert_eq!(c.mac, 0x240a_c401_02ff);
        assert_eq!(c.mac_bytes(), [0x24, 0x0a, 0xc4, 0x01, 0x02, 0xff]);
        assert_eq!(c.device_id(), "airkit-24:0A:C4:01:02:FF");
    }

    #[test]
    fn test_json_shape() {
        let c = AirKitConfig {
            ssid: fixed_text("home"),
            password: fixed_text("secret"),
            thingspeak_api: fixed_text("ABCDEF"),
            delta_on: 5,
            delta_off: 1,
            season: Season::Summer,
            mac: 0,
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["ssid"], "home");
        assert_eq!(v["season"], "summer");
        assert_eq!(v["delta_on"], 5);

        // mac is optional on input
        let posted = r#"{"ssid":"home","password":"secret","thingspeak_api":"ABCDEF",
            "delta_on":5,"delta_off":1,"season":"summer"}"#;
        let back: AirKitConfig = serde_json::from_str(posted).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_json_rejects_overlong_text() {
        let posted = format!(
            r#"{{"ssid":"{}","password":"","thingspeak_api":"","delta_on":4,"delta_off":2,"season":"winter"}}"#,
            "s".repeat(33)
        );
        assert!(serde_json::from_str::<AirKitConfig>(&posted).is_err());
    }
}

// EOF
