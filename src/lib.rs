// lib.rs
#![warn(clippy::large_futures)]

pub use std::{
    net,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

pub use anyhow::bail;
use askama::Template;
use chrono::{DateTime, Utc};
pub use log::*;
pub use serde::{Deserialize, Serialize};
pub use tokio::{
    sync::RwLock,
    time::{Duration, sleep},
};

pub mod layout;
pub use layout::*;

mod eeprom;
pub use eeprom::*;

mod config;
pub use config::*;

mod store;
pub use store::*;

mod level;
pub use level::*;

pub mod hardware;

#[cfg(target_os = "espidf")]
#[allow(ambiguous_glob_reexports)]
pub use esp_idf_hal::{
    delay::{Ets, FreeRtos},
    gpio::{self, *},
    prelude::*,
};

#[cfg(target_os = "espidf")]
mod nvs_eeprom;
#[cfg(target_os = "espidf")]
pub use nvs_eeprom::*;

#[cfg(target_os = "espidf")]
mod state;
#[cfg(target_os = "espidf")]
pub use state::*;

#[cfg(target_os = "espidf")]
mod measure;
#[cfg(target_os = "espidf")]
pub use measure::*;

#[cfg(target_os = "espidf")]
mod apiserver;
#[cfg(target_os = "espidf")]
pub use apiserver::*;

#[cfg(target_os = "espidf")]
mod wifi;
#[cfg(target_os = "espidf")]
pub use wifi::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NO_TEMP: f32 = -1000.0;

#[derive(Clone, Debug, Serialize)]
pub struct TempData {
    pub bus: String,
    pub iopin: String,
    pub sensor: String,
    pub value: f32,
}

impl TempData {
    pub fn new(bus: &str, pin: i32) -> Self {
        TempData {
            bus: bus.to_string(),
            iopin: hardware::gpio_name(pin),
            sensor: "N/A".into(),
            value: NO_TEMP,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.value > NO_TEMP
    }

    pub fn value_s(&self) -> String {
        if self.is_valid() {
            format!("{:.1}", self.value)
        } else {
            "-".into()
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TempValues {
    pub timestamp: i64,
    pub last_update: String,
    pub uptime: u32,
    pub uptime_s: String,
    pub inside: TempData,
    pub outside: TempData,
    /// inside minus outside, only when both readings are valid
    pub delta: Option<f32>,
}

impl TempValues {
    pub fn new() -> Self {
        TempValues {
            timestamp: 0,
            last_update: "-".to_string(),
            uptime: 0,
            uptime_s: "-".to_string(),
            inside: TempData::new("inside", hardware::TEMP_IN),
            outside: TempData::new("outside", hardware::TEMP_OUT),
            delta: None,
        }
    }

    pub fn update_delta(&mut self) {
        self.delta = if self.inside.is_valid() && self.outside.is_valid() {
            Some(self.inside.value - self.outside.value)
        } else {
            None
        };
    }

    pub fn delta_s(&self) -> String {
        match self.delta {
            Some(d) => format!("{d:.1}"),
            None => "-".into(),
        }
    }

    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.timestamp = now.timestamp();
        self.last_update = now.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    }

    pub fn set_uptime(&mut self, secs: u32) {
        self.uptime = secs;
        self.uptime_s = uptime_string(secs);
    }
}

impl Default for TempValues {
    fn default() -> Self {
        Self::new()
    }
}

// Monotonic uptime, independent of how late the polling task wakes up.
#[derive(Clone, Copy, Debug)]
pub struct UptimeClock {
    started: std::time::Instant,
}

impl UptimeClock {
    pub fn new() -> Self {
        Self::since(std::time::Instant::now())
    }

    pub fn since(started: std::time::Instant) -> Self {
        Self { started }
    }

    pub fn secs(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_secs()).unwrap_or(u32::MAX)
    }
}

impl Default for UptimeClock {
    fn default() -> Self {
        Self::new()
    }
}

pub fn uptime_string(secs: u32) -> String {
    let (d, rem) = (secs / 86400, secs % 86400);
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    if d > 0 {
        format!("{d}d {h:02}:{m:02}:{s:02}")
    } else {
        format!("{h:02}:{m:02}:{s:02}")
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Uptime {
    pub uptime: u32,
    pub uptime_s: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFirmware {
    pub url: String,
}

#[derive(Template)]
#[template(path = "index.html.ask", escape = "html")]
pub struct IndexPage<'a> {
    pub myid: &'a str,
    pub fw_version: &'a str,
    pub ota_slot: &'a str,
    pub config: &'a AirKitConfig,
    pub temps: &'a TempValues,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_delta_needs_both_readings() {
        let mut t = TempValues::new();
        t.update_delta();
        assert_eq!(t.delta, None);
        assert_eq!(t.delta_s(), "-");

        t.inside.value = 21.5;
        t.update_delta();
        assert_eq!(t.delta, None);

        t.outside.value = -3.5;
        t.update_delta();
        assert_eq!(t.delta, Some(25.0));
        assert_eq!(t.delta_s(), "25.0");
    }

    #[test]
    fn test_buses_are_named_by_pin() {
        let t = TempValues::new();
        assert_eq!(t.inside.iopin, "gpio12");
        assert_eq!(t.outside.iopin, "gpio13");
        assert!(!t.inside.is_valid());
        assert_eq!(t.inside.value_s(), "-");
    }

    #[test]
    fn test_uptime_string() {
        assert_eq!(uptime_string(0), "00:00:00");
        assert_eq!(uptime_string(3661), "01:01:01");
        assert_eq!(uptime_string(2 * 86400 + 5), "2d 00:00:05");
    }

    #[test]
    fn test_uptime_follows_elapsed_time() {
        let started = std::time::Instant::now()
            .checked_sub(std::time::Duration::from_secs(90))
            .unwrap();
        let clock = UptimeClock::since(started);
        let secs = clock.secs();
        assert!((90..95).contains(&secs), "uptime {secs}");

        let mut t = TempValues::new();
        t.set_uptime(secs);
        assert!(t.uptime_s.starts_with("00:01:3"));
    }

    #[test]
    fn test_stamp() {
        let mut t = TempValues::new();
        t.stamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(t.timestamp, 1_704_164_645);
        assert_eq!(t.last_update, "2024-01-02 03:04:05 UTC");
    }

    #[test]
    fn test_index_page_escapes_config() {
        let config = AirKitConfig {
            ssid: fixed_text("<attic>"),
            ..Default::default()
        };
        let mut temps = TempValues::new();
        temps.inside.value = 20.0;
        let page = IndexPage {
            myid: "airkit-00:00:00:00:00:00",
            fw_version: FW_VERSION,
            ota_slot: "ota_0",
            config: &config,
            temps: &temps,
        }
        .render()
        .unwrap();
        assert!(!page.contains("<attic>"));
        assert!(page.contains("&#60;attic&#62;") || page.contains("&lt;attic&gt;"));
        assert!(page.contains("20.0"));
        assert!(page.contains("airkit-00:00:00:00:00:00"));
    }
}

// EOF
