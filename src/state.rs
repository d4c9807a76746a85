// state.rs

use crate::*;

use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Output, PinDriver};

pub struct TempBus {
    pub pin: AnyIOPin,
    pub name: &'static str,
}
unsafe impl Send for TempBus {}
unsafe impl Sync for TempBus {}

pub struct Leds {
    pub blue: PinDriver<'static, AnyOutputPin, Output>,
    pub red: PinDriver<'static, AnyOutputPin, Output>,
}
unsafe impl Send for Leds {}
unsafe impl Sync for Leds {}

impl Leds {
    pub fn wifi_up(&mut self, up: bool) {
        if let Err(e) = self.blue.set_level(up.into()) {
            error!("Blue led error: {e:?}");
        }
    }

    pub fn sensor_error(&mut self, failed: bool) {
        if let Err(e) = self.red.set_level(failed.into()) {
            error!("Red led error: {e:?}");
        }
    }
}

pub struct AirKitState {
    pub ota_slot: String,
    pub config: RwLock<AirKitConfig>,
    pub store: RwLock<ConfigStore<NvsEeprom>>,
    pub clock: UptimeClock,
    pub uptime: RwLock<u32>,
    pub api_cnt: AtomicU32,
    pub wifi_up: RwLock<bool>,
    pub if_index: RwLock<u32>,
    pub ip_addr: RwLock<net::Ipv4Addr>,
    pub ping_ip: RwLock<Option<net::Ipv4Addr>>,
    pub myid: RwLock<String>,
    pub inside: RwLock<TempBus>,
    pub outside: RwLock<TempBus>,
    pub leds: RwLock<Leds>,
    pub data: RwLock<TempValues>,
    pub reset: RwLock<bool>,
}

impl AirKitState {
    pub fn new(
        config: AirKitConfig,
        store: ConfigStore<NvsEeprom>,
        inside: TempBus,
        outside: TempBus,
        leds: Leds,
        ota_slot: String,
    ) -> Self {
        AirKitState {
            ota_slot,
            config: RwLock::new(config),
            store: RwLock::new(store),
            clock: UptimeClock::new(),
            uptime: RwLock::new(0),
            api_cnt: AtomicU32::new(0),
            wifi_up: RwLock::new(false),
            if_index: RwLock::new(0),
            ip_addr: RwLock::new(net::Ipv4Addr::new(0, 0, 0, 0)),
            ping_ip: RwLock::new(None),
            myid: RwLock::new("airkit".into()),
            inside: RwLock::new(inside),
            outside: RwLock::new(outside),
            leds: RwLock::new(leds),
            data: RwLock::new(TempValues::new()),
            reset: RwLock::new(false),
        }
    }
}

// EOF
