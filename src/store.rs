// store.rs

use std::fmt;

use log::*;

use crate::{
    config::{AirKitConfig, ConfigError, Season, Text},
    eeprom::{Eeprom, EepromError, ERASED},
    layout::{self, Field, TEXT_CAPACITY},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    Eeprom(EepromError),
    Blank,
    Text(Field),
    Invalid(ConfigError),
    TooSmall(usize),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Eeprom(e) => write!(f, "{e}"),
            StoreError::Blank => f.write_str("no config saved yet"),
            StoreError::Text(field) => write!(f, "{field} is not ASCII text"),
            StoreError::Invalid(e) => write!(f, "invalid config: {e}"),
            StoreError::TooSmall(sz) => write!(f, "storage of {sz} bytes cannot hold the config"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<EepromError> for StoreError {
    fn from(value: EepromError) -> Self {
        StoreError::Eeprom(value)
    }
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        StoreError::Invalid(value)
    }
}

/// Reads and writes `AirKitConfig` at its fixed EEPROM offsets.
pub struct ConfigStore<E> {
    eeprom: E,
}

impl<E: Eeprom> ConfigStore<E> {
    pub fn new(eeprom: E) -> Result<Self, StoreError> {
        if let Err((field, _)) = layout::check_layout(eeprom.capacity()) {
            error!("Field {field} does not fit in {sz} bytes", sz = eeprom.capacity());
            return Err(StoreError::TooSmall(eeprom.capacity()));
        }
        Ok(Self { eeprom })
    }

    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    pub fn into_inner(self) -> E {
        self.eeprom
    }

    pub fn load(&self) -> Result<AirKitConfig, StoreError> {
        info!("Reading config from eeprom...");
        if self.is_blank()? {
            return Err(StoreError::Blank);
        }

        let config = AirKitConfig {
            mac: 0,
            ssid: self.read_text(Field::Ssid)?,
            password: self.read_text(Field::Password)?,
            thingspeak_api: self.read_text(Field::ThingspeakApi)?,
            delta_on: self.eeprom.read_byte(Field::DeltaOn.addr())?,
            delta_off: self.eeprom.read_byte(Field::DeltaOff.addr())?,
            season: Season::from_byte(self.eeprom.read_byte(Field::Smode.addr())?),
        };
        config.validate()?;

        info!("Successfully parsed config from eeprom.");
        Ok(config)
    }

    pub fn save(&mut self, config: &AirKitConfig) -> Result<(), StoreError> {
        config.validate()?;

        self.write_text(Field::Ssid, &config.ssid)?;
        self.write_text(Field::Password, &config.password)?;
        self.write_text(Field::ThingspeakApi, &config.thingspeak_api)?;
        self.eeprom
            .write_byte(Field::DeltaOn.addr(), config.delta_on)?;
        self.eeprom
            .write_byte(Field::DeltaOff.addr(), config.delta_off)?;
        self.eeprom
            .write_byte(Field::Smode.addr(), config.season.as_byte())?;

        self.eeprom.commit()?;
        info!("Config saved.");
        Ok(())
    }

    /// Reads what is still usable and puts defaults in place of broken fields.
    /// Returns the fields that were replaced; only storage errors fail.
    pub fn recover(&self) -> Result<(AirKitConfig, Vec<Field>), StoreError> {
        let mut config = AirKitConfig::default();
        if self.is_blank()? {
            return Ok((config, Field::ALL.to_vec()));
        }

        let mut repaired = Vec::new();
        for field in [Field::Ssid, Field::Password, Field::ThingspeakApi] {
            let text = match self.read_text(field) {
                Ok(t) => t,
                Err(StoreError::Text(_)) => {
                    repaired.push(field);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match field {
                Field::Ssid => config.ssid = text,
                Field::Password => config.password = text,
                _ => config.thingspeak_api = text,
            }
        }

        let delta_on = self.eeprom.read_byte(Field::DeltaOn.addr())?;
        let delta_off = self.eeprom.read_byte(Field::DeltaOff.addr())?;
        if delta_off <= delta_on {
            config.delta_on = delta_on;
            config.delta_off = delta_off;
        } else {
            warn!("Stored hysteresis {delta_on}/{delta_off} is inverted");
            repaired.extend([Field::DeltaOn, Field::DeltaOff]);
        }
        config.season = Season::from_byte(self.eeprom.read_byte(Field::Smode.addr())?);

        Ok((config, repaired))
    }

    /// Overwrites the stored record with the compiled-in defaults.
    pub fn reset(&mut self) -> Result<AirKitConfig, StoreError> {
        let config = AirKitConfig::default();
        self.save(&config)?;
        Ok(config)
    }

    fn is_blank(&self) -> Result<bool, StoreError> {
        let mut buf = [0u8; TEXT_CAPACITY];
        for field in Field::ALL {
            let region = &mut buf[..field.size()];
            self.eeprom.read(field.addr(), region)?;
            if region.iter().any(|b| *b != ERASED) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn read_text(&self, field: Field) -> Result<Text, StoreError> {
        let mut buf = [0u8; TEXT_CAPACITY];
        self.eeprom.read(field.addr(), &mut buf)?;
        decode_text(&buf).ok_or(StoreError::Text(field))
    }

    fn write_text(&mut self, field: Field, text: &str) -> Result<(), StoreError> {
        self.eeprom.write(field.addr(), &encode_text(text))?;
        Ok(())
    }
}

pub fn encode_text(text: &str) -> [u8; TEXT_CAPACITY] {
    let mut buf = [0u8; TEXT_CAPACITY];
    let n = text.len().min(TEXT_CAPACITY);
    buf[..n].copy_from_slice(&text.as_bytes()[..n]);
    buf
}

pub fn decode_text(region: &[u8]) -> Option<Text> {
    let end = region.iter().position(|b| *b == 0).unwrap_or(region.len());
    let bytes = &region[..end];
    if !bytes.is_ascii() {
        return None;
    }
    let mut t = Text::new();
    t.push_str(std::str::from_utf8(bytes).ok()?).ok()?;
    Some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{fixed_text, DEFAULT_DELTA_OFF, DEFAULT_DELTA_ON},
        eeprom::MemEeprom,
        layout::*,
    };
    use proptest::prelude::*;

    fn sample() -> AirKitConfig {
        AirKitConfig {
            mac: 0,
            ssid: fixed_text("attic"),
            password: fixed_text("hunter22"),
            thingspeak_api: fixed_text("0123456789ABCDEF"),
            delta_on: 6,
            delta_off: 3,
            season: Season::Summer,
        }
    }

    #[test]
    fn test_save_then_load() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
        assert_eq!(store.eeprom().commits(), 1);
    }

    #[test]
    fn test_bytes_land_at_documented_offsets() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&sample()).unwrap();
        let img = store.eeprom().as_bytes();

        assert_eq!(&img[EE_ADDR_SSID..EE_ADDR_SSID + 6], b"attic\0");
        assert_eq!(&img[EE_ADDR_PASS..EE_ADDR_PASS + 9], b"hunter22\0");
        assert_eq!(&img[EE_ADDR_TSAPI..EE_ADDR_TSAPI + 16], b"0123456789ABCDEF");
        assert!(img[EE_ADDR_TSAPI + 16..EE_ADDR_TSAPI + EE_SIZE_TSAPI]
            .iter()
            .all(|b| *b == 0));
        assert_eq!(img[EE_ADDR_DELTA_ON], 6);
        assert_eq!(img[EE_ADDR_DELTA_OFF], 3);
        assert_eq!(img[EE_ADDR_SMODE], 1);
    }

    #[test]
    fn test_save_leaves_reserved_gap_alone() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&sample()).unwrap();
        let img = store.eeprom().as_bytes();
        assert!(img[RESERVED_START..RESERVED_END].iter().all(|b| *b == ERASED));
        assert!(img[EE_ADDR_SMODE + 1..].iter().all(|b| *b == ERASED));
    }

    #[test]
    fn test_full_width_text_has_no_terminator() {
        let mut c = sample();
        c.ssid = fixed_text(&"S".repeat(TEXT_CAPACITY));
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&c).unwrap();

        let img = store.eeprom().as_bytes();
        assert!(img[EE_ADDR_SSID..EE_ADDR_SSID + EE_SIZE_SSID]
            .iter()
            .all(|b| *b == b'S'));
        assert_eq!(store.load().unwrap().ssid.len(), TEXT_CAPACITY);
    }

    #[test]
    fn test_erased_storage_is_blank() {
        let store = ConfigStore::new(MemEeprom::default()).unwrap();
        assert_eq!(store.load(), Err(StoreError::Blank));
    }

    #[test]
    fn test_garbage_text_is_rejected() {
        let mut ee = MemEeprom::default();
        ee.write(EE_ADDR_SSID, b"ok\0").unwrap();
        ee.write(EE_ADDR_PASS, &[0xC3, 0xA4, 0]).unwrap();
        let store = ConfigStore::new(ee).unwrap();
        assert_eq!(store.load(), Err(StoreError::Text(Field::Password)));
    }

    #[test]
    fn test_inverted_hysteresis_is_not_loaded() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&sample()).unwrap();

        let mut ee = store.into_inner();
        ee.write_byte(EE_ADDR_DELTA_OFF, 9).unwrap();
        let store = ConfigStore::new(ee).unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::Invalid(ConfigError::Hysteresis { .. }))
        ));
    }

    #[test]
    fn test_recover_keeps_credentials_when_deltas_break() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&sample()).unwrap();

        let mut ee = store.into_inner();
        ee.write_byte(EE_ADDR_DELTA_OFF, 0xFF).unwrap();
        let store = ConfigStore::new(ee).unwrap();
        assert!(store.load().is_err());

        let (c, repaired) = store.recover().unwrap();
        assert_eq!(repaired, vec![Field::DeltaOn, Field::DeltaOff]);
        assert_eq!(c.ssid.as_str(), "attic");
        assert_eq!(c.password.as_str(), "hunter22");
        assert_eq!(c.thingspeak_api.as_str(), "0123456789ABCDEF");
        assert_eq!((c.delta_on, c.delta_off), (DEFAULT_DELTA_ON, DEFAULT_DELTA_OFF));
        assert_eq!(c.season, Season::Summer);
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn test_recover_replaces_only_the_broken_text() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&sample()).unwrap();

        let mut ee = store.into_inner();
        ee.write_byte(EE_ADDR_TSAPI + 3, 0xA4).unwrap();
        let mut store = ConfigStore::new(ee).unwrap();
        assert_eq!(store.load(), Err(StoreError::Text(Field::ThingspeakApi)));

        let (c, repaired) = store.recover().unwrap();
        assert_eq!(repaired, vec![Field::ThingspeakApi]);
        assert_eq!(c.ssid.as_str(), "attic");
        assert_eq!(c.password.as_str(), "hunter22");
        assert_eq!(c.thingspeak_api, AirKitConfig::default().thingspeak_api);
        assert_eq!((c.delta_on, c.delta_off), (6, 3));

        // writing the repaired record back makes it load cleanly
        store.save(&c).unwrap();
        assert_eq!(store.load().unwrap(), c);
    }

    #[test]
    fn test_recover_blank_gives_defaults() {
        let store = ConfigStore::new(MemEeprom::default()).unwrap();
        let (c, repaired) = store.recover().unwrap();
        assert_eq!(c, AirKitConfig::default());
        assert_eq!(repaired, Field::ALL.to_vec());
    }

    #[test]
    fn test_invalid_config_is_not_saved() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        let mut c = sample();
        c.delta_off = c.delta_on + 1;
        assert!(store.save(&c).is_err());
        assert_eq!(store.eeprom().commits(), 0);
        assert_eq!(store.load(), Err(StoreError::Blank));
    }

    #[test]
    fn test_reset_writes_defaults() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        store.save(&sample()).unwrap();
        let c = store.reset().unwrap();
        assert_eq!(c, AirKitConfig::default());
        assert_eq!(store.load().unwrap(), AirKitConfig::default());
    }

    #[test]
    fn test_mac_is_not_persisted() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        let mut c = sample();
        c.set_mac([1, 2, 3, 4, 5, 6]);
        store.save(&c).unwrap();
        assert_eq!(store.load().unwrap().mac, 0);
    }

    #[test]
    fn test_small_eeprom_is_refused() {
        assert!(matches!(
            ConfigStore::new(MemEeprom::new(512)),
            Err(StoreError::TooSmall(512))
        ));
    }

    #[test]
    fn test_nonzero_smode_reads_as_summer() {
        let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
        let mut c = sample();
        c.season = Season::Winter;
        store.save(&c).unwrap();

        let mut ee = store.into_inner();
        ee.write_byte(EE_ADDR_SMODE, 0x80).unwrap();
        let store = ConfigStore::new(ee).unwrap();
        assert_eq!(store.load().unwrap().season, Season::Summer);
    }

    #[test]
    fn test_decode_text_stops_at_nul() {
        assert_eq!(decode_text(b"abc\0def").unwrap().as_str(), "abc");
        assert_eq!(decode_text(b"").unwrap().as_str(), "");
        assert!(decode_text(&[0xFF, 0]).is_none());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            ssid in "[ -~]{0,32}",
            pass in "[ -~]{0,32}",
            api in "[0-9A-Z]{0,32}",
            delta_off in 0u8..=255,
            extra in 0u8..=255,
            summer in any::<bool>(),
        ) {
            let c = AirKitConfig {
                mac: 0,
                ssid: fixed_text(&ssid),
                password: fixed_text(&pass),
                thingspeak_api: fixed_text(&api),
                delta_on: delta_off.saturating_add(extra),
                delta_off,
                season: Season::from(summer),
            };
            let mut store = ConfigStore::new(MemEeprom::default()).unwrap();
            store.save(&c).unwrap();
            let back = store.load().unwrap();
            prop_assert_eq!(back.ssid.as_str(), ssid.as_str());
            prop_assert_eq!(back.password.as_str(), pass.as_str());
            prop_assert_eq!(back.thingspeak_api.as_str(), api.as_str());
            prop_assert_eq!(back, c);
        }
    }
}

// EOF
