// layout.rs

use std::{fmt, ops::Range};

pub const EEPROM_SIZE: usize = 1024;

pub const TEXT_CAPACITY: usize = 32;

pub const EE_ADDR_SSID: usize = 0;
pub const EE_SIZE_SSID: usize = TEXT_CAPACITY;
pub const EE_ADDR_PASS: usize = 32;
pub const EE_SIZE_PASS: usize = TEXT_CAPACITY;
pub const EE_ADDR_TSAPI: usize = 64;
pub const EE_SIZE_TSAPI: usize = TEXT_CAPACITY;
pub const EE_ADDR_DELTA_ON: usize = 510;
pub const EE_ADDR_DELTA_OFF: usize = 511;
pub const EE_ADDR_SMODE: usize = 512;

// bytes 96..510 are reserved
pub const RESERVED_START: usize = EE_ADDR_TSAPI + EE_SIZE_TSAPI;
pub const RESERVED_END: usize = EE_ADDR_DELTA_ON;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Ssid,
    Password,
    ThingspeakApi,
    DeltaOn,
    DeltaOff,
    Smode,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Ssid,
        Field::Password,
        Field::ThingspeakApi,
        Field::DeltaOn,
        Field::DeltaOff,
        Field::Smode,
    ];

    pub const fn addr(self) -> usize {
        match self {
            Field::Ssid => EE_ADDR_SSID,
            Field::Password => EE_ADDR_PASS,
            Field::ThingspeakApi => EE_ADDR_TSAPI,
            Field::DeltaOn => EE_ADDR_DELTA_ON,
            Field::DeltaOff => EE_ADDR_DELTA_OFF,
            Field::Smode => EE_ADDR_SMODE,
        }
    }

    pub const fn size(self) -> usize {
        match self {
            Field::Ssid => EE_SIZE_SSID,
            Field::Password => EE_SIZE_PASS,
            Field::ThingspeakApi => EE_SIZE_TSAPI,
            Field::DeltaOn | Field::DeltaOff | Field::Smode => 1,
        }
    }

    pub const fn is_text(self) -> bool {
        matches!(self, Field::Ssid | Field::Password | Field::ThingspeakApi)
    }

    pub fn range(self) -> Range<usize> {
        self.addr()..self.addr() + self.size()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Field::Ssid => "ssid",
            Field::Password => "password",
            Field::ThingspeakApi => "thingspeak_api",
            Field::DeltaOn => "delta_on",
            Field::DeltaOff => "delta_off",
            Field::Smode => "smode",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fails with the first field that overlaps another or does not fit.
pub fn check_layout(capacity: usize) -> Result<(), (Field, Option<Field>)> {
    for (i, a) in Field::ALL.iter().enumerate() {
        if a.range().end > capacity {
            return Err((*a, None));
        }
        for b in &Field::ALL[i + 1..] {
            let (ra, rb) = (a.range(), b.range());
            if ra.start < rb.end && rb.start < ra.end {
                return Err((*a, Some(*b)));
            }
        }
    }
    Ok(())
}


// EOF
