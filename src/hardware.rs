// hardware.rs
//! Board wiring and timer periods.

use std::time::Duration;

// leds
pub const BLUE_LED: i32 = 2; // also used by the wifi module on some boards
pub const RED_LED: i32 = 0;

// outputs
pub const FAN: i32 = 16;

// one-wire buses
pub const TEMP_IN: i32 = 12;
pub const TEMP_OUT: i32 = 13;

pub const TIMER1: Duration = Duration::from_secs(1);
pub const TIMER2: Duration = Duration::from_secs(30);
pub const TIMER3: Duration = Duration::from_secs(5 * 60);

pub fn gpio_name(pin: i32) -> String {
    format!("gpio{pin}")
}


// EOF
