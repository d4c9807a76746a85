// measure.rs

use embedded_hal::digital::{InputPin, OutputPin};
use esp_idf_hal::{
    delay::{Ets, FreeRtos},
    gpio::{PinDriver, Pull},
};
use one_wire_bus::{Address, OneWire, OneWireError, SearchState};
use tokio::time::MissedTickBehavior;

use crate::*;

#[derive(Debug)]
pub struct Measurement {
    pub device_id: String,
    pub temperature: f32,
}

/// Lists the device addresses answering on a bus.
pub fn scan_bus<P, E>(one_wire_bus: &mut OneWire<P>) -> Result<Vec<Address>, MeasurementError<E>>
where
    P: OutputPin<Error = E> + InputPin<Error = E>,
{
    let mut found = Vec::new();
    let mut st: SearchState;
    let mut state = None;

    while let Some((device_address, s)) = one_wire_bus.device_search(state, false, &mut Ets)? {
        found.push(device_address);
        st = s;
        state = Some(&st);
    }

    if found.is_empty() {
        Err(MeasurementError::NoDeviceFound)
    } else {
        Ok(found)
    }
}

/// Converts and reads every DS18B20 on the bus.
pub fn measure_temperature<P, E>(
    one_wire_bus: &mut OneWire<P>,
) -> Result<Vec<Measurement>, MeasurementError<E>>
where
    P: OutputPin<Error = E> + InputPin<Error = E>,
{
    ds18b20::start_simultaneous_temp_measurement(one_wire_bus, &mut Ets)?;
    ds18b20::Resolution::Bits12.delay_for_measurement_time(&mut FreeRtos);

    let mut meas = Vec::new();
    let mut st: SearchState;
    let mut state = None;

    while let Some((device_address, s)) = one_wire_bus.device_search(state, false, &mut Ets)? {
        FreeRtos::delay_ms(100);

        let sensor = ds18b20::Ds18b20::new::<E>(device_address)?;
        let sensor_data = sensor.read_data(one_wire_bus, &mut Ets)?;
        meas.push(Measurement {
            device_id: format!("{device_address:?}"),
            temperature: sensor_data.temperature,
        });
        st = s;
        state = Some(&st);
    }

    if meas.is_empty() {
        Err(MeasurementError::NoDeviceFound)
    } else {
        Ok(meas)
    }
}

/// One reading from the first sensor on `bus`.
pub fn read_bus(bus: &mut TempBus) -> anyhow::Result<Measurement> {
    let mut pin_drv = PinDriver::input_output_od(&mut bus.pin)?;
    pin_drv.set_pull(Pull::Up)?;
    let mut w = match OneWire::new(pin_drv) {
        Ok(w) => w,
        Err(e) => bail!("{} bus init failed: {e:?}", bus.name),
    };
    match measure_temperature(&mut w) {
        Ok(meas) => meas
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("{} bus returned nothing", bus.name)),
        Err(e) => bail!("{} bus read failed: {e:?}", bus.name),
    }
}

/// Logs the sensors found on `bus` at boot.
pub fn probe_bus(bus: &mut TempBus) -> anyhow::Result<usize> {
    let mut pin_drv = PinDriver::input_output_od(&mut bus.pin)?;
    pin_drv.set_pull(Pull::Up)?;
    let mut w = match OneWire::new(pin_drv) {
        Ok(w) => w,
        Err(e) => bail!("{} bus init failed: {e:?}", bus.name),
    };
    match scan_bus(&mut w) {
        Ok(devs) => {
            info!("Onewire response on {} bus:\n{devs:#?}", bus.name);
            if devs.len() > 1 {
                warn!("{} bus has {} sensors, using the first one", bus.name, devs.len());
            }
            Ok(devs.len())
        }
        Err(e) => bail!("{} bus scan failed: {e:?}", bus.name),
    }
}

pub async fn poll_sensors(state: Arc<Pin<Box<AirKitState>>>) -> anyhow::Result<()> {
    // period includes the blocking bus reads
    let mut tick = tokio::time::interval(hardware::TIMER2);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;

        let inside = read_bus(&mut *state.inside.write().await);
        let outside = read_bus(&mut *state.outside.write().await);
        let failed = inside.is_err() || outside.is_err();

        {
            let mut guard = state.data.write().await;
            let data = &mut *guard;
            for (slot, res) in [(&mut data.inside, inside), (&mut data.outside, outside)] {
                match res {
                    Ok(m) => {
                        slot.sensor = m.device_id;
                        slot.value = m.temperature;
                    }
                    Err(e) => {
                        error!("{e:#}");
                        slot.value = NO_TEMP;
                    }
                }
            }
            data.update_delta();
            data.stamp(chrono::Utc::now());
            info!(
                "Temperatures: inside {} outside {} delta {}",
                data.inside.value_s(),
                data.outside.value_s(),
                data.delta_s()
            );
        }
        state.leds.write().await.sensor_error(failed);
    }
}

// When performing a measurement it can happen that no device was found on the one-wire-bus
// in addition to the bus errors. Therefore we extend the error cases for proper error handling.
#[derive(Debug)]
pub enum MeasurementError<E> {
    OneWireError(OneWireError<E>),
    NoDeviceFound,
}

impl<E> From<OneWireError<E>> for MeasurementError<E> {
    fn from(value: OneWireError<E>) -> Self {
        MeasurementError::OneWireError(value)
    }
}

// EOF
