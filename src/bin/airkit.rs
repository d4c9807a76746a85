// bin/airkit.rs

#![warn(clippy::large_futures)]

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::main()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("airkit firmware runs on esp-idf targets only.");
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::Arc;

    use airkit::*;
    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
    use esp_idf_hal::prelude::Peripherals;
    use esp_idf_svc::{
        eventloop::EspSystemEventLoop, nvs, ota::EspOta, ping, sntp::EspSntp,
        timer::EspTaskTimerService, wifi::WifiDriver,
    };
    use esp_idf_sys::{esp, esp_app_desc};
    use log::*;
    use tokio::time::sleep;

    esp_app_desc!();

    pub fn main() -> anyhow::Result<()> {
        esp_idf_sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();

        // eventfd is needed by our mio poll implementation.  Note you should set max_fds
        // higher if you have other code that may need eventfd.
        #[allow(clippy::needless_update)]
        let config = esp_idf_sys::esp_vfs_eventfd_config_t {
            max_fds: 1,
            ..Default::default()
        };
        esp! { unsafe { esp_idf_sys::esp_vfs_eventfd_register(&config) } }?;

        info!("Hello.");
        info!("Starting up airkit v{FW_VERSION}.");

        let sysloop = EspSystemEventLoop::take()?;
        let timer = EspTaskTimerService::new()?;
        let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

        let ns = env!("CARGO_BIN_NAME");
        let nvs = match nvs::EspNvs::new(nvs_default_partition.clone(), ns, true) {
            Ok(nvs) => {
                info!("Got namespace {ns:?} from default partition");
                nvs
            }
            Err(e) => bail!("Could not get namespace {ns}: {e:?}"),
        };
        let mut store = ConfigStore::new(NvsEeprom::open(nvs))?;

        #[cfg(feature = "reset_settings")]
        let config = store.reset()?;

        #[cfg(not(feature = "reset_settings"))]
        let config = match store.load() {
            // using settings saved on eeprom if we could find them
            Ok(c) => c,

            Err(StoreError::Blank) => {
                info!("No config on eeprom yet, using defaults");
                let c = store.reset()?;
                info!("Successfully saved default config to eeprom.");
                c
            }

            // keep whatever is still readable, e.g. wifi credentials
            Err(e) => {
                error!("Could not read eeprom config ({e}), repairing");
                let (c, repaired) = store.recover()?;
                warn!("Replaced with defaults: {repaired:?}");
                store.save(&c)?;
                c
            }
        };
        info!("My config:\n{config:#?}");

        let ota_slot = {
            let running = EspOta::new()?.get_running_slot()?;
            format!("{} ({:?})", running.label, running.state)
        };
        info!("Running from OTA slot {ota_slot}");

        let peripherals = Peripherals::take()?;

        // the board wiring is given as plain gpio numbers, each claimed exactly once here
        let (mut fan, blue, red, inside_pin, outside_pin) = unsafe {
            (
                PinDriver::output(AnyOutputPin::new(hardware::FAN))?,
                PinDriver::output(AnyOutputPin::new(hardware::BLUE_LED))?,
                PinDriver::output(AnyOutputPin::new(hardware::RED_LED))?,
                AnyIOPin::new(hardware::TEMP_IN),
                AnyIOPin::new(hardware::TEMP_OUT),
            )
        };
        // no control loop drives the fan, keep it off
        fan.set_low()?;
        let mut leds = Leds { blue, red };
        leds.wifi_up(false);
        leds.sensor_error(false);

        info!("Scanning 1-wire devices...");
        let mut inside = TempBus {
            pin: inside_pin,
            name: "inside",
        };
        let mut outside = TempBus {
            pin: outside_pin,
            name: "outside",
        };
        for bus in [&mut inside, &mut outside] {
            if let Err(e) = probe_bus(bus) {
                error!("{e:#}");
            }
        }

        let wifidriver = WifiDriver::new(
            peripherals.modem,
            sysloop.clone(),
            Some(nvs_default_partition),
        )?;
        let _sntp = EspSntp::new_default()?;

        let state = Box::pin(AirKitState::new(
            config, store, inside, outside, leds, ota_slot,
        ));
        let shared_state = Arc::new(state);

        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(Box::pin(async move {
                let wifi_loop = WifiLoop {
                    state: shared_state.clone(),
                    wifi: None,
                };

                info!("Entering main loop...");
                tokio::select! {
                    _ = Box::pin(poll_reset(shared_state.clone())) => { error!("poll_reset() ended."); }
                    _ = Box::pin(poll_sensors(shared_state.clone())) => { error!("poll_sensors() ended."); }
                    _ = Box::pin(run_api_server(shared_state.clone())) => { error!("run_api_server() ended."); }
                    _ = Box::pin(wifi_loop.run(wifidriver, sysloop, timer)) => { error!("wifi_loop.run() ended."); }
                    _ = Box::pin(pinger(shared_state.clone())) => { error!("pinger() ended."); }
                };
            }));

        // not actually returning from main() but we reboot instead
        info!("main() finished, reboot.");
        drop(fan);
        FreeRtos::delay_ms(3000);
        esp_idf_hal::reset::restart();
    }

    async fn poll_reset(state: Arc<Pin<Box<AirKitState>>>) -> anyhow::Result<()> {
        loop {
            sleep(hardware::TIMER1).await;

            let uptime = state.clock.secs();
            *(state.uptime.write().await) = uptime;
            state.data.write().await.set_uptime(uptime);

            if *state.reset.read().await {
                sleep(Duration::from_millis(2000)).await;
                esp_idf_hal::reset::restart();
            }
        }
    }

    // reboot when the gateway stops answering
    async fn pinger(state: Arc<Pin<Box<AirKitState>>>) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(hardware::TIMER3);
        // first tick fires at once, give wifi a full period to come up
        tick.tick().await;

        loop {
            tick.tick().await;

            let Some(gateway) = *state.ping_ip.read().await else {
                debug!("No gateway yet, skipping ping");
                continue;
            };
            let if_idx = *state.if_index.read().await;
            if if_idx == 0 {
                warn!("Gateway {gateway} known but no interface index");
                continue;
            }

            if !gateway_alive(if_idx, gateway)? {
                error!("Gateway {gateway} did not answer, rebooting.");
                sleep(Duration::from_millis(2000)).await;
                esp_idf_hal::reset::restart();
            }
        }
    }

    fn gateway_alive(if_idx: u32, gateway: net::Ipv4Addr) -> anyhow::Result<bool> {
        let conf = ping::Configuration {
            count: 3,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            data_size: 64,
            tos: 0,
        };
        let summary = ping::EspPing::new(if_idx).ping(gateway, &conf)?;
        info!(
            "Ping {gateway}: {}/{} replies",
            summary.received, summary.transmitted
        );
        Ok(summary.received > 0)
    }
}

// EOF
