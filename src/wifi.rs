// wifi.rs

use anyhow::{anyhow, bail};
use embedded_svc::wifi::{ClientConfiguration, Configuration};
use esp_idf_svc::{
    eventloop::{EspEventLoop, System},
    netif::{self, EspNetif},
    timer::{EspTimerService, Task},
    wifi::{AsyncWifi, EspWifi, WifiDriver},
};
use log::*;

use crate::*;

pub struct WifiLoop<'a> {
    pub state: Arc<Pin<Box<AirKitState>>>,
    pub wifi: Option<AsyncWifi<EspWifi<'a>>>,
}

impl<'a> WifiLoop<'a> {
    pub async fn run(
        mut self,
        wifidriver: WifiDriver<'a>,
        sysloop: EspEventLoop<System>,
        timer: EspTimerService<Task>,
    ) -> anyhow::Result<()> {
        info!("Initializing Wi-Fi...");

        let net_if = EspNetif::new(netif::NetifStack::Sta)?;
        let mac = net_if.get_mac()?;
        {
            let mut config = self.state.config.write().await;
            config.set_mac(mac);
            *self.state.myid.write().await = config.device_id();
        }
        info!("My id is {}", self.state.myid.read().await);

        let espwifi = EspWifi::wrap_all(wifidriver, net_if, EspNetif::new(netif::NetifStack::Ap)?)?;
        self.wifi = Some(AsyncWifi::wrap(espwifi, sysloop, timer.clone())?);

        Box::pin(self.configure()).await?;

        if let Err(e) = Box::pin(self.initial_connect()).await {
            error!("WiFi connection failed: {e:?}");
            error!("Resetting...");
            sleep(Duration::from_secs(5)).await;
            esp_idf_hal::reset::restart();
        }

        sleep(Duration::from_secs(10)).await;

        let (if_index, ip_info) = {
            let netif = self.wifi()?.wifi().sta_netif();
            (netif.get_index(), netif.get_ip_info()?)
        };
        info!("WiFi got address {}", ip_info.ip);
        *self.state.if_index.write().await = if_index;
        *self.state.ip_addr.write().await = ip_info.ip;
        *self.state.ping_ip.write().await = Some(ip_info.subnet.gateway);
        *self.state.wifi_up.write().await = true;
        self.state.leds.write().await.wifi_up(true);

        self.stay_connected().await
    }

    fn wifi(&mut self) -> anyhow::Result<&mut AsyncWifi<EspWifi<'a>>> {
        self.wifi.as_mut().ok_or_else(|| anyhow!("WiFi not initialized"))
    }

    pub async fn configure(&mut self) -> anyhow::Result<()> {
        info!("WiFi setting credentials...");
        let (ssid, password) = {
            let config = self.state.config.read().await;
            (config.ssid.clone(), config.password.clone())
        };

        let client = ClientConfiguration {
            ssid: match ssid.as_str().try_into() {
                Ok(s) => s,
                Err(_) => bail!("SSID does not fit the driver"),
            },
            password: match password.as_str().try_into() {
                Ok(p) => p,
                Err(_) => bail!("Password does not fit the driver"),
            },
            ..Default::default()
        };

        let wifi = self.wifi()?;
        wifi.set_configuration(&Configuration::Client(client))?;

        info!("WiFi driver starting...");
        Ok(Box::pin(wifi.start()).await?)
    }

    pub async fn initial_connect(&mut self) -> anyhow::Result<()> {
        self.do_connect_loop(true).await
    }

    pub async fn stay_connected(mut self) -> anyhow::Result<()> {
        self.do_connect_loop(false).await
    }

    async fn do_connect_loop(&mut self, initial: bool) -> anyhow::Result<()> {
        let state = self.state.clone();
        let wifi = self.wifi()?;
        loop {
            // Wait for disconnect before trying to connect again.
            let timeout = if initial {
                Some(hardware::TIMER2)
            } else {
                None
            };
            Box::pin(wifi.wifi_wait(|w| w.is_up(), timeout)).await.ok();

            if !initial {
                *state.wifi_up.write().await = false;
                state.leds.write().await.wifi_up(false);
            }

            info!("WiFi connecting...");
            Box::pin(wifi.connect()).await.ok();

            info!("WiFi waiting for association...");
            if let Err(e) = Box::pin(wifi.ip_wait_while(|w| w.is_up().map(|s| !s), None)).await {
                error!("WiFi error: {e:?}");

                // only exit here if this is initial connection
                // otherwise, keep trying
                if initial {
                    bail!(e);
                }
                continue;
            }

            info!("WiFi connected.");
            if initial {
                return Ok(());
            }
            *state.wifi_up.write().await = true;
            state.leds.write().await.wifi_up(true);
        }
    }
}

// EOF
