use std::{
    thread,
    time::{Duration, Instant},
};
use anyhow::anyhow;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    espnow::{EspNow, PeerInfo},
    hal::{
        adc::{attenuation::DB_11,
              oneshot::{AdcChannelDriver, AdcDriver, config::AdcChannelConfig}
        },
        gpio::{PinDriver, Pull},
        peripherals::Peripherals,
    },
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};
use log::*;

use crate::{
    input::{Reading, Tolerance, Wiring},
    link::{self, LinkMode, MacAddr, SendTracker},
};

// Access point the lights host opens so controllers can find it
const LIGHTS_HOST_SSID: &str = env!("LIGHTS_HOST_SSID");
const LIGHTS_HOST_PASSWORD: &str = env!("LIGHTS_HOST_PASSWORD");

const FRAME_INTERVAL: Duration = Duration::from_millis(10);
const DEBUG_LOG_INTERVAL: Duration = Duration::from_secs(1);

// Pin definitions based on current hardware: Seeed Studio XIAO ESP32C3
// A0 (GPIO2) = X axis, A1 (GPIO3) = Y axis, A2 (GPIO4) = button
pub fn run() -> anyhow::Result<()> {
    //============================================================================================//
    // PHASE 0 - Initialization                                                                   //
    //============================================================================================//

    let peripherals = Peripherals::take()?;
    let event_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, event_loop.clone(), Some(nvs))?,
        event_loop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
    wifi.start()?;
    info!("station mac address {}", MacAddr(wifi.wifi().sta_netif().get_mac()?));

    let adc_config = AdcChannelConfig {
        attenuation: DB_11,
        calibration: true,
        ..Default::default()
    };
    let adc = AdcDriver::new(peripherals.adc1)?;
    let mut x_pin = AdcChannelDriver::new(&adc, peripherals.pins.gpio2, &adc_config)?;
    let mut y_pin = AdcChannelDriver::new(&adc, peripherals.pins.gpio3, &adc_config)?;

    let mut button = PinDriver::input(peripherals.pins.gpio4)?;
    button.set_pull(Pull::Up)?;

    let wiring = Wiring::BUILD;
    let tolerance = Tolerance::from_config(
        option_env!("AXIS_TOLERANCE_LOWER"),
        option_env!("AXIS_TOLERANCE_UPPER"),
    )?;
    info!("setup complete, wiring {wiring:?}");

    let mut mode = LinkMode::Disconnected;
    let mut esp_now: Option<(EspNow<'static>, MacAddr)> = None;
    let mut sends = SendTracker::default();
    let mut last_debug_log = Instant::now();

    loop {
        if mode == LinkMode::Failed {
            error!("failed");
            thread::sleep(Duration::from_secs(1));
            continue;
        }

        if mode == LinkMode::Disconnected {
            //====================================================================================//
            // PHASE 1 - Find the lights host                                                     //
            //====================================================================================//
            let search = find_lights_host(&mut wifi);
            let Some(peer) = link::logged(search, "lights host search").flatten() else {
                continue;
            };

            info!("sleeping for 5 seconds before initializing esp-now");
            thread::sleep(Duration::from_secs(5));

            match start_esp_now(peer) {
                Ok(sender) => {
                    esp_now = Some((sender, peer));
                    sends.reset();
                    mode = LinkMode::Connected;
                }
                Err(e) => {
                    error!("unable to start esp-now: {e}");
                    mode = LinkMode::Failed;
                }
            }
            continue;
        }

        let Some((sender, peer)) = esp_now.as_ref() else {
            mode = LinkMode::Disconnected;
            continue;
        };

        //========================================================================================//
        // PHASE 2 - Frames                                                                       //
        //========================================================================================//
        thread::sleep(FRAME_INTERVAL);

        let (Some(x), Some(y)) = (
            link::logged(adc.read(&mut x_pin), "x axis read"),
            link::logged(adc.read(&mut y_pin), "y axis read"),
        ) else {
            continue;
        };
        let reading = Reading {
            x,
            y,
            button_high: button.is_high(),
        };
        let frame = wiring.frame(reading, tolerance);
        let result = sender.send(peer.0, &frame.payload());

        if last_debug_log.elapsed() > DEBUG_LOG_INTERVAL {
            info!("frame {reading:?} '{frame}' result: {result:?} (sent to {peer})");
            last_debug_log = Instant::now();
        }

        if sends.record(result.is_ok()) {
            error!("too many failed message attempts, moving to disconnect");
            esp_now = None;
            link::logged(wifi.disconnect(), "disconnect");
            mode = LinkMode::Disconnected;
        }
    }
}

/// Scans for the lights host and briefly joins its network. Returns the
/// ESP-NOW address to send frames to, or `None` to scan again.
fn find_lights_host(
    wifi: &mut BlockingWifi<EspWifi<'static>>,
) -> anyhow::Result<Option<MacAddr>> {
    info!("scanning for networks");
    let access_points = wifi.scan()?;
    debug!("found {} networks", access_points.len());

    let Some(host) = access_points.iter().find(|ap| ap.ssid.as_str() == LIGHTS_HOST_SSID) else {
        error!("no light host network found");
        return Ok(None);
    };
    let peer = link::peer_address(host.bssid);

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: LIGHTS_HOST_SSID.try_into().map_err(|_| anyhow!("ssid too long"))?,
        password: LIGHTS_HOST_PASSWORD.try_into().map_err(|_| anyhow!("password too long"))?,
        auth_method: AuthMethod::WPA2Personal,
        ..Default::default()
    }))?;

    let mut attempts = 0;
    while let Err(e) = wifi.connect() {
        attempts += 1;
        debug!("connecting... ({e})");
        if attempts > link::MAX_CONNECT_ATTEMPTS {
            error!("too many connection attempts, re-scanning");
            wifi.disconnect()?;
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(500));
    }

    info!("connection established with light host, swapping to esp-now");
    wifi.disconnect()?;
    info!("final broadcast addr: {peer}");
    Ok(Some(peer))
}

fn start_esp_now(peer: MacAddr) -> anyhow::Result<EspNow<'static>> {
    let esp_now = EspNow::take()?;
    esp_now.add_peer(PeerInfo {
        peer_addr: peer.0,
        channel: 0,
        encrypt: false,
        ..Default::default()
    })?;
    Ok(esp_now)
}
