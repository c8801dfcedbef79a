use std::fmt;

use log::*;

/// Send failures tolerated before the link is torn down and rebuilt.
pub const MAX_FAILED_SENDS: u32 = 100;
/// Connection attempts to the lights host before going back to scanning.
pub const MAX_CONNECT_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Disconnected,
    Connected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// ESP-NOW address of the lights host, given the BSSID its access point
/// was found under. The station interface sits one below the AP interface.
pub fn peer_address(bssid: [u8; 6]) -> MacAddr {
    let mut addr = bssid;
    addr[5] = addr[5].wrapping_sub(1);
    MacAddr(addr)
}

/// Counts failed sends on the current link.
#[derive(Debug)]
pub struct SendTracker {
    failed: u32,
    max: u32,
}

impl SendTracker {
    pub fn new(max: u32) -> Self {
        Self { failed: 0, max }
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }

    /// Records one send. Returns `true` once the link should be given up.
    pub fn record(&mut self, ok: bool) -> bool {
        if !ok {
            self.failed += 1;
        }
        self.failed > self.max
    }

    pub fn reset(&mut self) {
        self.failed = 0;
    }
}

impl Default for SendTracker {
    fn default() -> Self {
        Self::new(MAX_FAILED_SENDS)
    }
}

/// Logs a failed step of the polling loop and hands back its value, if any.
/// Errors here mean "try again on the next pass", never "stop".
pub fn logged<T, E: fmt::Display>(result: Result<T, E>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{what} failed: {e}");
            None
        }
    }
}
