use std::fmt;

use anyhow::Context;

/// Size of the ESP-NOW payload the lights host expects.
pub const PAYLOAD_LEN: usize = 120;

/// Raw ADC window inside which an axis counts as centered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerance {
    pub lower: u16,
    pub upper: u16,
}

impl Tolerance {
    /// Tolerance from the optional `AXIS_TOLERANCE_LOWER`/`AXIS_TOLERANCE_UPPER`
    /// build settings. A missing bound keeps its default.
    pub fn from_config(lower: Option<&str>, upper: Option<&str>) -> anyhow::Result<Self> {
        let default = Self::default();
        let parse = |value: Option<&str>, fallback: u16, name: &str| match value {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid {name} {value:?}")),
            None => Ok(fallback),
        };

        let tolerance = Self {
            lower: parse(lower, default.lower, "AXIS_TOLERANCE_LOWER")?,
            upper: parse(upper, default.upper, "AXIS_TOLERANCE_UPPER")?,
        };
        anyhow::ensure!(
            tolerance.lower <= tolerance.upper,
            "axis tolerance {}..{} is inverted",
            tolerance.lower,
            tolerance.upper
        );
        Ok(tolerance)
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { lower: 1200, upper: 3200 }
    }
}

/// Position of one thumbstick axis, numbered the way the lights host reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AxisPosition {
    Centered = 0,
    High = 1,
    Low = 2,
}

impl AxisPosition {
    pub fn classify(raw: u16, tolerance: Tolerance) -> Self {
        if raw > tolerance.upper {
            Self::High
        } else if raw < tolerance.lower {
            Self::Low
        } else {
            Self::Centered
        }
    }
}

/// One sample of the hardware, straight off the pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub x: u16,
    pub y: u16,
    /// Logic level of the button pin (pulled up).
    pub button_high: bool,
}

/// How the stick and button are wired on this particular controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wiring {
    pub swap_xy: bool,
    pub button_normal_open: bool,
}

impl Wiring {
    /// Wiring selected at build time from the `.env` file.
    pub const BUILD: Wiring = Wiring {
        swap_xy: cfg!(SWAP_XY_POSITION),
        button_normal_open: cfg!(BUTTON_NORMAL_OPEN),
    };

    pub fn frame(&self, reading: Reading, tolerance: Tolerance) -> Frame {
        let (raw_x, raw_y) = if self.swap_xy {
            (reading.y, reading.x)
        } else {
            (reading.x, reading.y)
        };

        // The pin idles high through the pull-up; a normally open button pulls it low.
        let pressed = if self.button_normal_open {
            !reading.button_high
        } else {
            reading.button_high
        };

        Frame {
            x: AxisPosition::classify(raw_x, tolerance),
            y: AxisPosition::classify(raw_y, tolerance),
            pressed,
        }
    }
}

/// What gets sent to the lights host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub x: AxisPosition,
    pub y: AxisPosition,
    pub pressed: bool,
}

impl Frame {
    /// Text form, zero padded to [`PAYLOAD_LEN`].
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0; PAYLOAD_LEN];
        let text = self.to_string();
        payload[..text.len()].copy_from_slice(text.as_bytes());
        payload
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}|{}|{}]",
            self.x as u8, self.y as u8, self.pressed as u8
        )
    }
}
