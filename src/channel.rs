use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// the readback has to match the set value within this to be shown as Ok
const INDICATOR_TOLERANCE: f64 = 0.01;

/// Output channel number, a single digit in the command mnemonics.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    pub fn number(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=9).contains(&value) {
            Ok(Channel(value))
        } else {
            Err(Error::InvalidChannel(value))
        }
    }
}

impl From<Channel> for u8 {
    fn from(value: Channel) -> Self {
        value.0
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(|value| Channel::try_from(value).ok())
            .ok_or_else(|| Error::InvalidChannelName(s.to_string()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Colour hint for a readback shown on the web page.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// output is off
    Neutral,
    Ok,
    Alarm,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ChannelData {
    channel: Channel,
    voltage_set: f64,
    current_set: f64,
    voltage_read: f64,
    current_read: f64,
    is_on: bool,
    voltage_indicator: Indicator,
    current_indicator: Indicator,
}

impl ChannelData {
    pub fn new(
        in_channel: Channel,
        in_voltage_set: f64,
        in_current_set: f64,
        in_voltage_read: f64,
        in_current_read: f64,
        in_is_on: bool,
    ) -> ChannelData {
        let mut data = ChannelData {
            channel: in_channel,
            voltage_set: in_voltage_set,
            current_set: in_current_set,
            voltage_read: in_voltage_read,
            current_read: in_current_read,
            is_on: in_is_on,
            voltage_indicator: Indicator::Neutral,
            current_indicator: Indicator::Neutral,
        };
        data.update_indicators();
        data
    }

    /// Entry before the first poll: set points only, nothing read back yet.
    pub fn with_set_points(in_channel: Channel, in_voltage_set: f64, in_current_set: f64) -> Self {
        ChannelData::new(in_channel, in_voltage_set, in_current_set, 0.0, 0.0, false)
    }

    pub fn get_channel(&self) -> Channel {
        self.channel
    }

    pub fn get_set_points(&self) -> (f64, f64) {
        (self.voltage_set, self.current_set)
    }

    pub fn get_readback(&self) -> (f64, f64) {
        (self.voltage_read, self.current_read)
    }

    pub fn get_status(&self) -> bool {
        self.is_on
    }

    pub fn get_indicators(&self) -> (Indicator, Indicator) {
        (self.voltage_indicator, self.current_indicator)
    }

    pub fn set_voltage_set(&mut self, in_voltage_set: f64) {
        self.voltage_set = in_voltage_set;
        self.update_indicators();
    }

    pub fn set_current_set(&mut self, in_current_set: f64) {
        self.current_set = in_current_set;
        self.update_indicators();
    }

    pub fn set_status(&mut self, in_is_on: bool) {
        self.is_on = in_is_on;
        self.update_indicators();
    }

    fn update_indicators(&mut self) {
        if !self.is_on {
            self.voltage_indicator = Indicator::Neutral;
            self.current_indicator = Indicator::Neutral;
            return;
        }
        self.voltage_indicator = if (self.voltage_set - self.voltage_read).abs() > INDICATOR_TOLERANCE {
            Indicator::Alarm
        } else {
            Indicator::Ok
        };
        // reading at the limit means the supply has gone into constant current
        self.current_indicator = if self.current_set - self.current_read < INDICATOR_TOLERANCE {
            Indicator::Alarm
        } else {
            Indicator::Ok
        };
    }
}

impl fmt::Display for ChannelData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Ch: {} Set V: {:.3}V, Set I: {:.3}A, Read V: {:.3}V, Read I: {:.3}A, Output: {}",
            self.channel,
            self.voltage_set,
            self.current_set,
            self.voltage_read,
            self.current_read,
            self.is_on
        )
    }
}
