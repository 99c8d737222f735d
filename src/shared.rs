use crate::channel::{Channel, ChannelData};
use crate::status::StatusRegister;
use serde::Serialize;

#[derive(Serialize, Debug, Clone)]
pub struct SharedData {
    channel_data_array: Vec<ChannelData>,
    status: Option<StatusRegister>,
}

impl SharedData {
    pub fn new(in_vec: Vec<ChannelData>) -> SharedData {
        SharedData {
            channel_data_array: in_vec,
            status: None,
        }
    }

    pub fn get_channel(&self, channel: Channel) -> Option<&ChannelData> {
        self.channel_data_array
            .iter()
            .find(|data| data.get_channel() == channel)
    }

    pub fn get_status(&self) -> Option<StatusRegister> {
        self.status
    }

    /// Replace the entry of the same channel. Channels that are not monitored are ignored.
    pub fn update(&mut self, in_data: ChannelData) {
        if let Some(data) = self.find_mut(in_data.get_channel()) {
            *data = in_data;
        }
    }

    pub fn set_voltage_set(&mut self, channel: Channel, in_voltage: f64) {
        if let Some(data) = self.find_mut(channel) {
            data.set_voltage_set(in_voltage);
        }
    }

    pub fn set_current_set(&mut self, channel: Channel, in_current: f64) {
        if let Some(data) = self.find_mut(channel) {
            data.set_current_set(in_current);
        }
    }

    pub fn set_output(&mut self, channel: Channel, in_is_on: bool) {
        if let Some(data) = self.find_mut(channel) {
            data.set_status(in_is_on);
        }
    }

    pub fn set_status(&mut self, in_status: StatusRegister) {
        self.status = Some(in_status);
    }

    fn find_mut(&mut self, channel: Channel) -> Option<&mut ChannelData> {
        self.channel_data_array
            .iter_mut()
            .find(|data| data.get_channel() == channel)
    }
}
