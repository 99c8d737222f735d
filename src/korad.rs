//! Command/response adapter for Korad bench supplies (KC3405 four channel, KA3005P style single channel).
//!
//! Every command is plain ASCII terminated with `\r\n`. Queries answer with one line, except
//! `STATUS?` which answers with a fixed number of raw bytes. Several channels share one port, so a
//! query holds the port lock from the write until its reply has been read.

use crate::channel::{Channel, ChannelData};
use crate::error::{Error, Result};
use crate::status::StatusRegister;
use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Set and read back voltages closer than this mean the output is on.
const OUTPUT_ON_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    /// Wait after every command before reading or sending the next one.
    pub command_delay: Duration,
    /// Wait after opening the port.
    pub open_delay: Duration,
    pub output_on_delay: Duration,
    pub output_off_delay: Duration,
    /// Length of the raw `STATUS?` reply.
    pub status_len: usize,
}

impl Default for PortSettings {
    fn default() -> Self {
        PortSettings {
            port_name: String::from("/dev/ttyUSB0"),
            baud_rate: 9600,
            timeout: Duration::from_millis(1000),
            command_delay: Duration::from_millis(100),
            open_delay: Duration::from_millis(1000),
            output_on_delay: Duration::from_millis(1000),
            output_off_delay: Duration::from_millis(100),
            status_len: 1,
        }
    }
}

/// Byte stream to the supply that can also throw away unread input.
pub trait Transport: Read + Write {
    fn clear_input(&mut self) -> io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

pub struct KoradPowerSupply<P = Box<dyn SerialPort>> {
    port: Mutex<P>,
    settings: PortSettings,
}

impl KoradPowerSupply<Box<dyn SerialPort>> {
    /// Open the serial device, 8N1 without flow control.
    pub fn open(settings: &PortSettings) -> Result<Self> {
        let port = serialport::new(&settings.port_name, settings.baud_rate)
            .stop_bits(serialport::StopBits::One)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(settings.timeout)
            .open()?;
        info!(
            "Opened {} at {} baud",
            settings.port_name, settings.baud_rate
        );
        thread::sleep(settings.open_delay);
        Ok(KoradPowerSupply::with_port(port, settings.clone()))
    }
}

impl<P: Transport> KoradPowerSupply<P> {
    pub fn with_port(port: P, settings: PortSettings) -> Self {
        KoradPowerSupply {
            port: Mutex::new(port),
            settings,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, P>> {
        self.port.lock().map_err(|_| Error::PortLock)
    }

    fn write_command(&self, port: &mut P, command: &str) -> Result<()> {
        // a reply that came in after its query timed out must not answer this one
        port.clear_input()?;
        debug!("send: {}", command);
        port.write_all(format!("{}\r\n", command).as_bytes())?;
        port.flush()?;
        thread::sleep(self.settings.command_delay);
        Ok(())
    }

    /// Read up to the next `\n`. A timeout after some bytes ends the line, a timeout before any
    /// byte is an error.
    fn read_line(port: &mut P, command: Option<&str>) -> Result<String> {
        let mut line: Vec<u8> = Vec::new();
        let mut received = false;
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    received = true;
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        if !received {
            return Err(match command {
                Some(command) => Error::Timeout(command.to_string()),
                None => Error::ReadTimeout,
            });
        }
        let response = String::from_utf8_lossy(&line).trim().to_string();
        debug!("recv: {}", response);
        Ok(response)
    }

    /// Write one command, terminator appended.
    pub fn send_command(&self, command: &str) -> Result<()> {
        let mut port = self.lock()?;
        self.write_command(&mut port, command)
    }

    /// Read one reply line from the port.
    pub fn read_response(&self) -> Result<String> {
        let mut port = self.lock()?;
        Self::read_line(&mut port, None)
    }

    /// Send a query and read its reply line without letting another caller in between.
    pub fn query(&self, command: &str) -> Result<String> {
        let mut port = self.lock()?;
        self.write_command(&mut port, command)?;
        Self::read_line(&mut port, Some(command))
    }

    fn query_f64(&self, command: &str) -> Result<f64> {
        let response = self.query(command)?;
        response
            .parse::<f64>()
            .map_err(|_| Error::InvalidResponse {
                command: command.to_string(),
                response,
            })
    }

    /// Identification string, which carries the serial number.
    pub fn serial_number(&self) -> Result<String> {
        self.query("*IDN?")
    }

    /// Measured output voltage.
    pub fn voltage(&self, channel: Channel) -> Result<f64> {
        self.query_f64(&format!("VOUT{}?", channel))
    }

    /// Measured output current.
    pub fn current(&self, channel: Channel) -> Result<f64> {
        self.query_f64(&format!("IOUT{}?", channel))
    }

    pub fn voltage_set(&self, channel: Channel) -> Result<f64> {
        self.query_f64(&format!("VSET{}?", channel))
    }

    pub fn current_set(&self, channel: Channel) -> Result<f64> {
        self.query_f64(&format!("ISET{}?", channel))
    }

    pub fn set_voltage(&self, channel: Channel, voltage: f64) -> Result<()> {
        check_set_point(voltage)?;
        self.send_command(&format!("VSET{}:{:.3}", channel, voltage))
    }

    pub fn set_current(&self, channel: Channel, current: f64) -> Result<()> {
        check_set_point(current)?;
        self.send_command(&format!("ISET{}:{:.3}", channel, current))
    }

    /// There is no per channel output query on the multi channel models, so the output counts as
    /// on when the read back voltage follows the set voltage.
    pub fn output_enabled(&self, channel: Channel) -> Result<bool> {
        let voltage_set = self.voltage_set(channel)?;
        let voltage_read = self.voltage(channel)?;
        Ok((voltage_set - voltage_read).abs() <= OUTPUT_ON_TOLERANCE)
    }

    /// Switch the output on and check it took effect.
    pub fn turn_output_on(&self, channel: Channel) -> Result<bool> {
        self.send_command(&format!("OUT{}:1", channel))?;
        thread::sleep(self.settings.output_on_delay);
        let is_on = self.output_enabled(channel)?;
        if is_on {
            info!("Channel {}: output turned on", channel);
        } else {
            warn!("Channel {}: failed to turn output on", channel);
        }
        Ok(is_on)
    }

    /// Switch the output off and check it took effect.
    pub fn turn_output_off(&self, channel: Channel) -> Result<bool> {
        self.send_command(&format!("OUT{}:0", channel))?;
        thread::sleep(self.settings.output_off_delay);
        let is_on = self.output_enabled(channel)?;
        if is_on {
            warn!("Channel {}: failed to turn output off", channel);
        } else {
            info!("Channel {}: output turned off", channel);
        }
        Ok(!is_on)
    }

    /// Returns whether the output is on afterwards.
    pub fn toggle_output(&self, channel: Channel) -> Result<bool> {
        if self.output_enabled(channel)? {
            self.turn_output_off(channel)?;
        } else {
            self.turn_output_on(channel)?;
        }
        self.output_enabled(channel)
    }

    pub fn status(&self) -> Result<StatusRegister> {
        let command = "STATUS?";
        let mut port = self.lock()?;
        self.write_command(&mut port, command)?;
        let mut buf = vec![0u8; self.settings.status_len.max(1)];
        port.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof => {
                Error::Timeout(command.to_string())
            }
            _ => Error::Io(e),
        })?;
        debug!("recv: {:02x?}", buf);
        Ok(StatusRegister::from(buf[0]))
    }

    /// Query set points, read backs and output state of one channel and log them on one line.
    pub fn report(&self, channel: Channel) -> Result<ChannelData> {
        let voltage_set = self.voltage_set(channel)?;
        let current_set = self.current_set(channel)?;
        let voltage_read = self.voltage(channel)?;
        let current_read = self.current(channel)?;
        let is_on = (voltage_set - voltage_read).abs() <= OUTPUT_ON_TOLERANCE;
        let data = ChannelData::new(
            channel,
            voltage_set,
            current_set,
            voltage_read,
            current_read,
            is_on,
        );
        info!("{}", data);
        Ok(data)
    }

    /// Close the port.
    pub fn disconnect(self) {
        drop(self.port);
        info!("Disconnected");
    }
}

fn check_set_point(value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidValue(value))
    }
}
