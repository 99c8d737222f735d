//! We use this mocking module in unit tests to emulate a Korad supply on the other end of the serial port.

use crate::korad::Transport;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// One simulated output, driving a resistive load.
#[derive(Debug, Clone, Copy)]
pub struct SimChannel {
    pub voltage_set: f64,
    pub current_set: f64,
    pub is_on: bool,
    pub load_ohms: f64,
}

impl SimChannel {
    fn output(&self) -> (f64, f64) {
        if !self.is_on {
            return (0.0, 0.0);
        }
        // constant voltage until the load would draw more than the limit
        let voltage = self.voltage_set.min(self.current_set * self.load_ohms);
        (voltage, voltage / self.load_ohms)
    }
}

#[derive(Debug)]
pub struct MockState {
    pub channels: Vec<SimChannel>,
    pub idn: String,
    /// Raw reply to `STATUS?`.
    pub status: Vec<u8>,
    /// Ignore every command, so reads time out.
    pub silent: bool,
    /// Answer every query with this instead.
    pub garbage: Option<String>,
    /// Every reply only arrives once the read waiting for it has timed out.
    pub late: bool,
    /// Outputs that refuse to switch.
    pub stuck: bool,
    /// Every command received, without terminator.
    pub log: Vec<String>,
    /// Raw bytes received.
    pub written: Vec<u8>,
    pending: Vec<u8>,
    reply: VecDeque<u8>,
    delayed: VecDeque<u8>,
}

/// Cloneable handle; the test keeps one while the driver owns the other.
#[derive(Debug, Clone)]
pub struct MockSerial {
    state: Arc<Mutex<MockState>>,
}

impl MockSerial {
    /// Create a four channel supply, all outputs off, 100 ohm loads.
    pub fn new() -> Self {
        let channel = SimChannel {
            voltage_set: 0.0,
            current_set: 0.0,
            is_on: false,
            load_ohms: 100.0,
        };
        Self {
            state: Arc::new(Mutex::new(MockState {
                channels: vec![channel; 4],
                idn: "KORAD KC3405 V1.00 SN:000016E9".to_string(),
                status: vec![0x00],
                silent: false,
                garbage: None,
                late: false,
                stuck: false,
                log: Vec::new(),
                written: Vec::new(),
                pending: Vec::new(),
                reply: VecDeque::new(),
                delayed: VecDeque::new(),
            })),
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn commands(&self) -> Vec<String> {
        self.with_state(|s| s.log.clone())
    }
}

impl MockState {
    /// Bytes received by the port but not read yet.
    pub fn pending_reply(&self) -> String {
        let bytes: Vec<u8> = self.reply.iter().copied().collect();
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn channel(&mut self, digit: &str) -> Option<&mut SimChannel> {
        let index: usize = digit.parse().ok()?;
        self.channels.get_mut(index.checked_sub(1)?)
    }

    fn handle(&mut self, command: &str) {
        self.log.push(command.to_string());
        if self.silent {
            return;
        }
        let answer = self.answer(command);
        if let Some(answer) = answer {
            let answer = match (&self.garbage, command.ends_with('?')) {
                (Some(garbage), true) => format!("{}\r\n", garbage).into_bytes(),
                _ => answer,
            };
            if self.late {
                self.delayed.extend(answer);
            } else {
                self.reply.extend(answer);
            }
        }
    }

    fn answer(&mut self, command: &str) -> Option<Vec<u8>> {
        if command == "*IDN?" {
            return Some(format!("{}\r\n", self.idn).into_bytes());
        }
        if command == "STATUS?" {
            return Some(self.status.clone());
        }
        let line = |value: f64| Some(format!("{:.3}\r\n", value).into_bytes());
        if let Some(query) = command.strip_suffix('?') {
            let (mnemonic, digit) = query.split_at(query.len().checked_sub(1)?);
            let channel = *self.channel(digit)?;
            let (voltage, current) = channel.output();
            return match mnemonic {
                "VOUT" => line(voltage),
                "IOUT" => line(current),
                "VSET" => line(channel.voltage_set),
                "ISET" => line(channel.current_set),
                _ => None,
            };
        }
        let (head, value) = command.split_once(':')?;
        let (mnemonic, digit) = head.split_at(head.len().checked_sub(1)?);
        let stuck = self.stuck;
        let channel = self.channel(digit)?;
        match mnemonic {
            "VSET" => channel.voltage_set = value.parse().ok()?,
            "ISET" => channel.current_set = value.parse().ok()?,
            "OUT" if !stuck => channel.is_on = value == "1",
            _ => {}
        }
        None
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.written.extend_from_slice(buf);
        state.pending.extend_from_slice(buf);
        while let Some(end) = state.pending.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = state.pending.drain(..end + 2).collect();
            let command = String::from_utf8_lossy(&line[..end]).to_string();
            state.handle(&command);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.reply.is_empty() {
            let delayed: Vec<u8> = state.delayed.drain(..).collect();
            state.reply.extend(delayed);
            // what serialport reports once the read timeout expires
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
        }
        let mut n = 0;
        while n < buf.len() {
            match state.reply.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Transport for MockSerial {
    fn clear_input(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().reply.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_queries_after_terminator() {
        let mut port = MockSerial::new();
        port.write_all(b"VSET1:5.000\r\nISET1:0.100\r\nOUT1:1\r\n").unwrap();
        port.write_all(b"VOUT1").unwrap();
        let mut buf = [0u8; 16];
        assert!(port.read(&mut buf).is_err());
        port.write_all(b"?\r\n").unwrap();
        let n = port.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"5.000\r\n");
        assert_eq!(port.commands().len(), 4);
    }

    #[test]
    fn late_reply_shows_up_after_timeout() {
        let mut port = MockSerial::new();
        port.with_state(|s| s.late = true);
        port.write_all(b"*IDN?\r\n").unwrap();
        let mut buf = [0u8; 64];
        assert!(port.read(&mut buf).is_err());
        assert!(port.with_state(|s| s.pending_reply()).starts_with("KORAD"));
        port.clear_input().unwrap();
        assert!(port.read(&mut buf).is_err());
    }

    #[test]
    fn current_limit_pulls_voltage_down() {
        let channel = SimChannel {
            voltage_set: 12.0,
            current_set: 0.05,
            is_on: true,
            load_ohms: 100.0,
        };
        let (voltage, current) = channel.output();
        assert!((voltage - 5.0).abs() < 1e-9);
        assert!((current - 0.05).abs() < 1e-9);
    }
}
