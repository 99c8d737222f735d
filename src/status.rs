//! Decoding of the 8-bit register returned by `STATUS?`.

use serde::Serialize;

const MODE_CV: u8 = 1 << 0;
const OUTPUT: u8 = 1 << 1;
const CURRENT_PRIORITY: u8 = 1 << 2;
const BUZZER: u8 = 1 << 3;
const LOCK: u8 = 1 << 4;
const OVP: u8 = 1 << 5;
const OCP: u8 = 1 << 6;

/// Regulation mode reported by bit 0.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Constant current.
    Cc,
    /// Constant voltage.
    Cv,
}

/// Which limit takes priority when the output is switched on, bit 2.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Voltage,
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegister(u8);

impl From<u8> for StatusRegister {
    fn from(value: u8) -> Self {
        StatusRegister(value)
    }
}

impl StatusRegister {
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn mode(self) -> Mode {
        if self.0 & MODE_CV != 0 {
            Mode::Cv
        } else {
            Mode::Cc
        }
    }

    pub fn output_enabled(self) -> bool {
        self.0 & OUTPUT != 0
    }

    pub fn priority(self) -> Priority {
        if self.0 & CURRENT_PRIORITY != 0 {
            Priority::Current
        } else {
            Priority::Voltage
        }
    }

    pub fn buzzer(self) -> bool {
        self.0 & BUZZER != 0
    }

    pub fn locked(self) -> bool {
        self.0 & LOCK != 0
    }

    pub fn ovp_tripped(self) -> bool {
        self.0 & OVP != 0
    }

    pub fn ocp_tripped(self) -> bool {
        self.0 & OCP != 0
    }
}

// The web page wants the decoded flags, not only the raw byte.
impl Serialize for StatusRegister {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("StatusRegister", 8)?;
        s.serialize_field("bits", &self.bits())?;
        s.serialize_field("mode", &self.mode())?;
        s.serialize_field("output", &self.output_enabled())?;
        s.serialize_field("priority", &self.priority())?;
        s.serialize_field("buzzer", &self.buzzer())?;
        s.serialize_field("locked", &self.locked())?;
        s.serialize_field("ovp", &self.ovp_tripped())?;
        s.serialize_field("ocp", &self.ocp_tripped())?;
        s.end()
    }
}
