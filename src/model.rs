use num_derive::FromPrimitive;
use serde::Serialize;

type Volts = f64;
type Amperes = f64;
type Hertz = f64;
type Watts = f64;
type WattHours = f64;

/// Operator-supplied connection settings.
#[derive(Debug, Clone)]
pub struct Api {
    pub api_url: String,
    pub password: String,
}

/// Session issued by the device on successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub sid: String,
    /// `<api_url>/<sid>`, prefix of every measurement query.
    pub endpoint: String,
}

/// Known Novatek-Electro models, keyed by the `device_id` reported at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum DeviceModel {
    Em125 = 243,
    Em125S = 255,
    Em129 = 271,
    Em126TS = 285,
    Em126T = 293,
}

impl DeviceModel {
    pub fn from_device_id(device_id: u64) -> Option<DeviceModel> {
        num::FromPrimitive::from_u64(device_id)
    }

    /// Model string as the device itself knows it. Also used as the login hash prefix.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceModel::Em125 => "EM-125",
            DeviceModel::Em125S => "EM-125S",
            DeviceModel::Em129 => "EM-129",
            DeviceModel::Em126TS => "EM-126TS",
            DeviceModel::Em126T => "EM-126T",
        }
    }
}

/// Identity of the device, refreshed on every login.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub device_id: Option<u64>,
    pub model: Option<DeviceModel>,
    pub name: Option<String>,
}

impl DeviceInfo {
    /// Mapped model name, empty for unrecognized ids.
    pub fn model_name(&self) -> &'static str {
        self.model.map(|m| m.name()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Measured quantities, in the order they are polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Voltage,
    Current,
    Frequency,
    ActivePower,
    FullPower,
    ActiveEnergy,
    FullEnergy,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Voltage,
        Metric::Current,
        Metric::Frequency,
        Metric::ActivePower,
        Metric::FullPower,
        Metric::ActiveEnergy,
        Metric::FullEnergy,
    ];

    /// Snapshot key.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Voltage => "voltage",
            Metric::Current => "current",
            Metric::Frequency => "frequency",
            Metric::ActivePower => "active_power",
            Metric::FullPower => "full_power",
            Metric::ActiveEnergy => "active_energy",
            Metric::FullEnergy => "full_energy",
        }
    }

    /// Query parameter understood by `/api/all/get`.
    pub fn query_key(&self) -> &'static str {
        match self {
            Metric::Voltage => "volt_msr",
            Metric::Current => "cur_msr",
            Metric::Frequency => "freq_msr",
            Metric::ActivePower => "powa_msr",
            Metric::FullPower => "pows_msr",
            Metric::ActiveEnergy => "enrga_msr",
            Metric::FullEnergy => "enrgs_msr",
        }
    }

    pub fn path(&self) -> String {
        format!("{}?{}", crate::api::endpoint::ALL_GET, self.query_key())
    }

    /// Fixed-point divisor of the raw device value.
    pub fn scale(&self) -> f64 {
        match self {
            /* V*10 */
            Metric::Voltage => 10.0,
            /* A*100, Hz*100 */
            Metric::Current | Metric::Frequency => 100.0,
            _ => 1.0,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Voltage => "V",
            Metric::Current => "A",
            Metric::Frequency => "Hz",
            Metric::ActivePower | Metric::FullPower => "W",
            Metric::ActiveEnergy | Metric::FullEnergy => "Wh",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Metric::Voltage => "mains voltage",
            Metric::Current => "load current",
            Metric::Frequency => "mains frequency",
            Metric::ActivePower => "active power",
            Metric::FullPower => "apparent (full) power",
            Metric::ActiveEnergy => "active energy counter",
            Metric::FullEnergy => "apparent (full) energy counter",
        }
    }
}

/// One complete poll of all seven metrics, in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurements {
    pub voltage: Volts,
    pub current: Amperes,
    pub frequency: Hertz,
    pub active_power: Watts,
    pub full_power: Watts,
    pub active_energy: WattHours,
    pub full_energy: WattHours,
}

impl Measurements {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Voltage => self.voltage,
            Metric::Current => self.current,
            Metric::Frequency => self.frequency,
            Metric::ActivePower => self.active_power,
            Metric::FullPower => self.full_power,
            Metric::ActiveEnergy => self.active_energy,
            Metric::FullEnergy => self.full_energy,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.iter().map(move |m| (*m, self.get(*m)))
    }
}
