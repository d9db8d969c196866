//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "etapu11"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "ETA PU 11 register map and views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use devgw_core::view_properties;

/// Every value occupies two holding registers holding a signed 32-bit integer, high
/// word first.
pub const REGISTER_COUNT: u16 = 2;

/// One entry of the boiler's Modbus register map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Register {
    pub name: &'static str,
    pub address: u16,
    pub divisor: f64,
    pub writable: bool,
}

impl Register {
    const fn new(name: &'static str, address: u16, divisor: f64) -> Self {
        Self {
            name,
            address,
            divisor,
            writable: false,
        }
    }

    const fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn decode(&self, words: &[u16]) -> Option<f64> {
        match words {
            [high, low, ..] => {
                let raw = ((u32::from(*high) << 16) | u32::from(*low)) as i32;
                Some(f64::from(raw) / self.divisor)
            }
            _ => None,
        }
    }

    /// Scale `value` back to the register representation.
    pub fn encode(&self, value: f64) -> Option<[u16; 2]> {
        let scaled = (value * self.divisor).round();
        if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
            return None;
        }
        let raw = scaled as i32 as u32;
        Some([(raw >> 16) as u16, (raw & 0xFFFF) as u16])
    }
}

/// A contiguous register range backing one view.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    pub name: &'static str,
    pub registers: &'static [Register],
}

impl Block {
    pub fn start(&self) -> u16 {
        self.registers.first().map_or(0, |register| register.address)
    }

    pub fn len(&self) -> u16 {
        self.registers.len() as u16 * REGISTER_COUNT
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

pub const BOILER: Block = Block {
    name: "boiler",
    registers: &[
        Register::new("BoilerState", 1000, 1.0),
        Register::new("BoilerTemperature", 1002, 10.0),
        Register::new("BoilerBottomTemperature", 1004, 10.0),
        Register::new("FlueGasTemperature", 1006, 10.0),
        Register::new("BoilerTarget", 1008, 10.0).writable(),
        Register::new("FullLoadHours", 1010, 1.0),
        Register::new("TotalConsumed", 1012, 1.0),
    ],
};

pub const HOTWATER: Block = Block {
    name: "hotwater",
    registers: &[
        Register::new("HotwaterState", 1100, 1.0),
        Register::new("HotwaterTemperature", 1102, 10.0),
        Register::new("HotwaterTarget", 1104, 10.0).writable(),
        Register::new("HotwaterSwitchOnDiff", 1106, 10.0).writable(),
    ],
};

pub const HEATING: Block = Block {
    name: "heating",
    registers: &[
        Register::new("HeatingState", 1200, 1.0),
        Register::new("RoomTarget", 1202, 10.0).writable(),
        Register::new("FlowTemperature", 1204, 10.0),
        Register::new("ReturnTemperature", 1206, 10.0),
        Register::new("OutsideTemperature", 1208, 10.0),
        Register::new("HeatingMode", 1210, 1.0).writable(),
    ],
};

pub const STORAGE: Block = Block {
    name: "storage",
    registers: &[
        Register::new("StorageState", 1300, 1.0),
        Register::new("StorageTop", 1302, 10.0),
        Register::new("StorageMiddle", 1304, 10.0),
        Register::new("StorageBottom", 1306, 10.0),
        Register::new("StorageTarget", 1308, 10.0).writable(),
        Register::new("PelletStock", 1310, 1.0).writable(),
    ],
};

pub const SYSTEM: Block = Block {
    name: "system",
    registers: &[
        Register::new("SystemState", 1400, 1.0),
        Register::new("OperatingHours", 1402, 1.0),
        Register::new("IgnitionCount", 1404, 1.0),
        Register::new("ErrorCount", 1406, 1.0),
        Register::new("FirmwareVersion", 1408, 100.0),
    ],
};

pub static BLOCKS: [Block; 5] = [BOILER, HOTWATER, HEATING, STORAGE, SYSTEM];

/// Find a register by name, ignoring ASCII case.
pub fn register(name: &str) -> Option<&'static Register> {
    BLOCKS
        .iter()
        .flat_map(|block| block.registers.iter())
        .find(|register| register.name.eq_ignore_ascii_case(name))
}

/// Registers of one block as read from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub start: u16,
    pub words: Vec<u16>,
}

impl RawBlock {
    /// Scaled value of `name`; zero when the register is outside this block.
    pub fn value(&self, block: &Block, name: &str) -> f64 {
        block
            .registers
            .iter()
            .find(|register| register.name == name)
            .and_then(|register| {
                let offset = register.address.checked_sub(self.start)? as usize;
                register.decode(self.words.get(offset..)?)
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoilerData {
    pub boiler_state: f64,
    pub boiler_temperature: f64,
    pub boiler_bottom_temperature: f64,
    pub flue_gas_temperature: f64,
    pub boiler_target: f64,
    pub full_load_hours: f64,
    pub total_consumed: f64,
}

impl BoilerData {
    pub fn refresh(&mut self, raw: &RawBlock) {
        self.boiler_state = raw.value(&BOILER, "BoilerState");
        self.boiler_temperature = raw.value(&BOILER, "BoilerTemperature");
        self.boiler_bottom_temperature = raw.value(&BOILER, "BoilerBottomTemperature");
        self.flue_gas_temperature = raw.value(&BOILER, "FlueGasTemperature");
        self.boiler_target = raw.value(&BOILER, "BoilerTarget");
        self.full_load_hours = raw.value(&BOILER, "FullLoadHours");
        self.total_consumed = raw.value(&BOILER, "TotalConsumed");
    }
}

view_properties!(BoilerData {
    "BoilerState" => boiler_state,
    "BoilerTemperature" => boiler_temperature,
    "BoilerBottomTemperature" => boiler_bottom_temperature,
    "FlueGasTemperature" => flue_gas_temperature,
    "BoilerTarget" => boiler_target,
    "FullLoadHours" => full_load_hours,
    "TotalConsumed" => total_consumed,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HotwaterData {
    pub hotwater_state: f64,
    pub hotwater_temperature: f64,
    pub hotwater_target: f64,
    pub hotwater_switch_on_diff: f64,
}

impl HotwaterData {
    pub fn refresh(&mut self, raw: &RawBlock) {
        self.hotwater_state = raw.value(&HOTWATER, "HotwaterState");
        self.hotwater_temperature = raw.value(&HOTWATER, "HotwaterTemperature");
        self.hotwater_target = raw.value(&HOTWATER, "HotwaterTarget");
        self.hotwater_switch_on_diff = raw.value(&HOTWATER, "HotwaterSwitchOnDiff");
    }
}

view_properties!(HotwaterData {
    "HotwaterState" => hotwater_state,
    "HotwaterTemperature" => hotwater_temperature,
    "HotwaterTarget" => hotwater_target,
    "HotwaterSwitchOnDiff" => hotwater_switch_on_diff,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeatingData {
    pub heating_state: f64,
    pub room_target: f64,
    pub flow_temperature: f64,
    pub return_temperature: f64,
    pub outside_temperature: f64,
    pub heating_mode: f64,
}

impl HeatingData {
    pub fn refresh(&mut self, raw: &RawBlock) {
        self.heating_state = raw.value(&HEATING, "HeatingState");
        self.room_target = raw.value(&HEATING, "RoomTarget");
        self.flow_temperature = raw.value(&HEATING, "FlowTemperature");
        self.return_temperature = raw.value(&HEATING, "ReturnTemperature");
        self.outside_temperature = raw.value(&HEATING, "OutsideTemperature");
        self.heating_mode = raw.value(&HEATING, "HeatingMode");
    }
}

view_properties!(HeatingData {
    "HeatingState" => heating_state,
    "RoomTarget" => room_target,
    "FlowTemperature" => flow_temperature,
    "ReturnTemperature" => return_temperature,
    "OutsideTemperature" => outside_temperature,
    "HeatingMode" => heating_mode,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageData {
    pub storage_state: f64,
    pub storage_top: f64,
    pub storage_middle: f64,
    pub storage_bottom: f64,
    pub storage_target: f64,
    pub pellet_stock: f64,
}

impl StorageData {
    pub fn refresh(&mut self, raw: &RawBlock) {
        self.storage_state = raw.value(&STORAGE, "StorageState");
        self.storage_top = raw.value(&STORAGE, "StorageTop");
        self.storage_middle = raw.value(&STORAGE, "StorageMiddle");
        self.storage_bottom = raw.value(&STORAGE, "StorageBottom");
        self.storage_target = raw.value(&STORAGE, "StorageTarget");
        self.pellet_stock = raw.value(&STORAGE, "PelletStock");
    }
}

view_properties!(StorageData {
    "StorageState" => storage_state,
    "StorageTop" => storage_top,
    "StorageMiddle" => storage_middle,
    "StorageBottom" => storage_bottom,
    "StorageTarget" => storage_target,
    "PelletStock" => pellet_stock,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemData {
    pub system_state: f64,
    pub operating_hours: f64,
    pub ignition_count: f64,
    pub error_count: f64,
    pub firmware_version: f64,
}

impl SystemData {
    pub fn refresh(&mut self, raw: &RawBlock) {
        self.system_state = raw.value(&SYSTEM, "SystemState");
        self.operating_hours = raw.value(&SYSTEM, "OperatingHours");
        self.ignition_count = raw.value(&SYSTEM, "IgnitionCount");
        self.error_count = raw.value(&SYSTEM, "ErrorCount");
        self.firmware_version = raw.value(&SYSTEM, "FirmwareVersion");
    }
}

view_properties!(SystemData {
    "SystemState" => system_state,
    "OperatingHours" => operating_hours,
    "IgnitionCount" => ignition_count,
    "ErrorCount" => error_count,
    "FirmwareVersion" => firmware_version,
});
