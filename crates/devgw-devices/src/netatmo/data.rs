//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "netatmo"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Netatmo weather API payloads and module views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};

use devgw_core::view_properties;

/// Answer of `oauth2/token`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; zero means the token has to be refreshed before use.
    pub expires_in: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

/// Answer of `api/getstationsdata`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationsResponse {
    pub status: Option<String>,
    pub error: Option<ApiError>,
    pub body: StationsBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationsBody {
    pub devices: Vec<Station>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Station {
    #[serde(rename = "_id")]
    pub id: String,
    pub station_name: String,
    pub module_name: String,
    pub firmware: Option<i64>,
    pub wifi_status: Option<i64>,
    pub dashboard_data: Dashboard,
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Module {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub module_name: String,
    pub battery_percent: Option<i64>,
    pub rf_status: Option<i64>,
    pub dashboard_data: Dashboard,
}

/// Latest measurements of one module; only the fields of its kind are present.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dashboard {
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    pub time_utc: Option<DateTime<Utc>>,
    #[serde(rename = "Temperature", default)]
    pub temperature: Option<f64>,
    #[serde(rename = "CO2", default)]
    pub co2: Option<f64>,
    #[serde(rename = "Humidity", default)]
    pub humidity: Option<f64>,
    #[serde(rename = "Noise", default)]
    pub noise: Option<f64>,
    #[serde(rename = "Pressure", default)]
    pub pressure: Option<f64>,
    #[serde(rename = "AbsolutePressure", default)]
    pub absolute_pressure: Option<f64>,
    #[serde(default)]
    pub min_temp: Option<f64>,
    #[serde(default)]
    pub max_temp: Option<f64>,
    #[serde(default)]
    pub temp_trend: Option<String>,
    #[serde(default)]
    pub pressure_trend: Option<String>,
    #[serde(rename = "WindStrength", default)]
    pub wind_strength: Option<f64>,
    #[serde(rename = "WindAngle", default)]
    pub wind_angle: Option<f64>,
    #[serde(rename = "GustStrength", default)]
    pub gust_strength: Option<f64>,
    #[serde(rename = "GustAngle", default)]
    pub gust_angle: Option<f64>,
    #[serde(rename = "max_wind_str", default)]
    pub max_wind_strength: Option<f64>,
    #[serde(rename = "Rain", default)]
    pub rain: Option<f64>,
    #[serde(default)]
    pub sum_rain_1: Option<f64>,
    #[serde(default)]
    pub sum_rain_24: Option<f64>,
}

pub const OUTDOOR_MODULE: &str = "NAModule1";
pub const WIND_GAUGE: &str = "NAModule2";
pub const RAIN_GAUGE: &str = "NAModule3";
pub const INDOOR_MODULE: &str = "NAModule4";

impl Station {
    /// First module of the given kind.
    pub fn module(&self, module_type: &str) -> Option<&Module> {
        self.modules
            .iter()
            .find(|module| module.module_type == module_type)
    }
}

/// Base station: indoor climate, noise and barometric pressure. Temperatures in °C,
/// CO2 in ppm, noise in dB, pressure in mbar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MainModuleData {
    pub station_name: String,
    pub module_name: String,
    pub time: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub co2: f64,
    pub humidity: f64,
    pub noise: f64,
    pub pressure: f64,
    pub absolute_pressure: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub temperature_trend: String,
    pub pressure_trend: String,
    pub wifi_status: i64,
}

impl MainModuleData {
    pub fn refresh(&mut self, station: &Station) {
        let dashboard = &station.dashboard_data;
        self.station_name = station.station_name.clone();
        self.module_name = station.module_name.clone();
        self.time = dashboard.time_utc;
        self.temperature = dashboard.temperature.unwrap_or_default();
        self.co2 = dashboard.co2.unwrap_or_default();
        self.humidity = dashboard.humidity.unwrap_or_default();
        self.noise = dashboard.noise.unwrap_or_default();
        self.pressure = dashboard.pressure.unwrap_or_default();
        self.absolute_pressure = dashboard.absolute_pressure.unwrap_or_default();
        self.min_temperature = dashboard.min_temp.unwrap_or_default();
        self.max_temperature = dashboard.max_temp.unwrap_or_default();
        self.temperature_trend = dashboard.temp_trend.clone().unwrap_or_default();
        self.pressure_trend = dashboard.pressure_trend.clone().unwrap_or_default();
        self.wifi_status = station.wifi_status.unwrap_or_default();
    }
}

view_properties!(MainModuleData {
    "StationName" => station_name,
    "ModuleName" => module_name,
    "Time" => time,
    "Temperature" => temperature,
    "Co2" => co2,
    "Humidity" => humidity,
    "Noise" => noise,
    "Pressure" => pressure,
    "AbsolutePressure" => absolute_pressure,
    "MinTemperature" => min_temperature,
    "MaxTemperature" => max_temperature,
    "TemperatureTrend" => temperature_trend,
    "PressureTrend" => pressure_trend,
    "WifiStatus" => wifi_status,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutdoorModuleData {
    pub module_name: String,
    pub time: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub humidity: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub temperature_trend: String,
    pub battery_percent: i64,
    pub rf_status: i64,
}

impl OutdoorModuleData {
    pub fn refresh(&mut self, module: Option<&Module>) {
        let Some(module) = module else {
            *self = Self::default();
            return;
        };
        let dashboard = &module.dashboard_data;
        self.module_name = module.module_name.clone();
        self.time = dashboard.time_utc;
        self.temperature = dashboard.temperature.unwrap_or_default();
        self.humidity = dashboard.humidity.unwrap_or_default();
        self.min_temperature = dashboard.min_temp.unwrap_or_default();
        self.max_temperature = dashboard.max_temp.unwrap_or_default();
        self.temperature_trend = dashboard.temp_trend.clone().unwrap_or_default();
        self.battery_percent = module.battery_percent.unwrap_or_default();
        self.rf_status = module.rf_status.unwrap_or_default();
    }
}

view_properties!(OutdoorModuleData {
    "ModuleName" => module_name,
    "Time" => time,
    "Temperature" => temperature,
    "Humidity" => humidity,
    "MinTemperature" => min_temperature,
    "MaxTemperature" => max_temperature,
    "TemperatureTrend" => temperature_trend,
    "BatteryPercent" => battery_percent,
    "RfStatus" => rf_status,
});

/// Wind strength in km/h, angles in degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WindGaugeData {
    pub module_name: String,
    pub time: Option<DateTime<Utc>>,
    pub wind_strength: f64,
    pub wind_angle: f64,
    pub gust_strength: f64,
    pub gust_angle: f64,
    pub max_wind_strength: f64,
    pub battery_percent: i64,
}

impl WindGaugeData {
    pub fn refresh(&mut self, module: Option<&Module>) {
        let Some(module) = module else {
            *self = Self::default();
            return;
        };
        let dashboard = &module.dashboard_data;
        self.module_name = module.module_name.clone();
        self.time = dashboard.time_utc;
        self.wind_strength = dashboard.wind_strength.unwrap_or_default();
        self.wind_angle = dashboard.wind_angle.unwrap_or_default();
        self.gust_strength = dashboard.gust_strength.unwrap_or_default();
        self.gust_angle = dashboard.gust_angle.unwrap_or_default();
        self.max_wind_strength = dashboard.max_wind_strength.unwrap_or_default();
        self.battery_percent = module.battery_percent.unwrap_or_default();
    }
}

view_properties!(WindGaugeData {
    "ModuleName" => module_name,
    "Time" => time,
    "WindStrength" => wind_strength,
    "WindAngle" => wind_angle,
    "GustStrength" => gust_strength,
    "GustAngle" => gust_angle,
    "MaxWindStrength" => max_wind_strength,
    "BatteryPercent" => battery_percent,
});

/// Rain in mm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RainGaugeData {
    pub module_name: String,
    pub time: Option<DateTime<Utc>>,
    pub rain: f64,
    pub sum_rain_1: f64,
    pub sum_rain_24: f64,
    pub battery_percent: i64,
}

impl RainGaugeData {
    pub fn refresh(&mut self, module: Option<&Module>) {
        let Some(module) = module else {
            *self = Self::default();
            return;
        };
        let dashboard = &module.dashboard_data;
        self.module_name = module.module_name.clone();
        self.time = dashboard.time_utc;
        self.rain = dashboard.rain.unwrap_or_default();
        self.sum_rain_1 = dashboard.sum_rain_1.unwrap_or_default();
        self.sum_rain_24 = dashboard.sum_rain_24.unwrap_or_default();
        self.battery_percent = module.battery_percent.unwrap_or_default();
    }
}

view_properties!(RainGaugeData {
    "ModuleName" => module_name,
    "Time" => time,
    "Rain" => rain,
    "SumRain1" => sum_rain_1,
    "SumRain24" => sum_rain_24,
    "BatteryPercent" => battery_percent,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndoorModuleData {
    pub module_name: String,
    pub time: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub co2: f64,
    pub humidity: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub temperature_trend: String,
    pub battery_percent: i64,
}

impl IndoorModuleData {
    pub fn refresh(&mut self, module: Option<&Module>) {
        let Some(module) = module else {
            *self = Self::default();
            return;
        };
        let dashboard = &module.dashboard_data;
        self.module_name = module.module_name.clone();
        self.time = dashboard.time_utc;
        self.temperature = dashboard.temperature.unwrap_or_default();
        self.co2 = dashboard.co2.unwrap_or_default();
        self.humidity = dashboard.humidity.unwrap_or_default();
        self.min_temperature = dashboard.min_temp.unwrap_or_default();
        self.max_temperature = dashboard.max_temp.unwrap_or_default();
        self.temperature_trend = dashboard.temp_trend.clone().unwrap_or_default();
        self.battery_percent = module.battery_percent.unwrap_or_default();
    }
}

view_properties!(IndoorModuleData {
    "ModuleName" => module_name,
    "Time" => time,
    "Temperature" => temperature,
    "Co2" => co2,
    "Humidity" => humidity,
    "MinTemperature" => min_temperature,
    "MaxTemperature" => max_temperature,
    "TemperatureTrend" => temperature_trend,
    "BatteryPercent" => battery_percent,
});
