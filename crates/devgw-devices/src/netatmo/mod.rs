//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "netatmo"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Netatmo weather station gateway."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod data;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use url::form_urlencoded;

use devgw_common::NetatmoSettings;
use devgw_core::{
    decode_json, DeviceGateway, GatewayError, OperationStatus, PropertyAccess, SingleFlight,
};
use devgw_transport::{HttpClient, HttpEndpoint, HttpTransport, TransportError};

pub use data::{
    Dashboard, IndoorModuleData, MainModuleData, Module, OutdoorModuleData, RainGaugeData,
    Station, StationsResponse, TokenResponse, WindGaugeData, INDOOR_MODULE, OUTDOOR_MODULE,
    RAIN_GAUGE, WIND_GAUGE,
};

const TOKEN_PATH: &str = "oauth2/token";
const STATIONS_PATH: &str = "api/getstationsdata";
const SCOPE: &str = "read_station";
/// Upper bound for a granted token lifetime; longer grants are refreshed after a day.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

const VIEW_NAMES: &[&str] = &[
    "MainModuleData",
    "OutdoorModuleData",
    "WindGaugeData",
    "RainGaugeData",
    "IndoorModuleData",
];

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NetatmoViews {
    main_module_data: MainModuleData,
    outdoor_module_data: OutdoorModuleData,
    wind_gauge_data: WindGaugeData,
    rain_gauge_data: RainGaugeData,
    indoor_module_data: IndoorModuleData,
}

#[derive(Debug, Clone)]
struct Token {
    access_token: String,
    refresh_token: String,
    expires_at: Instant,
}

impl Token {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

fn endpoint_of(settings: &NetatmoSettings) -> HttpEndpoint {
    HttpEndpoint::new(settings.address.clone(), settings.timeout)
}

/// Station query; the token travels as a query parameter.
pub fn stations_path(access_token: &str, device_id: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("access_token", access_token)
        .append_pair("device_id", device_id)
        .finish();
    format!("{STATIONS_PATH}?{query}")
}

pub struct NetatmoGateway<T = HttpClient> {
    flight: SingleFlight,
    transport: T,
    settings: RwLock<NetatmoSettings>,
    token: RwLock<Option<Token>>,
    views: RwLock<NetatmoViews>,
}

impl NetatmoGateway<HttpClient> {
    pub fn new(settings: NetatmoSettings) -> Result<Self, TransportError> {
        let transport = HttpClient::new(endpoint_of(&settings))?;
        Ok(Self::with_transport(settings, transport))
    }
}

impl<T: HttpTransport> NetatmoGateway<T> {
    pub fn with_transport(settings: NetatmoSettings, transport: T) -> Self {
        Self {
            flight: SingleFlight::new("netatmo"),
            transport,
            settings: RwLock::new(settings),
            token: RwLock::new(None),
            views: RwLock::new(NetatmoViews::default()),
        }
    }

    pub fn settings(&self) -> NetatmoSettings {
        self.settings.read().clone()
    }

    /// Replace the settings; the held token is discarded since it belongs to the old
    /// credentials.
    pub fn update(&self, settings: NetatmoSettings) {
        self.transport.update(endpoint_of(&settings));
        *self.settings.write() = settings;
        *self.token.write() = None;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn main_module(&self) -> MainModuleData {
        self.views.read().main_module_data.clone()
    }

    pub fn outdoor_module(&self) -> OutdoorModuleData {
        self.views.read().outdoor_module_data.clone()
    }

    pub fn wind_gauge(&self) -> WindGaugeData {
        self.views.read().wind_gauge_data.clone()
    }

    pub fn rain_gauge(&self) -> RainGaugeData {
        self.views.read().rain_gauge_data.clone()
    }

    pub fn indoor_module(&self) -> IndoorModuleData {
        self.views.read().indoor_module_data.clone()
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<Token, GatewayError> {
        let body = self.transport.post(TOKEN_PATH, form).await?;
        let response: TokenResponse = decode_json(TOKEN_PATH, &body)?;
        if let Some(error) = response.error {
            return Err(GatewayError::NoCommunication(error));
        }
        let access_token = response
            .access_token
            .ok_or_else(|| GatewayError::NoCommunication("no access token granted".into()))?;
        let lifetime =
            Duration::from_secs(response.expires_in.unwrap_or_default()).min(MAX_TOKEN_LIFETIME);
        let expires_at = Instant::now().checked_add(lifetime).ok_or_else(|| {
            GatewayError::NoCommunication(format!("token lifetime {lifetime:?} out of range"))
        })?;
        Ok(Token {
            access_token,
            refresh_token: response.refresh_token.unwrap_or_default(),
            expires_at,
        })
    }

    /// Return a usable token, asking for one only when none is held or it has expired.
    async fn authorize(&self, settings: &NetatmoSettings) -> Result<Token, GatewayError> {
        let held = self.token.read().clone();
        let requested = match held {
            Some(token) if !token.is_expired() => return Ok(token),
            Some(token) => {
                debug!(gateway = "netatmo", "refreshing expired token");
                self.request_token(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", token.refresh_token.as_str()),
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                ])
                .await
            }
            None => {
                debug!(gateway = "netatmo", user = %settings.user, "requesting token");
                self.request_token(&[
                    ("grant_type", "password"),
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                    ("username", settings.user.as_str()),
                    ("password", settings.password.as_str()),
                    ("scope", SCOPE),
                ])
                .await
            }
        };

        match requested {
            Ok(token) => {
                *self.token.write() = Some(token.clone());
                Ok(token)
            }
            Err(err) => {
                *self.token.write() = None;
                Err(GatewayError::NoCommunication(format!(
                    "token request failed: {err}"
                )))
            }
        }
    }

    async fn read_all_inner(&self) -> Result<(), GatewayError> {
        let settings = self.settings();
        let token = self.authorize(&settings).await?;

        let path = stations_path(&token.access_token, &settings.device_id);
        let body = self.transport.get(&path).await?;
        let response: StationsResponse = decode_json(STATIONS_PATH, &body)?;
        if let Some(error) = response.error {
            return Err(GatewayError::device_failure(error.code, error.message));
        }
        let status = response.status.unwrap_or_default();
        if status != "ok" {
            return Err(GatewayError::device_failure(
                status,
                "station query was not accepted",
            ));
        }
        let station = response.body.devices.into_iter().next().ok_or_else(|| {
            GatewayError::NotFound(format!("no station returned for {}", settings.device_id))
        })?;
        if station.id != settings.device_id {
            return Err(GatewayError::NotFound(format!(
                "station '{}' returned, expected '{}'",
                station.id, settings.device_id
            )));
        }

        let mut views = self.views.write();
        views.main_module_data.refresh(&station);
        views.outdoor_module_data.refresh(station.module(OUTDOOR_MODULE));
        views.wind_gauge_data.refresh(station.module(WIND_GAUGE));
        views.rain_gauge_data.refresh(station.module(RAIN_GAUGE));
        views.indoor_module_data.refresh(station.module(INDOOR_MODULE));
        info!(
            gateway = "netatmo",
            station = %station.station_name,
            modules = station.modules.len(),
            "weather data refreshed"
        );
        Ok(())
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> DeviceGateway for NetatmoGateway<T> {
    fn flight(&self) -> &SingleFlight {
        &self.flight
    }

    fn view_names(&self) -> &'static [&'static str] {
        VIEW_NAMES
    }

    fn data(&self) -> Value {
        serde_json::to_value(&*self.views.read()).unwrap_or(Value::Null)
    }

    fn view(&self, name: &str) -> Option<Value> {
        let views = self.views.read();
        let value = match self.canonical_view(name)? {
            "MainModuleData" => serde_json::to_value(&views.main_module_data),
            "OutdoorModuleData" => serde_json::to_value(&views.outdoor_module_data),
            "WindGaugeData" => serde_json::to_value(&views.wind_gauge_data),
            "RainGaugeData" => serde_json::to_value(&views.rain_gauge_data),
            _ => serde_json::to_value(&views.indoor_module_data),
        };
        value.ok()
    }

    fn view_property(&self, view: &str, property: &str) -> Option<Value> {
        let views = self.views.read();
        match self.canonical_view(view)? {
            "MainModuleData" => views.main_module_data.property(property),
            "OutdoorModuleData" => views.outdoor_module_data.property(property),
            "WindGaugeData" => views.wind_gauge_data.property(property),
            "RainGaugeData" => views.rain_gauge_data.property(property),
            _ => views.indoor_module_data.property(property),
        }
    }

    async fn read_all(&self) -> OperationStatus {
        self.flight.run("read_all", || self.read_all_inner()).await
    }
}
