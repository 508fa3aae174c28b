use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::{ControlCommand, ControlInfo, RawResponse, SensorInfo};

const GET_SENSOR_INFO: &str = "get_sensor_info";
const GET_CONTROL_INFO: &str = "get_control_info";
const SET_CONTROL_INFO: &str = "set_control_info";

/// HTTP client for the purifier's `/cleaner/*` API. Holds no device state.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(ip_address: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, format!("http://{ip_address}")))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub async fn fetch_sensor_info(&self) -> Result<SensorInfo> {
        let response = self.call(GET_SENSOR_INFO, &[]).await?;
        SensorInfo::from_response(&response)
    }

    pub async fn fetch_control_info(&self) -> Result<ControlInfo> {
        let response = self.call(GET_CONTROL_INFO, &[]).await?;
        ControlInfo::from_response(&response)
    }

    /// Writes the command without reading back the resulting state.
    pub async fn send_control_command(&self, cmd: ControlCommand) -> Result<()> {
        self.call(SET_CONTROL_INFO, &cmd.params()).await?;
        Ok(())
    }

    async fn call(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<RawResponse> {
        let url = format!("{}/cleaner/{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, params);

        let mut request = self.http.get(&url);
        if !params.is_empty() {
            request = request.query(params);
        }

        let body = request.send().await?.error_for_status()?.text().await?;
        trace!("{} response: {}", endpoint, body);

        let response = RawResponse::parse(&body);
        match response.get("ret") {
            Some("OK") => Ok(response),
            ret => Err(Error::Protocol {
                endpoint: endpoint.to_string(),
                ret: ret.map(String::from),
            }),
        }
    }
}
