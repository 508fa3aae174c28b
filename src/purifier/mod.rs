pub mod client;
pub mod sync;

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Operating state reported by `get_control_info`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlInfo {
    pub power: bool,
    /// True for any humidifier level (1-3) and for auto mode (4).
    pub humidifier: bool,
}

/// Readings reported by `get_sensor_info`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorInfo {
    pub temperature: f64,
    pub humidity: f64,
}

/// The only control the bridge writes back to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCommand {
    pub power: bool,
}

impl ControlCommand {
    /// Query parameters for `set_control_info`.
    pub fn params(&self) -> [(&'static str, &'static str); 1] {
        [("pow", if self.power { "1" } else { "0" })]
    }
}

/// A parsed `key=value,key=value` response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    fields: HashMap<String, String>,
}

impl RawResponse {
    /// Parse the device's comma separated wire format.
    /// "ret=OK,pow=1,humd=4" → {ret: OK, pow: 1, humd: 4}
    pub fn parse(body: &str) -> Self {
        let fields = body
            .trim()
            .split(',')
            .filter(|item| !item.trim().is_empty())
            .map(|item| match item.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (item.trim().to_string(), String::new()),
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &'static str) -> Result<&str> {
        self.get(key).ok_or(Error::MissingField(key))
    }
}

impl ControlInfo {
    pub fn from_response(response: &RawResponse) -> Result<Self> {
        Ok(Self {
            power: decode_power(response.require("pow")?)?,
            humidifier: decode_humidifier(response.require("humd")?)?,
        })
    }
}

impl SensorInfo {
    pub fn from_response(response: &RawResponse) -> Result<Self> {
        Ok(Self {
            temperature: decode_reading("htemp", response.require("htemp")?)?,
            humidity: decode_reading("hhum", response.require("hhum")?)?,
        })
    }
}

pub fn decode_power(code: &str) -> Result<bool> {
    match code {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(Error::Decode {
            field: "pow",
            value: code.to_string(),
        }),
    }
}

/// 1-3 are fixed humidity levels and 4 is auto; all of them mean "on".
pub fn decode_humidifier(code: &str) -> Result<bool> {
    match code {
        "0" => Ok(false),
        "1" | "2" | "3" | "4" => Ok(true),
        _ => Err(Error::Decode {
            field: "humd",
            value: code.to_string(),
        }),
    }
}

fn decode_reading(field: &'static str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Decode {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_info_body() {
        let response = RawResponse::parse("ret=OK,pow=1,mode=1,airvol=0,humd=4");
        assert_eq!(response.fields.len(), 5);
        assert_eq!(response.get("ret"), Some("OK"));
        assert_eq!(response.get("pow"), Some("1"));
        assert_eq!(response.get("mode"), Some("1"));
        assert_eq!(response.get("airvol"), Some("0"));
        assert_eq!(response.get("humd"), Some("4"));
    }

    #[test]
    fn parse_keeps_last_duplicate_and_splits_on_first_equals() {
        let response = RawResponse::parse("ret=OK,pow=0,pow=1,name=a=b,flag,\n");
        assert_eq!(response.get("pow"), Some("1"));
        assert_eq!(response.get("name"), Some("a=b"));
        assert_eq!(response.get("flag"), Some(""));
        assert_eq!(response.fields.len(), 4);
    }

    #[test]
    fn empty_body_has_no_fields() {
        assert!(RawResponse::parse("").fields.is_empty());
    }

    #[test]
    fn power_codes() {
        assert!(!decode_power("0").unwrap());
        assert!(decode_power("1").unwrap());
        for bad in ["2", "", "on", "-1"] {
            assert!(matches!(
                decode_power(bad),
                Err(Error::Decode { field: "pow", .. })
            ));
        }
    }

    #[test]
    fn humidifier_codes() {
        let expected = [("0", false), ("1", true), ("2", true), ("3", true), ("4", true)];
        for (code, on) in expected {
            assert_eq!(decode_humidifier(code).unwrap(), on, "humd={code}");
        }
        for bad in ["5", "", "auto"] {
            assert!(matches!(
                decode_humidifier(bad),
                Err(Error::Decode { field: "humd", .. })
            ));
        }
    }

    #[test]
    fn control_info_requires_both_codes() {
        let response = RawResponse::parse("ret=OK,pow=1");
        assert!(matches!(
            ControlInfo::from_response(&response),
            Err(Error::MissingField("humd"))
        ));

        let response = RawResponse::parse("ret=OK,pow=1,humd=0");
        assert_eq!(
            ControlInfo::from_response(&response).unwrap(),
            ControlInfo {
                power: true,
                humidifier: false
            }
        );
    }

    #[test]
    fn sensor_info_readings() {
        let response = RawResponse::parse("ret=OK,htemp=21.5,hhum=43,pm25=2");
        let sensor = SensorInfo::from_response(&response).unwrap();
        assert_eq!(sensor.temperature, 21.5);
        assert_eq!(sensor.humidity, 43.0);
    }

    #[test]
    fn non_numeric_reading_is_a_decode_error() {
        let response = RawResponse::parse("ret=OK,htemp=-,hhum=43");
        assert!(matches!(
            SensorInfo::from_response(&response),
            Err(Error::Decode { field: "htemp", .. })
        ));

        let response = RawResponse::parse("ret=OK,htemp=20,hhum=NaN");
        assert!(matches!(
            SensorInfo::from_response(&response),
            Err(Error::Decode { field: "hhum", .. })
        ));
    }

    #[test]
    fn command_params() {
        assert_eq!(ControlCommand { power: true }.params(), [("pow", "1")]);
        assert_eq!(ControlCommand { power: false }.params(), [("pow", "0")]);
    }
}
