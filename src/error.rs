use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP request itself failed (connect, timeout, non-2xx status).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device answered but did not report `ret=OK`.
    #[error("device rejected {endpoint}: ret={ret:?}")]
    Protocol { endpoint: String, ret: Option<String> },

    #[error("unrecognized value {value:?} for field {field}")]
    Decode { field: &'static str, value: String },

    #[error("response is missing field {0}")]
    MissingField(&'static str),

    #[error("characteristic {0} is read-only")]
    ReadOnly(&'static str),

    #[error("invalid payload {payload:?} for characteristic {characteristic}")]
    InvalidPayload {
        characteristic: &'static str,
        payload: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
