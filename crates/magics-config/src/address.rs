use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Base address of the remote queue server.
///
/// Only `http` and `https` URLs with a host are accepted. Endpoint paths are
/// joined onto the base, so a trailing slash is added when missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    url: Url,
}

impl ServerAddress {
    /// Returns the underlying URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Joins an absolute API path such as `/api/status` onto the base.
    pub fn endpoint(&self, path: &str) -> Result<Url, ServerAddressError> {
        Ok(self.url.join(path.trim_start_matches('/'))?)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.url)
    }
}

impl FromStr for ServerAddress {
    type Err = ServerAddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut url = Url::parse(input)?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ServerAddressError::UnsupportedScheme(other.to_owned())),
        }
        if url.host_str().is_none() {
            return Err(ServerAddressError::MissingHost(input.to_owned()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { url })
    }
}

impl Serialize for ServerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.url.as_str())
    }
}

impl<'de> Deserialize<'de> for ServerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors encountered while parsing a [`ServerAddress`] from text.
#[derive(Debug, Error)]
pub enum ServerAddressError {
    /// Scheme was not `http` or `https`.
    #[error("unsupported server scheme '{0}'")]
    UnsupportedScheme(String),
    /// The URL had no host component.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_endpoints_below_a_path_prefix() {
        let address: ServerAddress = "http://queue.example:60610/qs".parse().expect("address");
        let endpoint = address.endpoint("/api/status").expect("join");
        assert_eq!(endpoint.as_str(), "http://queue.example:60610/qs/api/status");
    }

    #[test]
    fn rejects_non_http_schemes() {
        let error = "tcp://127.0.0.1:9000"
            .parse::<ServerAddress>()
            .expect_err("tcp is not an http scheme");
        assert!(matches!(error, ServerAddressError::UnsupportedScheme(_)));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let address: ServerAddress = "https://qs.example/".parse().expect("address");
        let reparsed: ServerAddress = address.to_string().parse().expect("reparse");
        assert_eq!(address, reparsed);
    }
}
