//! Pairing URI (§6, exact): `wc:{topic}@{version}?controller={0|1}&publicKey={hex}&relay={url-encoded-json}`.

use {
    crate::domain::Relay,
    percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC},
    regex::Regex,
    std::{fmt, str::FromStr},
    url::Url,
};

pub const VERSION: &str = "2";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected scheme \"wc\", found \"{0}\"")]
    UnexpectedScheme(String),

    #[error(transparent)]
    Url(#[from] UrlParseErrorEq),

    #[error("failed to parse topic and version")]
    InvalidTopicAndVersion,

    #[error("controller parameter not found or invalid")]
    ControllerNotFound,

    #[error("publicKey parameter not found")]
    PublicKeyNotFound,

    #[error("publicKey is not valid hex: {0}")]
    InvalidPublicKey(String),

    #[error("relay parameter not found")]
    RelayNotFound,

    #[error("relay parameter is not valid JSON: {0}")]
    InvalidRelay(String),
}

/// Wraps [`url::ParseError`] so [`ParseError`] can derive `PartialEq`.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct UrlParseErrorEq(String);

impl From<url::ParseError> for UrlParseErrorEq {
    fn from(value: url::ParseError) -> Self {
        Self(value.to_string())
    }
}

/// A pairing bootstrap URI, carrying everything the responder needs to
/// start the handshake (§4.6 "Responder side — `pair(uri)`").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairingUri {
    pub topic: String,
    pub version: String,
    pub controller: bool,
    pub public_key: String,
    pub relay: Relay,
}

impl fmt::Display for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relay_json = serde_json::to_string(&self.relay).unwrap_or_default();
        let relay_encoded = utf8_percent_encode(&relay_json, NON_ALPHANUMERIC);
        write!(
            f,
            "wc:{}@{}?controller={}&publicKey={}&relay={}",
            self.topic,
            self.version,
            self.controller as u8,
            self.public_key,
            relay_encoded,
        )
    }
}

impl FromStr for PairingUri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(UrlParseErrorEq::from)?;

        if url.scheme() != "wc" {
            return Err(ParseError::UnexpectedScheme(url.scheme().to_owned()));
        }

        let (topic, version) = parse_topic_and_version(url.path())?;

        let mut controller = None;
        let mut public_key = None;
        let mut relay = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "controller" => {
                    controller = match value.as_ref() {
                        "0" => Some(false),
                        "1" => Some(true),
                        _ => None,
                    }
                }
                "publicKey" => public_key = Some(value.into_owned()),
                "relay" => relay = Some(value.into_owned()),
                // Unknown query keys are ignored (§6 "Parsing is strict;
                // unknown query keys are ignored").
                _ => {}
            }
        }

        let public_key = public_key.ok_or(ParseError::PublicKeyNotFound)?;
        hex::decode(&public_key).map_err(|e| ParseError::InvalidPublicKey(e.to_string()))?;

        let relay_json = relay.ok_or(ParseError::RelayNotFound)?;
        let relay: Relay = serde_json::from_str(&relay_json)
            .map_err(|e| ParseError::InvalidRelay(e.to_string()))?;

        Ok(Self {
            topic,
            version,
            controller: controller.ok_or(ParseError::ControllerNotFound)?,
            public_key,
            relay,
        })
    }
}

fn parse_topic_and_version(path: &str) -> Result<(String, String), ParseError> {
    let captures = Regex::new(r"^(?P<topic>[0-9a-fA-F]+)@(?P<version>\d+)$")
        .expect("static regex is valid")
        .captures(path)
        .ok_or(ParseError::InvalidTopicAndVersion)?;

    Ok((
        captures
            .name("topic")
            .ok_or(ParseError::InvalidTopicAndVersion)?
            .as_str()
            .to_owned(),
        captures
            .name("version")
            .ok_or(ParseError::InvalidTopicAndVersion)?
            .as_str()
            .to_owned(),
    ))
}

/// Decodes the percent-encoded `relay` query parameter value in isolation,
/// useful when assembling query strings by hand instead of via [`url::Url`].
pub fn decode_relay_param(value: &str) -> Result<Relay, ParseError> {
    let decoded = percent_decode_str(value)
        .decode_utf8()
        .map_err(|e| ParseError::InvalidRelay(e.to_string()))?;
    serde_json::from_str(&decoded).map_err(|e| ParseError::InvalidRelay(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_per_spec_exactly() {
        let uri = PairingUri {
            topic: "a".repeat(64),
            version: VERSION.to_owned(),
            controller: true,
            public_key: "b".repeat(64),
            relay: Relay::waku(),
        };

        let formatted = uri.to_string();
        let expected_prefix = format!(
            "wc:{}@2?controller=1&publicKey={}&relay=",
            "a".repeat(64),
            "b".repeat(64)
        );
        assert!(formatted.starts_with(&expected_prefix), "{formatted}");
        assert!(formatted.contains("%7B%22protocol%22%3A%22waku%22%7D"));
    }

    #[test]
    fn parse_is_inverse_of_format() {
        let uri = PairingUri {
            topic: "c".repeat(64),
            version: VERSION.to_owned(),
            controller: false,
            public_key: "d".repeat(64),
            relay: Relay::waku(),
        };

        let formatted = uri.to_string();
        let parsed: PairingUri = formatted.parse().unwrap();
        assert_eq!(parsed, uri);
    }

    #[test]
    fn unknown_query_keys_are_ignored() {
        let uri = PairingUri {
            topic: "e".repeat(64),
            version: VERSION.to_owned(),
            controller: true,
            public_key: "f".repeat(64),
            relay: Relay::waku(),
        };
        let mut with_extra = uri.to_string();
        with_extra.push_str("&unused=1");

        let parsed: PairingUri = with_extra.parse().unwrap();
        assert_eq!(parsed, uri);
    }

    #[test]
    fn rejects_wrong_scheme() {
        assert!(matches!(
            "http://example.org".parse::<PairingUri>(),
            Err(ParseError::UnexpectedScheme(_))
        ));
    }
}
