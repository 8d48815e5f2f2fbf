use crate::{ClientError, Result};
use jobq_core::DEFAULT_PORT;
use std::fmt;
use std::str::FromStr;

/// Address of a queue server: `tcp://host:port`, `tcp://host` or `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueUri {
    pub host: String,
    pub port: u16,
}

impl QueueUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = match uri.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(ClientError::InvalidUri(format!(
                    "unsupported scheme `{scheme}` in {uri}"
                )))
            }
            None => uri,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ClientError::InvalidUri(format!("bad port in {uri}")))?;
                (host, port)
            }
            None => (rest, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(ClientError::InvalidUri(format!("missing host in {uri}")));
        }

        Ok(QueueUri {
            host: host.to_string(),
            port,
        })
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for QueueUri {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        QueueUri::parse(s)
    }
}

impl fmt::Display for QueueUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}
