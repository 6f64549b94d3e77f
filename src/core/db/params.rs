//! Connection Parameters Module
//!
//! Holds the logical connection options and turns them into the
//! `KEY=value;...` connection string the native client expects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Charset requested when none is configured.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Client libraries at or below this major version speak the legacy
/// connection-string dialect.
pub const LEGACY_CLIENT_MAX_VERSION: i32 = 11;

/// Logical connection options, consumed once at connect time.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParameters {
    #[serde(alias = "userId", alias = "user")]
    pub userid: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "serverName")]
    pub servername: Option<String>,
    #[serde(alias = "databaseName")]
    pub databasename: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub charset: Option<String>,
}

impl ConnectionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds parameters from loosely named key/value pairs.
    ///
    /// Keys compare case-insensitively; unknown keys are ignored. A port that
    /// is not a number counts as absent.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        let mut params = ConnectionParameters::default();
        for (key, value) in pairs {
            let value = value.to_string();
            match key.as_ref().to_lowercase().as_str() {
                "userid" => params.userid = Some(value),
                "password" => params.password = Some(value),
                "servername" => params.servername = Some(value),
                "databasename" => params.databasename = Some(value),
                "host" => params.host = Some(value),
                "port" => params.port = value.trim().parse().ok(),
                "charset" => params.charset = Some(value),
                _ => {}
            }
        }
        params
    }

    pub fn with_userid(mut self, userid: impl Into<String>) -> Self {
        self.userid = Some(userid.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_servername(mut self, servername: impl Into<String>) -> Self {
        self.servername = Some(servername.into());
        self
    }

    pub fn with_databasename(mut self, databasename: impl Into<String>) -> Self {
        self.databasename = Some(databasename.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Builds the connection string.
    ///
    /// `legacy` selects the dialect of old client libraries: `ENG` instead of
    /// `SERVER` and `LINKS=tcpip(IP=...)` instead of `HOST`. Empty values are
    /// left out entirely; `CS` always appears and defaults to `utf-8`.
    pub fn connection_string(&self, legacy: bool) -> String {
        let mut pairs: Vec<(&str, String)> = Vec::with_capacity(6);

        if let Some(userid) = non_empty(&self.userid) {
            pairs.push(("UID", userid.to_string()));
        }
        if let Some(password) = non_empty(&self.password) {
            pairs.push(("PWD", password.to_string()));
        }
        if let Some(server) = non_empty(&self.servername) {
            let key = if legacy { "ENG" } else { "SERVER" };
            pairs.push((key, server.to_string()));
        }
        if let Some(database) = non_empty(&self.databasename) {
            pairs.push(("DBN", database.to_string()));
        }
        if let Some(host) = non_empty(&self.host) {
            let address = match self.port.filter(|p| *p != 0) {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            if legacy {
                pairs.push(("LINKS", format!("tcpip(IP={})", address)));
            } else {
                pairs.push(("HOST", address));
            }
        }
        let charset = non_empty(&self.charset).unwrap_or(DEFAULT_CHARSET);
        pairs.push(("CS", charset.to_string()));

        pairs
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Whether a client of the given major version needs the legacy dialect.
pub fn is_legacy_client(major_version: i32) -> bool {
    major_version <= LEGACY_CLIENT_MAX_VERSION
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("userid", &self.userid)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("servername", &self.servername)
            .field("databasename", &self.databasename)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("charset", &self.charset)
            .finish()
    }
}
