use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use serde::Deserialize;

/// Runtime settings for the control plane. Everything a component needs is
/// handed to it explicitly at construction time; nothing reads this struct
/// through a global.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// URL scheme used when dialing node agents. Production nodes speak
    /// https with self-signed certificates; tests run plain-http mocks.
    pub node_scheme: String,
    /// Seconds between node health polls.
    pub poll_interval_secs: u64,
    /// Disk utilization above which a node stops accepting placements.
    pub placement_threshold: f64,
    pub captcha_secret: String,
    pub captcha_required: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "localhost".to_string(),
            port: 8902,
            node_scheme: "https".to_string(),
            poll_interval_secs: 180,
            placement_threshold: 0.9,
            captcha_secret: "".to_string(),
            captcha_required: false,
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "could not read settings file: {}", e),
            Error::Parse(e) => write!(f, "could not parse settings file: {}", e),
        }
    }
}

pub fn load_settings(path: &str) -> Result<Settings, Error> {
    let file = File::open(path).map_err(Error::Io)?;
    let reader = BufReader::new(file);
    let settings = serde_json::from_reader(reader).map_err(Error::Parse)?;
    Ok(settings)
}
