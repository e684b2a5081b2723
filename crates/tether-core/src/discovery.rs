// # Target Discovery
//
// Maps configured target strings to what the rest of the system needs:
// TCP endpoints go to the connection manager, everything else (serial and
// USB widgets) goes down a separate path the manager never sees.
//
// ## Accepted Forms
//
// | form                    | result            |
// |-------------------------|-------------------|
// | `10.0.0.5:6038`         | TCP endpoint      |
// | `tcp://10.0.0.5:6038`   | TCP endpoint      |
// | `[fe80::1]:5568`        | TCP endpoint      |
// | `serial:/dev/ttyUSB0`   | widget            |
// | `usb:/dev/ttyACM0`      | widget            |
// | `/dev/ttyUSB1`          | widget            |
//
// Anything else is a configuration error and never reaches the manager.

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A configured widget target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Reachable over TCP; managed by the connection manager
    Tcp(Endpoint),
    /// Attached locally (serial/USB device path)
    Widget(String),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::config("Empty target"));
        }

        if let Some(addr) = s.strip_prefix("tcp://") {
            return addr.parse().map(Target::Tcp);
        }

        if let Some(path) = s.strip_prefix("serial:").or_else(|| s.strip_prefix("usb:")) {
            if path.is_empty() {
                return Err(Error::config(format!("Target '{}' has no device path", s)));
            }
            return Ok(Target::Widget(path.to_string()));
        }

        if s.starts_with("/dev/") {
            return Ok(Target::Widget(s.to_string()));
        }

        s.parse()
            .map(Target::Tcp)
            .map_err(|_| Error::config(format!("Unrecognised target '{}'", s)))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp(endpoint) => write!(f, "tcp://{}", endpoint),
            Target::Widget(path) => write!(f, "serial:{}", path),
        }
    }
}

/// Targets split by how they are reached
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredTargets {
    /// TCP endpoints, deduplicated, in configuration order
    pub endpoints: Vec<Endpoint>,
    /// Local widget device paths, deduplicated, in configuration order
    pub widgets: Vec<String>,
}

impl DiscoveredTargets {
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty() && self.widgets.is_empty()
    }
}

/// Parse and split a list of target strings
///
/// # Errors
///
/// Returns [`Error::Config`] for the first target that does not parse.
pub fn resolve_targets<I, T>(targets: I) -> Result<DiscoveredTargets>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut discovered = DiscoveredTargets::default();
    let mut seen = HashSet::new();

    for raw in targets {
        let target: Target = raw.as_ref().parse()?;
        if !seen.insert(target.clone()) {
            continue;
        }
        match target {
            Target::Tcp(endpoint) => discovered.endpoints.push(endpoint),
            Target::Widget(path) => discovered.widgets.push(path),
        }
    }

    Ok(discovered)
}
