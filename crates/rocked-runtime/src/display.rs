//! X11 display forwarding.
//!
//! Containers reach the host X server either through the shared
//! `/tmp/.X11-unix` socket (local display, `:N`) or over TCP (remote
//! display, `host:N`, e.g. an SSH-forwarded session). A remote display is
//! rewritten to the host's own address as seen from the container network,
//! and the matching `xauth` cookies are replayed inside the container.

use std::net::{IpAddr, UdpSocket};
use std::process::Command;

use regex::Regex;
use rocked_common::error::{Result, RockedError};
use rocked_common::settings::Settings;
use rocked_common::types::XauthCookie;

/// Address used to pick the outbound interface. Nothing is sent.
const ROUTE_TARGET: (&str, u16) = ("192.168.255.254", 49152);

/// A parsed `DISPLAY` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySpec {
    /// Host part, empty for a local display.
    pub host: String,
    /// Display and optional screen, e.g. `10.0`.
    pub number: String,
}

impl DisplaySpec {
    /// Parses `[host]:N[.S]`.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::Config`] if the value has no `:` separator.
    pub fn parse(display: &str) -> Result<Self> {
        let (host, number) = display
            .rsplit_once(':')
            .ok_or_else(|| RockedError::config(format!("unsupported DISPLAY value `{display}`")))?;
        Ok(Self {
            host: host.to_string(),
            number: number.to_string(),
        })
    }

    /// Returns whether the display is served over the network.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        !self.host.is_empty()
    }

    /// Returns the display number without the screen suffix.
    #[must_use]
    pub fn display_id(&self) -> &str {
        self.number.split('.').next().unwrap_or_default()
    }

    /// Returns the address containers should use.
    #[must_use]
    pub fn forwarded(&self, host_ip: &str) -> String {
        if self.is_remote() {
            format!("{host_ip}:{}", self.number)
        } else {
            format!(":{}", self.number)
        }
    }
}

/// Returns the local address the kernel would route outbound traffic from.
///
/// # Errors
///
/// Returns [`RockedError::Io`] if no route is available.
pub fn host_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| RockedError::io("udp socket", e))?;
    socket
        .connect(ROUTE_TARGET)
        .and_then(|()| socket.local_addr())
        .map(|addr| addr.ip())
        .map_err(|e| RockedError::io("udp socket", e))
}

/// Extracts the cookies of one display from `xauth list` output.
///
/// Matching lines look like `<hostname>/unix:<id>  MIT-MAGIC-COOKIE-1  <hex>`;
/// the cookie display is `host_ip` followed by everything after the
/// hostname.
#[must_use]
pub fn parse_xauth_list(output: &str, hostname: &str, display_id: &str, host_ip: &str) -> Vec<XauthCookie> {
    let pattern = format!(
        r"^{}(.*:{})\s*MIT-MAGIC-COOKIE-1\s*(\S+)",
        regex::escape(hostname),
        regex::escape(display_id)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| re.captures(line.trim()))
        .map(|caps| XauthCookie {
            display: format!("{host_ip}{}", &caps[1]),
            cookie: caps[2].to_string(),
        })
        .collect()
}

/// Resolves the forwarded display and its cookies from the environment.
///
/// # Errors
///
/// Returns an error if `DISPLAY` is unset or malformed, or if the host
/// address cannot be determined for a remote display. A failing `xauth`
/// is logged and yields no cookies.
pub fn forward_from_env() -> Result<(String, Vec<XauthCookie>)> {
    let raw = std::env::var("DISPLAY").map_err(|_| RockedError::config("DISPLAY is not set"))?;
    forward(&raw)
}

/// Resolves the forwarded form of `raw` and the cookies that unlock it.
///
/// # Errors
///
/// Same as [`forward_from_env`], minus the `DISPLAY` lookup.
pub fn forward(raw: &str) -> Result<(String, Vec<XauthCookie>)> {
    let spec = DisplaySpec::parse(raw)?;
    let ip = if spec.is_remote() {
        host_ip()?.to_string()
    } else {
        String::new()
    };
    let forwarded = spec.forwarded(&ip);

    let hostname = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .map_err(|e| RockedError::runtime(format!("gethostname: {e}")))?;
    let cookies = match Command::new("xauth").arg("list").output() {
        Ok(out) if out.status.success() => parse_xauth_list(
            &String::from_utf8_lossy(&out.stdout),
            &hostname,
            spec.display_id(),
            &ip,
        ),
        Ok(out) => {
            tracing::warn!(status = %out.status, "xauth list failed");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "xauth not available");
            Vec::new()
        }
    };
    tracing::debug!(display = %forwarded, cookies = cookies.len(), "display resolved");
    Ok((forwarded, cookies))
}

/// Returns the `xauth add` commands to run inside a container.
///
/// Every cookie is replayed for a remote display; a local display only
/// needs the first cookie, bound to the local display address.
#[must_use]
pub fn xauth_commands(settings: &Settings) -> Vec<Vec<String>> {
    let add = |display: &str, cookie: &str| {
        vec![
            "xauth".to_string(),
            "add".to_string(),
            display.to_string(),
            ".".to_string(),
            cookie.to_string(),
        ]
    };
    if settings.display.starts_with(':') {
        settings
            .cookies
            .first()
            .map(|c| add(&settings.display, &c.cookie))
            .into_iter()
            .collect()
    } else {
        settings
            .cookies
            .iter()
            .map(|c| add(&c.display, &c.cookie))
            .collect()
    }
}
