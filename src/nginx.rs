// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Rendering of the nginx server block proxying an ingress host to a static origin.

use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Upstream location serving the static content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: Scheme,
    pub host: String,
    pub subpath: Option<String>,
}

impl Origin {
    pub fn new(scheme: Scheme, host: impl Into<String>, subpath: Option<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
            subpath,
        }
    }

    /// Origin host and subpath joined, without leading or trailing slashes
    pub fn full_origin(&self) -> String {
        let joined = match self.subpath.as_deref().filter(|p| !p.is_empty()) {
            Some(path) if path.starts_with('/') => format!("{}{}", self.host, path),
            Some(path) => format!("{}/{}", self.host, path),
            None => self.host.clone(),
        };
        joined.trim_matches('/').to_string()
    }

    /// The URL requests are proxied to
    pub fn upstream_url(&self) -> String {
        format!("{}://{}/", self.scheme, self.full_origin())
    }
}

/// Render the server block for `ingress_host`
pub fn render(origin: &Origin, ingress_host: &str) -> String {
    let upstream = origin.upstream_url();
    format!(
        r#"server {{
    listen 80;
    server_name {ingress_host};
    location / {{
        proxy_pass {upstream};
        proxy_set_header Host {origin_host};
        proxy_http_version 1.1;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;

        proxy_redirect {upstream} /;
    }}
}}
"#,
        origin_host = origin.host,
    )
}

/// Hex encoded sha256 of a rendered config
pub fn config_hash(config: &str) -> String {
    format!("{:x}", Sha256::digest(config.as_bytes()))
}
