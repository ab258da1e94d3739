//! Declarative description of a network element and its validation.
//!
//! An element is validated once, when it is built, and is immutable after
//! that. Rendering it any number of times never changes it.
//!
//! ```rust
//! use sleuth::element::NetworkElement;
//!
//! let element = NetworkElement::builder("example.com", "Web server")
//!     .dns_record_types(["a", "mx"])
//!     .dns_servers(["8.8.8.8"])
//!     .ports(["t80", "t443"])
//!     .urls(["http://example.com"])
//!     .build()
//!     .unwrap();
//!
//! assert!(element.dns_configured());
//! assert_eq!(element.ports().unwrap().len(), 2);
//! ```

use crate::dns::{parse_nameservers, RecordKind};
use crate::http::parse_url;
use crate::network::PortSpec;
use crate::utils::{require_host, ProbeError};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElementError {
    #[error("element name must not be empty")]
    EmptyName,
    #[error("element {0}: kind must not be empty")]
    EmptyKind(String),
    #[error(
        "element {element}: dns_servers and dns_record_types must both be set or both be absent \
         (dns_servers set: {servers}, dns_record_types set: {record_types})"
    )]
    DnsMismatch {
        element: String,
        servers: bool,
        record_types: bool,
    },
    #[error("element {element}: {field} must not be an empty list")]
    EmptyList {
        element: String,
        field: &'static str,
    },
    #[error("element {element}: invalid {field}: {source}")]
    InvalidField {
        element: String,
        field: &'static str,
        #[source]
        source: ProbeError,
    },
    #[error("failed to read element file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse element file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkElement {
    name: String,
    kind: String,
    dns_record_types: Option<Vec<RecordKind>>,
    dns_servers: Option<Vec<IpAddr>>,
    ports: Option<Vec<PortSpec>>,
    urls: Option<Vec<String>>,
    note: Option<String>,
}

impl NetworkElement {
    pub fn builder(name: impl Into<String>, kind: impl Into<String>) -> NetworkElementBuilder {
        NetworkElementBuilder {
            name: name.into(),
            kind: kind.into(),
            ..NetworkElementBuilder::default()
        }
    }

    /// The web-server definition the tool ships with.
    pub fn sample() -> Result<Self, ElementError> {
        Self::builder("google.com", "Web server")
            .dns_record_types(["a"])
            .dns_servers(["8.8.8.8"])
            .ports(["t80", "t443"])
            .urls(["http://www.google.com", "https://google.com"])
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn dns_configured(&self) -> bool {
        self.dns_record_types.is_some() && self.dns_servers.is_some()
    }

    pub fn dns_record_types(&self) -> Option<&[RecordKind]> {
        self.dns_record_types.as_deref()
    }

    pub fn dns_servers(&self) -> Option<&[IpAddr]> {
        self.dns_servers.as_deref()
    }

    pub fn ports(&self) -> Option<&[PortSpec]> {
        self.ports.as_deref()
    }

    pub fn urls(&self) -> Option<&[String]> {
        self.urls.as_deref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

/// Collects raw, textual element settings; nothing is checked until
/// [`NetworkElementBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct NetworkElementBuilder {
    name: String,
    kind: String,
    dns_record_types: Option<Vec<String>>,
    dns_servers: Option<Vec<String>>,
    ports: Option<Vec<String>>,
    urls: Option<Vec<String>>,
    note: Option<String>,
}

fn collect<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl NetworkElementBuilder {
    pub fn dns_record_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_record_types = Some(collect(types));
        self
    }

    pub fn dns_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_servers = Some(collect(servers));
        self
    }

    pub fn ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = Some(collect(ports));
        self
    }

    pub fn urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = Some(collect(urls));
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn build(self) -> Result<NetworkElement, ElementError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ElementError::EmptyName);
        }
        require_host("name", &name).map_err(|source| ElementError::InvalidField {
            element: name.clone(),
            field: "name",
            source,
        })?;
        let kind = self.kind.trim().to_string();
        if kind.is_empty() {
            return Err(ElementError::EmptyKind(name));
        }

        if self.dns_servers.is_some() != self.dns_record_types.is_some() {
            return Err(ElementError::DnsMismatch {
                element: name,
                servers: self.dns_servers.is_some(),
                record_types: self.dns_record_types.is_some(),
            });
        }

        let invalid = |field: &'static str| {
            let element = name.clone();
            move |source: ProbeError| ElementError::InvalidField {
                element,
                field,
                source,
            }
        };
        let non_empty = |field: &'static str, list: Option<Vec<String>>| match list {
            Some(items) if items.is_empty() => Err(ElementError::EmptyList {
                element: name.clone(),
                field,
            }),
            other => Ok(other),
        };

        let dns_record_types = non_empty("dns_record_types", self.dns_record_types)?
            .map(|types| {
                types
                    .iter()
                    .map(|t| t.parse::<RecordKind>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(invalid("dns_record_types"))?;

        let dns_servers = non_empty("dns_servers", self.dns_servers)?
            .map(|servers| parse_nameservers(&servers))
            .transpose()
            .map_err(invalid("dns_servers"))?;

        let ports = non_empty("ports", self.ports)?
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| p.trim().parse::<PortSpec>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(invalid("ports"))?;

        let urls = non_empty("urls", self.urls)?
            .map(|urls| {
                urls.into_iter()
                    .map(|u| parse_url(&u).map(|_| u.trim().to_string()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(invalid("urls"))?;

        Ok(NetworkElement {
            name,
            kind,
            dns_record_types,
            dns_servers,
            ports,
            urls,
            note: self.note,
        })
    }
}

/// On-disk form of an element, as found in element files.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementDefinition {
    pub name: String,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub dns_record_types: Option<Vec<String>>,
    #[serde(default)]
    pub dns_servers: Option<Vec<String>>,
    #[serde(default)]
    pub ports: Option<Vec<String>>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ElementDefinition {
    pub fn build(self) -> Result<NetworkElement, ElementError> {
        NetworkElementBuilder {
            name: self.name,
            kind: self.kind,
            dns_record_types: self.dns_record_types,
            dns_servers: self.dns_servers,
            ports: self.ports,
            urls: self.urls,
            note: self.note,
        }
        .build()
    }
}

/// Parses element definitions from JSON: a single object or an array.
pub fn parse_elements(json: &str, path: &Path) -> Result<Vec<NetworkElement>, ElementError> {
    let parse_error = |source: serde_json::Error| ElementError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let value: serde_json::Value = serde_json::from_str(json).map_err(parse_error)?;
    let definitions = if value.is_array() {
        serde_json::from_value::<Vec<ElementDefinition>>(value)
    } else {
        serde_json::from_value::<ElementDefinition>(value).map(|def| vec![def])
    }
    .map_err(parse_error)?;

    definitions.into_iter().map(ElementDefinition::build).collect()
}

pub fn load_elements(path: &Path) -> Result<Vec<NetworkElement>, ElementError> {
    let json = std::fs::read_to_string(path).map_err(|source| ElementError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let elements = parse_elements(&json, path)?;
    log::info!("loaded {} element(s) from {}", elements.len(), path.display());
    Ok(elements)
}
