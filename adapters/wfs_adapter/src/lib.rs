//! Blocking WFS client posting the `GetFeature` query for lighting frames.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use slm_core::domain::BoundingBox;
use slm_core::gml::Namespace;
use slm_core::ports::{FrameSource, Result};
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info};

/// Host serving the lighting layer.
pub const WFS_HOST: &str = "localhost:8080";
pub const WFS_PATH: &str = "/geoserver/wfs";

pub fn default_endpoint() -> String {
    format!("http://{WFS_HOST}{WFS_PATH}")
}

const GET_FEATURE_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:GetFeature service="WFS" version="1.1.0"
    xmlns:wfs="{wfs_ns}"
    xmlns:ogc="{ogc_ns}"
    xmlns:gml="{gml_ns}"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xsi:schemaLocation="http://www.opengis.net/wfs http://schemas.opengis.net/wfs/1.1.0/wfs.xsd">
  <wfs:Query typeName="slm:frm" srsName="EPSG:4326">
    <ogc:Filter>
      <ogc:BBOX>
        <ogc:PropertyName>smgeopoint</ogc:PropertyName>
        <gml:Envelope srsName="EPSG:4326">
          <gml:lowerCorner>{lower_lon} {lower_lat}</gml:lowerCorner>
          <gml:upperCorner>{upper_lon} {upper_lat}</gml:upperCorner>
        </gml:Envelope>
      </ogc:BBOX>
    </ogc:Filter>
  </wfs:Query>
</wfs:GetFeature>
"#;

/// Request body for `bbox`: corners go in as west/south and east/north.
pub fn get_feature_body(bbox: &BoundingBox) -> String {
    [
        ("{wfs_ns}", Namespace::WFS.0),
        ("{ogc_ns}", Namespace::OGC.0),
        ("{gml_ns}", Namespace::GML.0),
        ("{lower_lon}", bbox.west),
        ("{lower_lat}", bbox.south),
        ("{upper_lon}", bbox.east),
        ("{upper_lat}", bbox.north),
    ]
    .into_iter()
    .fold(GET_FEATURE_TEMPLATE.to_string(), |body, (placeholder, value)| {
        body.replace(placeholder, value)
    })
}

#[derive(Debug, Error)]
pub enum WfsError {
    #[error("could not build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("request to {endpoint} failed")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered {status}")]
    Status { endpoint: String, status: StatusCode },
}

/// FrameSource backed by a single blocking POST. No retries: a failed request
/// fails the run.
pub struct WfsClient {
    client: Client,
    endpoint: String,
}

impl WfsClient {
    pub fn new(endpoint: impl Into<String>) -> std::result::Result<Self, WfsError> {
        let client = Client::builder()
            .user_agent(concat!("slm-scraper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(WfsError::Client)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FrameSource for WfsClient {
    fn fetch(&self, bbox: &BoundingBox) -> Result<Box<dyn Read + Send>> {
        let body = get_feature_body(bbox);
        debug!(endpoint = %self.endpoint, bytes = body.len(), "posting GetFeature");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .map_err(|source| WfsError::Request {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WfsError::Status {
                endpoint: self.endpoint.clone(),
                status,
            }
            .into());
        }
        info!(%status, "feature service answered");
        Ok(Box::new(response))
    }
}
