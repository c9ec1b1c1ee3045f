// CLIP v2 HTTP client
//
// Typed wrappers over the bridge endpoints the integration uses. URL
// construction, credential headers and `{ errors, data }` envelope
// unwrapping live here; the wire itself goes through `HttpTransport`.

use std::sync::Arc;

use reqwest::header::{ACCEPT, CONNECTION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::{Device, Light, ZigbeeConnectivity};
use crate::transport::{ByteStream, HttpResponse, HttpTransport, ReqwestTransport, TransportConfig};

/// Header carrying the application key on every request.
pub const APPLICATION_KEY_HEADER: &str = "hue-application-key";

const EVENT_STREAM_PATH: &str = "/eventstream/clip/v2";
const RESOURCE_PATH: &str = "/clip/v2/resource";

/// CLIP v2 response envelope: `{ "errors": [...], "data": [...] }`.
#[derive(Debug, Deserialize)]
struct ClipResponse<T> {
    #[serde(default)]
    errors: Vec<ClipError>,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ClipError {
    description: String,
}

/// Every resource of interest on a bridge, split by type.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    pub devices: Vec<Device>,
    pub lights: Vec<Light>,
    pub connectivity: Vec<ZigbeeConnectivity>,
}

/// Client for one or more bridges sharing a transport.
///
/// Stateless apart from the transport: every call names the bridge
/// address and application key explicitly, since addresses are resolved
/// (and re-resolved) by the caller.
#[derive(Clone)]
pub struct BridgeClient {
    transport: Arc<dyn HttpTransport>,
}

impl BridgeClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Build a client backed by [`ReqwestTransport`].
    pub fn from_config(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::new(Arc::new(ReqwestTransport::new(config)?)))
    }

    // ── URL / header builders ────────────────────────────────────────

    /// `https://{address}{path}`, or `{address}{path}` when the address
    /// already carries a scheme.
    pub fn bridge_url(address: &str, path: &str) -> Result<Url, Error> {
        let base = address.trim_end_matches('/');
        let full = if base.contains("://") {
            format!("{base}{path}")
        } else {
            format!("https://{base}{path}")
        };
        Ok(Url::parse(&full)?)
    }

    fn headers(key: &SecretString) -> Result<HeaderMap, Error> {
        let mut value = HeaderValue::from_str(key.expose_secret())?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(APPLICATION_KEY_HEADER, value);
        Ok(headers)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `PUT /clip/v2/resource/light/{id}` with a sparse light update.
    pub async fn put_light(
        &self,
        address: &str,
        key: &SecretString,
        light_id: &str,
        update: &Light,
    ) -> Result<(), Error> {
        let url = Self::bridge_url(address, &format!("{RESOURCE_PATH}/light/{light_id}"))?;
        let body = serde_json::to_value(update).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        debug!(light_id, %body, "sending light update");

        let resp = self.transport.put(&url, &Self::headers(key)?, &body).await?;
        let _: Vec<serde_json::Value> = parse_envelope(&resp)?;
        Ok(())
    }

    /// `GET /clip/v2/resource/light/{id}`.
    pub async fn get_light(
        &self,
        address: &str,
        key: &SecretString,
        light_id: &str,
    ) -> Result<Vec<Light>, Error> {
        let url = Self::bridge_url(address, &format!("{RESOURCE_PATH}/light/{light_id}"))?;
        let resp = self.transport.get(&url, &Self::headers(key)?).await?;
        parse_envelope(&resp)
    }

    /// `GET /clip/v2/resource`, split into the resource types the
    /// integration understands. Other types are ignored and undecodable
    /// entries skipped.
    pub async fn list_resources(
        &self,
        address: &str,
        key: &SecretString,
    ) -> Result<ResourceSnapshot, Error> {
        let url = Self::bridge_url(address, RESOURCE_PATH)?;
        let resp = self.transport.get(&url, &Self::headers(key)?).await?;
        let raw: Vec<serde_json::Value> = parse_envelope(&resp)?;

        let mut snapshot = ResourceSnapshot::default();
        for value in raw {
            let Some(kind) = value.get("type").and_then(serde_json::Value::as_str) else {
                continue;
            };
            let result = match kind {
                "device" => decode(&value).map(|d| snapshot.devices.push(d)),
                "light" => decode(&value).map(|l| snapshot.lights.push(l)),
                "zigbee_connectivity" => decode(&value).map(|c| snapshot.connectivity.push(c)),
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!(error = %e, kind, "skipping undecodable resource");
            }
        }

        debug!(
            devices = snapshot.devices.len(),
            lights = snapshot.lights.len(),
            connectivity = snapshot.connectivity.len(),
            "resource listing complete"
        );
        Ok(snapshot)
    }

    /// Open `GET /eventstream/clip/v2` and hand back the raw body stream.
    pub async fn open_event_stream(
        &self,
        address: &str,
        key: &SecretString,
    ) -> Result<ByteStream, Error> {
        let url = Self::bridge_url(address, EVENT_STREAM_PATH)?;
        let mut headers = Self::headers(key)?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        self.transport.stream(&url, &headers).await
    }
}

fn decode<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

/// Reject non-200 statuses and CLIP errors, returning `data` otherwise.
fn parse_envelope<T: DeserializeOwned>(resp: &HttpResponse) -> Result<Vec<T>, Error> {
    if !resp.is_ok() {
        return Err(Error::Status {
            status: resp.status,
            body: resp.text(),
        });
    }
    if resp.body.is_empty() {
        return Ok(Vec::new());
    }

    let envelope: ClipResponse<T> = serde_json::from_slice(&resp.body)
        .map_err(|e| Error::deserialization(&e, &resp.body))?;

    if !envelope.errors.is_empty() {
        return Err(Error::Bridge {
            messages: envelope.errors.into_iter().map(|e| e.description).collect(),
        });
    }
    Ok(envelope.data)
}
