//! Reverse-geocoding providers: the Nominatim HTTP client and address formatting.

use super::types::GeocodeError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_LANGUAGE: &str = "en";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ZOOM_LEVEL: u8 = 18;
const USER_AGENT: &str = concat!("traccar-enrich/", env!("CARGO_PKG_VERSION"));

/// Source of raw address components for a coordinate.
///
/// The cache owns one of these; tests substitute a counting fake.
pub trait ReverseGeocoder: Send + Sync {
    fn reverse(&self, lat: f64, lon: f64) -> Result<Map<String, Value>, GeocodeError>;
}

// ─── Nominatim ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Map<String, Value>>,
}

pub struct NominatimClient {
    agent: ureq::Agent,
    server_url: String,
    language: String,
}

impl NominatimClient {
    pub fn new(server_url: &str, language: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(REQUEST_TIMEOUT)
            .timeout_read(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build();

        Self {
            agent,
            server_url: server_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

impl ReverseGeocoder for NominatimClient {
    fn reverse(&self, lat: f64, lon: f64) -> Result<Map<String, Value>, GeocodeError> {
        let url = reverse_url(&self.server_url, lat, lon, &self.language);
        tracing::debug!("Nominatim request: {}", url);

        let response = match self.agent.get(&url).call() {
            Ok(r) => r,
            Err(ureq::Error::Status(status, r)) => {
                let body = r.into_string().unwrap_or_default();
                return Err(GeocodeError::Status { status, body });
            }
            Err(e) => return Err(GeocodeError::Network(e.to_string())),
        };

        let parsed: ReverseResponse = response
            .into_json()
            .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

        parsed.address.ok_or(GeocodeError::NoAddress)
    }
}

/// Build the reverse-geocoding URL for a coordinate.
pub fn reverse_url(server_url: &str, lat: f64, lon: f64, language: &str) -> String {
    format!(
        "{}/reverse?format=json&lat={:.6}&lon={:.6}&accept-language={}&zoom={}&addressdetails=1",
        server_url.trim_end_matches('/'),
        lat,
        lon,
        urlencode(language),
        ZOOM_LEVEL,
    )
}

// ─── Address formatting ─────────────────────────────────────────

const CITY_KEYS: &[&str] = &["city", "town", "village", "municipality"];
const PROVINCE_KEYS: &[&str] = &["state", "province", "region"];

/// Format Nominatim address components as
/// `"<road> <number>, <postcode> <city>, <province>, <country>"`.
///
/// Missing parts are left out along with their separator. Returns `None` if
/// no component is present at all.
pub fn format_address(components: &Map<String, Value>) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if let Some(road) = component(components, "road") {
        match component(components, "house_number") {
            Some(number) => parts.push(format!("{} {}", road, number)),
            None => parts.push(road),
        }
    }

    let postcode = component(components, "postcode");
    let city = first_component(components, CITY_KEYS);
    match (postcode, city) {
        (Some(p), Some(c)) => parts.push(format!("{} {}", p, c)),
        (Some(p), None) => parts.push(p),
        (None, Some(c)) => parts.push(c),
        (None, None) => {}
    }

    if let Some(province) = first_component(components, PROVINCE_KEYS) {
        parts.push(province);
    }

    if let Some(country) = component(components, "country") {
        parts.push(country);
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn first_component(components: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| component(components, k))
}

/// A single component as text. Null, blank and structured values count as absent.
fn component(components: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match components.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ─── URL encoding (minimal, no extra dep) ───────────────────────

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn components(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_format_full_address() {
        let c = components(json!({
            "road": "Main St",
            "house_number": "5",
            "postcode": "1000",
            "city": "Town",
            "country": "Country",
        }));
        assert_eq!(format_address(&c).as_deref(), Some("Main St 5, 1000 Town, Country"));
    }

    #[test]
    fn test_format_country_only() {
        let c = components(json!({"country": "Country"}));
        assert_eq!(format_address(&c).as_deref(), Some("Country"));
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(format_address(&Map::new()), None);
    }

    #[test]
    fn test_format_house_number_without_road_is_dropped() {
        let c = components(json!({"house_number": "12", "city": "Aarhus"}));
        assert_eq!(format_address(&c).as_deref(), Some("Aarhus"));
    }

    #[test]
    fn test_format_city_fallback_order() {
        let c = components(json!({"village": "Smallby", "municipality": "Bigkommune"}));
        assert_eq!(format_address(&c).as_deref(), Some("Smallby"));

        let c = components(json!({"town": "Middleton", "village": "Smallby"}));
        assert_eq!(format_address(&c).as_deref(), Some("Middleton"));

        let c = components(json!({"municipality": "Bigkommune", "postcode": "8000"}));
        assert_eq!(format_address(&c).as_deref(), Some("8000 Bigkommune"));
    }

    #[test]
    fn test_format_postcode_without_city() {
        let c = components(json!({"road": "Strandvejen", "postcode": "2900", "country": "Danmark"}));
        assert_eq!(format_address(&c).as_deref(), Some("Strandvejen, 2900, Danmark"));
    }

    #[test]
    fn test_format_province_fallback() {
        let c = components(json!({"city": "Odense", "region": "Syddanmark", "country": "Danmark"}));
        assert_eq!(format_address(&c).as_deref(), Some("Odense, Syddanmark, Danmark"));

        let c = components(json!({"state": "Bayern", "province": "Other"}));
        assert_eq!(format_address(&c).as_deref(), Some("Bayern"));
    }

    #[test]
    fn test_format_null_and_blank_are_absent() {
        let c = components(json!({"road": null, "city": "  ", "country": "Sverige"}));
        assert_eq!(format_address(&c).as_deref(), Some("Sverige"));
    }

    #[test]
    fn test_format_numeric_component() {
        let c = components(json!({"road": "Vestergade", "house_number": 7}));
        assert_eq!(format_address(&c).as_deref(), Some("Vestergade 7"));
    }

    #[test]
    fn test_reverse_url() {
        let url = reverse_url("https://nominatim.example.org/", 55.676098, 12.568337, "da");
        assert_eq!(
            url,
            "https://nominatim.example.org/reverse?format=json&lat=55.676098&lon=12.568337\
             &accept-language=da&zoom=18&addressdetails=1"
        );
    }

    #[test]
    fn test_reverse_url_rounds_and_encodes() {
        let url = reverse_url("http://localhost:8080", -33.8688197, 151.2092957, "en-US,en;q=0.8");
        assert!(url.contains("lat=-33.868820&lon=151.209296"));
        assert!(url.contains("accept-language=en-US%2Cen%3Bq%3D0.8"));
    }

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = NominatimClient::new("https://nominatim.example.org/", "en");
        assert_eq!(client.server_url(), "https://nominatim.example.org");
    }

    #[test]
    fn test_client_unreachable_is_network_error() {
        // Nothing listens on the discard port locally.
        let client = NominatimClient::new("http://127.0.0.1:9", "en");
        let err = client.reverse(0.0, 0.0).unwrap_err();
        assert!(matches!(err, GeocodeError::Network(_)), "got {:?}", err);
    }
}
