use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use image::RgbImage;
use owo_colors::OwoColorize;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use roxmltree::{Document, Node};
use urlencoding::encode;

use crate::constants::USER_AGENT;
use crate::dims::GeoBounds;

const WMS_HTTP_TIMEOUT_SECONDS: u64 = 60;
const RETRY_DELAY_SECONDS: u64 = 5;

/// One GetMap request: an extent rendered to a pixel size.
pub struct MapRequest<'a> {
    pub url: &'a str,
    pub version: &'a str,
    pub layer: &'a str,
    pub crs: &'a str,
    pub format: &'a str,
    pub bounds: GeoBounds,
    pub width: u32,
    pub height: u32,
}

pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(WMS_HTTP_TIMEOUT_SECONDS))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build WMS HTTP client")
}

pub fn build_getmap_url(request: &MapRequest<'_>) -> String {
    let bbox = format!(
        "{},{},{},{}",
        request.bounds.min_x, request.bounds.min_y, request.bounds.max_x, request.bounds.max_y
    );
    let width = request.width.to_string();
    let height = request.height.to_string();
    let params = [
        ("request", "GetMap"),
        ("service", "WMS"),
        ("version", request.version),
        ("layers", request.layer),
        ("format", request.format),
        ("crs", request.crs),
        ("width", &width),
        ("height", &height),
        ("bbox", &bbox),
    ];
    append_query(request.url, &params)
}

fn capabilities_url(base: &str, version: &str) -> String {
    let params = [
        ("request", "GetCapabilities"),
        ("service", "WMS"),
        ("version", version),
    ];
    append_query(base, &params)
}

fn append_query(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    if !url.contains('?') {
        url.push('?');
    } else if !url.ends_with('?') && !url.ends_with('&') {
        url.push('&');
    }
    for (index, (key, value)) in params.iter().enumerate() {
        if index > 0 {
            url.push('&');
        }
        url.push_str(key);
        url.push('=');
        url.push_str(&encode(value));
    }
    url
}

/// Fetches one map image, retrying on gateway timeouts and transport
/// errors with a fixed delay. Any other non-success status fails
/// immediately; so does a response that decodes to the wrong pixel size.
pub fn fetch_map(client: &Client, request: &MapRequest<'_>, tries: usize) -> Result<RgbImage> {
    if tries == 0 {
        bail!("WMS fetch requires at least one try");
    }
    let url = build_getmap_url(request);

    let mut attempt = 0;
    let bytes = loop {
        attempt += 1;
        let response = match client.get(&url).send() {
            Ok(response) => response,
            Err(err) => {
                if attempt < tries {
                    println!(
                        "  {} WMS request failed ({err}), retrying in {}s ({}/{})",
                        "↻".yellow(),
                        RETRY_DELAY_SECONDS,
                        attempt,
                        tries
                    );
                    thread::sleep(Duration::from_secs(RETRY_DELAY_SECONDS));
                    continue;
                }
                return Err(err).context("WMS GetMap request failed");
            }
        };
        let status = response.status();
        if status.is_success() {
            break response.bytes().context("Failed to read WMS response body")?;
        }
        if status == StatusCode::GATEWAY_TIMEOUT && attempt < tries {
            println!(
                "  {} WMS request timed out, retrying in {}s ({}/{})",
                "↻".yellow(),
                RETRY_DELAY_SECONDS,
                attempt,
                tries
            );
            thread::sleep(Duration::from_secs(RETRY_DELAY_SECONDS));
            continue;
        }
        bail!("WMS GetMap request returned status {status}");
    };

    let image = image::load_from_memory(&bytes)
        .context("Failed to decode WMS image response")?
        .into_rgb8();
    if image.dimensions() != (request.width, request.height) {
        bail!(
            "WMS returned a {}x{} image, expected {}x{}",
            image.width(),
            image.height(),
            request.width,
            request.height
        );
    }
    Ok(image)
}

pub struct WmsCapabilities {
    pub layers: Vec<String>,
    pub formats: Vec<String>,
}

pub fn fetch_capabilities(client: &Client, base: &str, version: &str) -> Result<WmsCapabilities> {
    let url = capabilities_url(base, version);
    let response = client
        .get(&url)
        .send()
        .with_context(|| format!("Failed to download WMS capabilities from {base}"))?;
    let status = response.status();
    if !status.is_success() {
        bail!("WMS capabilities request returned status {status}");
    }
    let xml = response
        .text()
        .context("Failed to read WMS capabilities body")?;
    parse_capabilities(&xml)
}

pub fn parse_capabilities(xml: &str) -> Result<WmsCapabilities> {
    let doc = Document::parse(xml).context("Failed to parse WMS capabilities XML")?;
    let root = doc.root_element();
    let capability = root
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "Capability")
        .ok_or_else(|| anyhow!("WMS capabilities missing Capability element"))?;

    let mut layers = Vec::new();
    for layer in capability
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "Layer")
    {
        if let Some(name) = child_text(layer, "Name") {
            layers.push(name.trim().to_string());
        }
    }

    let formats = capability
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "GetMap")
        .map(|getmap| {
            getmap
                .children()
                .filter(|node| node.is_element() && node.tag_name().name() == "Format")
                .filter_map(|node| node.text())
                .map(|text| text.trim().to_string())
                .collect()
        })
        .unwrap_or_default();

    Ok(WmsCapabilities { layers, formats })
}

/// Checks the requested layer and image format against the capabilities
/// before any tile is fetched.
pub fn ensure_layer(capabilities: &WmsCapabilities, layer: &str, format: &str) -> Result<()> {
    if !capabilities.layers.iter().any(|name| name == layer) {
        bail!("WMS service does not offer layer '{layer}'");
    }
    if !capabilities.formats.is_empty()
        && !capabilities
            .formats
            .iter()
            .any(|fmt| fmt.eq_ignore_ascii_case(format))
    {
        bail!("WMS service does not list format '{format}' for GetMap");
    }
    Ok(())
}

fn child_text<'a>(node: Node<'a, 'a>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
        .and_then(|child| child.text())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> MapRequest<'static> {
        MapRequest {
            url: "https://example.test/wms",
            version: "1.3.0",
            layer: "geodanmark_2023_12_5cm",
            crs: "EPSG:25832",
            format: "image/png",
            bounds: GeoBounds::new(720000.0, 6210000.0, 721000.0, 6211000.0).unwrap(),
            width: 8000,
            height: 8000,
        }
    }

    #[test]
    fn getmap_url_carries_all_parameters() {
        let url = build_getmap_url(&request());
        assert!(url.starts_with("https://example.test/wms?request=GetMap&service=WMS"));
        assert!(url.contains("version=1.3.0"));
        assert!(url.contains("layers=geodanmark_2023_12_5cm"));
        assert!(url.contains("format=image%2Fpng"));
        assert!(url.contains("crs=EPSG%3A25832"));
        assert!(url.contains("width=8000"));
        assert!(url.contains("height=8000"));
        assert!(url.contains("bbox=720000%2C6210000%2C721000%2C6211000"));
    }

    #[test]
    fn getmap_url_extends_existing_query() {
        let mut req = request();
        req.url = "https://example.test/wms?token=abc";
        let url = build_getmap_url(&req);
        assert!(url.starts_with("https://example.test/wms?token=abc&request=GetMap"));
    }

    #[test]
    fn capabilities_parsing_extracts_layers_and_formats() {
        let xml = r#"<?xml version="1.0"?>
            <WMS_Capabilities version="1.3.0">
              <Service><Name>WMS</Name></Service>
              <Capability>
                <Request>
                  <GetMap>
                    <Format>image/png</Format>
                    <Format>image/jpeg</Format>
                  </GetMap>
                </Request>
                <Layer>
                  <Title>root</Title>
                  <Layer><Name>geodanmark_2023_12_5cm</Name></Layer>
                  <Layer><Name>geodanmark_2023_12_5cm_cir</Name></Layer>
                </Layer>
              </Capability>
            </WMS_Capabilities>"#;
        let capabilities = parse_capabilities(xml).unwrap();
        assert_eq!(
            capabilities.layers,
            vec!["geodanmark_2023_12_5cm", "geodanmark_2023_12_5cm_cir"]
        );
        assert_eq!(capabilities.formats, vec!["image/png", "image/jpeg"]);

        assert!(ensure_layer(&capabilities, "geodanmark_2023_12_5cm", "image/png").is_ok());
        assert!(ensure_layer(&capabilities, "missing_layer", "image/png").is_err());
        assert!(ensure_layer(&capabilities, "geodanmark_2023_12_5cm", "image/tiff").is_err());
    }
}
