use anyhow::{Result, bail};

/// Resolves the WMS layer name for a known imagery service.
///
/// Only the Danish GeoDanmark orthophoto service is implemented; its layer
/// names encode year, ground resolution and band order, e.g.
/// `geodanmark_2023_12_5cm` or `geodanmark_2023_10cm_cir`.
pub fn layer_name(
    service: &str,
    year: u32,
    resolution: f64,
    season: &str,
    bands: &str,
) -> Result<String> {
    match service.to_ascii_lowercase().as_str() {
        "dk" | "denmark" => {
            let res = if resolution == 0.1 { "10" } else { "12_5" };
            let bands = match bands.to_ascii_lowercase().as_str() {
                "rgb" | "" => "",
                "cir" => "_cir",
                other => bail!("Unknown band order '{other}' (expected rgb or cir)"),
            };
            match season.to_ascii_lowercase().as_str() {
                "spring" | "" => Ok(format!("geodanmark_{year}_{res}cm{bands}")),
                other => bail!("Service 'dk' has no '{other}' imagery (only spring)"),
            }
        }
        other => bail!("Only the 'dk' service has been implemented (got '{other}')"),
    }
}
