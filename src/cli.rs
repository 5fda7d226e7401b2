use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};

use crate::constants::{DEFAULT_IMAGE_FORMAT, DEFAULT_MAX_AXIS_PIXELS, DEFAULT_WMS_VERSION};
use crate::dims::{GeoBounds, Padding};

const USAGE: &str = "Usage: wmsfetch fetch --url <wms-url> --res <units-per-pixel> --out <file.tif>
                      (--bounds minx,miny,maxx,maxy --crs <code> | --grid <name> --cell <index>)
                      (--layer <name> | --service <name> --year <year> [--season <s>] [--bands rgb|cir])
                      [--max-len <pixels>] [--padding <p>|<py,px>] [--buffer <units>]
                      [--tries <n>] [--format <mime>] [--wms-version <v>] [--no-check] [--overwrite]
       wmsfetch plan (--bounds minx,miny,maxx,maxy | --grid <name> --cell <index>) --res <units-per-pixel>
                      [--max-len <pixels>] [--buffer <units>] [--out <plan.geojson>]";

pub enum Command {
    Fetch(FetchConfig),
    Plan(PlanConfig),
}

/// Area of interest: explicit bounds or a named grid cell.
pub enum AreaOfInterest {
    Bounds(GeoBounds),
    GridCell { grid: String, cell: String },
}

/// Layer selection: a literal name or a catalog template lookup.
pub enum LayerSpec {
    Named(String),
    Catalog {
        service: String,
        year: u32,
        season: String,
        bands: String,
    },
}

pub struct FetchConfig {
    pub url: String,
    pub area: AreaOfInterest,
    pub layer: LayerSpec,
    pub crs: Option<String>,
    pub resolution: f64,
    pub out: PathBuf,
    pub max_len: u32,
    pub padding: Option<Padding>,
    pub buffer: f64,
    pub tries: usize,
    pub format: String,
    pub version: String,
    pub check_capabilities: bool,
    pub overwrite: bool,
}

pub struct PlanConfig {
    pub area: AreaOfInterest,
    pub resolution: f64,
    pub max_len: u32,
    pub buffer: f64,
    pub out: Option<PathBuf>,
}

pub fn parse_args(args: &[String]) -> Result<Command> {
    if args.is_empty() {
        bail!("No arguments supplied.\n{USAGE}");
    }

    match args[0].as_str() {
        "fetch" => parse_fetch(&args[1..]).map(Command::Fetch),
        "plan" => parse_plan(&args[1..]).map(Command::Plan),
        "--help" | "-h" => {
            println!("{USAGE}");
            std::process::exit(0);
        }
        other => bail!("Unknown command '{other}'.\n{USAGE}"),
    }
}

/// Matches `--name value` and `--name=value`, advancing the cursor for the
/// two-token form.
fn flag_value<'a>(args: &'a [String], i: &mut usize, name: &str) -> Result<Option<&'a str>> {
    let arg = &args[*i];
    if let Some(rest) = arg.strip_prefix("--") {
        if let Some(value) = rest.strip_prefix(name).and_then(|v| v.strip_prefix('=')) {
            return Ok(Some(value));
        }
        if rest == name {
            *i += 1;
            if *i >= args.len() {
                bail!("Missing value for --{name}\n{USAGE}");
            }
            return Ok(Some(&args[*i]));
        }
    }
    Ok(None)
}

fn parse_fetch(args: &[String]) -> Result<FetchConfig> {
    let mut url = None;
    let mut bounds = None;
    let mut grid = None;
    let mut cell = None;
    let mut layer = None;
    let mut service = None;
    let mut year = None;
    let mut season = None;
    let mut bands = None;
    let mut crs = None;
    let mut resolution = None;
    let mut out = None;
    let mut max_len = None;
    let mut padding = None;
    let mut buffer = None;
    let mut tries = None;
    let mut format = None;
    let mut version = None;
    let mut check_capabilities = true;
    let mut overwrite = false;

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--help" || arg == "-h" {
            println!("{USAGE}");
            std::process::exit(0);
        } else if arg == "--no-check" {
            check_capabilities = false;
        } else if arg == "--overwrite" {
            overwrite = true;
        } else if let Some(value) = flag_value(args, &mut i, "url")? {
            url = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "bounds")? {
            bounds = Some(parse_bounds(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "grid")? {
            grid = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "cell")? {
            cell = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "layer")? {
            layer = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "service")? {
            service = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "year")? {
            year = Some(
                value
                    .parse::<u32>()
                    .map_err(|_| anyhow!("Invalid year '{value}'"))?,
            );
        } else if let Some(value) = flag_value(args, &mut i, "season")? {
            season = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "bands")? {
            bands = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "crs")? {
            crs = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "res")? {
            resolution = Some(parse_resolution(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "out")? {
            out = Some(PathBuf::from(value));
        } else if let Some(value) = flag_value(args, &mut i, "max-len")? {
            max_len = Some(parse_max_len(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "padding")? {
            padding = Some(parse_padding(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "buffer")? {
            buffer = Some(parse_buffer(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "tries")? {
            tries = Some(parse_tries(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "format")? {
            format = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "wms-version")? {
            version = Some(value.to_string());
        } else {
            bail!("Unexpected argument: {arg}\n{USAGE}");
        }
        i += 1;
    }

    let url = url.ok_or_else(|| anyhow!("Missing --url\n{USAGE}"))?;
    let resolution = resolution.ok_or_else(|| anyhow!("Missing --res\n{USAGE}"))?;
    let out = out.ok_or_else(|| anyhow!("Missing --out\n{USAGE}"))?;
    let area = assemble_area(bounds, grid, cell)?;
    if matches!(area, AreaOfInterest::Bounds(_)) && crs.is_none() {
        bail!("--bounds requires --crs\n{USAGE}");
    }

    let layer = match (layer, service) {
        (Some(_), Some(_)) => bail!("--layer and --service are mutually exclusive\n{USAGE}"),
        (Some(name), None) => LayerSpec::Named(name),
        (None, Some(service)) => LayerSpec::Catalog {
            service,
            year: year.ok_or_else(|| anyhow!("--service requires --year\n{USAGE}"))?,
            season: season.unwrap_or_else(|| "spring".to_string()),
            bands: bands.unwrap_or_else(|| "rgb".to_string()),
        },
        (None, None) => bail!("Provide --layer or --service\n{USAGE}"),
    };

    Ok(FetchConfig {
        url,
        area,
        layer,
        crs,
        resolution,
        out,
        max_len: max_len.unwrap_or(DEFAULT_MAX_AXIS_PIXELS),
        padding,
        buffer: buffer.unwrap_or(0.0),
        tries: tries.unwrap_or(3),
        format: format.unwrap_or_else(|| DEFAULT_IMAGE_FORMAT.to_string()),
        version: version.unwrap_or_else(|| DEFAULT_WMS_VERSION.to_string()),
        check_capabilities,
        overwrite,
    })
}

fn parse_plan(args: &[String]) -> Result<PlanConfig> {
    let mut bounds = None;
    let mut grid = None;
    let mut cell = None;
    let mut resolution = None;
    let mut max_len = None;
    let mut buffer = None;
    let mut out = None;

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--help" || arg == "-h" {
            println!("{USAGE}");
            std::process::exit(0);
        } else if let Some(value) = flag_value(args, &mut i, "bounds")? {
            bounds = Some(parse_bounds(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "grid")? {
            grid = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "cell")? {
            cell = Some(value.to_string());
        } else if let Some(value) = flag_value(args, &mut i, "res")? {
            resolution = Some(parse_resolution(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "max-len")? {
            max_len = Some(parse_max_len(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "buffer")? {
            buffer = Some(parse_buffer(value)?);
        } else if let Some(value) = flag_value(args, &mut i, "out")? {
            out = Some(PathBuf::from(value));
        } else {
            bail!("Unexpected argument: {arg}\n{USAGE}");
        }
        i += 1;
    }

    Ok(PlanConfig {
        area: assemble_area(bounds, grid, cell)?,
        resolution: resolution.ok_or_else(|| anyhow!("Missing --res\n{USAGE}"))?,
        max_len: max_len.unwrap_or(DEFAULT_MAX_AXIS_PIXELS),
        buffer: buffer.unwrap_or(0.0),
        out,
    })
}

fn assemble_area(
    bounds: Option<GeoBounds>,
    grid: Option<String>,
    cell: Option<String>,
) -> Result<AreaOfInterest> {
    match (bounds, grid, cell) {
        (Some(bounds), None, None) => Ok(AreaOfInterest::Bounds(bounds)),
        (None, Some(grid), Some(cell)) => Ok(AreaOfInterest::GridCell { grid, cell }),
        (None, Some(_), None) => bail!("--grid requires --cell\n{USAGE}"),
        (None, None, Some(_)) => bail!("--cell requires --grid\n{USAGE}"),
        (Some(_), _, _) => bail!("--bounds and --grid are mutually exclusive\n{USAGE}"),
        (None, None, None) => bail!("Provide --bounds or --grid/--cell\n{USAGE}"),
    }
}

fn parse_bounds(value: &str) -> Result<GeoBounds> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        bail!("Bounds '{value}' must be minx,miny,maxx,maxy");
    }
    let mut numbers = [0.0; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid bounds coordinate '{part}'"))?;
    }
    GeoBounds::new(numbers[0], numbers[1], numbers[2], numbers[3])
        .with_context(|| format!("Invalid bounds '{value}'"))
}

fn parse_padding(value: &str) -> Result<Padding> {
    if let Some((y, x)) = value.split_once(',') {
        let y = y
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid padding component '{y}'"))?;
        let x = x
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid padding component '{x}'"))?;
        Ok(Padding::PerAxis { y, x })
    } else {
        let both = value
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid padding '{value}'"))?;
        Ok(Padding::Uniform(both))
    }
}

fn parse_resolution(value: &str) -> Result<f64> {
    let resolution: f64 = value
        .parse()
        .map_err(|_| anyhow!("Invalid resolution '{value}'"))?;
    if !resolution.is_finite() || resolution <= 0.0 {
        bail!("Resolution must be > 0");
    }
    Ok(resolution)
}

fn parse_max_len(value: &str) -> Result<u32> {
    let max_len: u32 = value
        .parse()
        .map_err(|_| anyhow!("Invalid max-len '{value}'"))?;
    if max_len == 0 {
        bail!("max-len must be > 0");
    }
    Ok(max_len)
}

fn parse_buffer(value: &str) -> Result<f64> {
    let buffer: f64 = value
        .parse()
        .map_err(|_| anyhow!("Invalid buffer '{value}'"))?;
    if !buffer.is_finite() || buffer < 0.0 {
        bail!("Buffer must be >= 0");
    }
    Ok(buffer)
}

fn parse_tries(value: &str) -> Result<usize> {
    let tries: usize = value
        .parse()
        .map_err(|_| anyhow!("Invalid tries '{value}'"))?;
    if tries == 0 {
        bail!("Tries must be > 0");
    }
    Ok(tries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_args(line: &[&str]) -> Vec<String> {
        line.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fetch_with_bounds_and_layer() {
        let args = to_args(&[
            "fetch",
            "--url",
            "https://example.test/wms",
            "--bounds",
            "0,0,1000,1000",
            "--crs",
            "EPSG:25832",
            "--layer",
            "ortho",
            "--res",
            "0.125",
            "--out",
            "out.tif",
        ]);
        let Command::Fetch(config) = parse_args(&args).unwrap() else {
            panic!("expected fetch command");
        };
        assert_eq!(config.url, "https://example.test/wms");
        assert!(matches!(config.area, AreaOfInterest::Bounds(_)));
        assert!(matches!(config.layer, LayerSpec::Named(ref name) if name == "ortho"));
        assert_eq!(config.resolution, 0.125);
        assert_eq!(config.max_len, 4000);
        assert_eq!(config.tries, 3);
        assert!(config.check_capabilities);
    }

    #[test]
    fn fetch_with_grid_and_catalog() {
        let args = to_args(&[
            "fetch",
            "--url=https://example.test/wms",
            "--grid=dk1",
            "--cell=1km_6210_720",
            "--service=dk",
            "--year=2023",
            "--res=0.125",
            "--out=out.tif",
            "--padding=10,20",
            "--max-len=2000",
            "--no-check",
        ]);
        let Command::Fetch(config) = parse_args(&args).unwrap() else {
            panic!("expected fetch command");
        };
        assert!(
            matches!(config.area, AreaOfInterest::GridCell { ref grid, ref cell }
                if grid == "dk1" && cell == "1km_6210_720")
        );
        assert!(matches!(config.layer, LayerSpec::Catalog { ref season, .. } if season == "spring"));
        assert_eq!(config.padding, Some(Padding::PerAxis { y: 10.0, x: 20.0 }));
        assert_eq!(config.max_len, 2000);
        assert!(!config.check_capabilities);
    }

    #[test]
    fn plan_requires_an_area() {
        let args = to_args(&["plan", "--res", "1"]);
        assert!(parse_args(&args).is_err());
    }

    #[test]
    fn bounds_without_crs_is_rejected() {
        let args = to_args(&[
            "fetch",
            "--url",
            "u",
            "--bounds",
            "0,0,1,1",
            "--layer",
            "l",
            "--res",
            "1",
            "--out",
            "o.tif",
        ]);
        assert!(parse_args(&args).is_err());
    }

    #[test]
    fn scalar_padding_is_uniform() {
        assert_eq!(parse_padding("5").unwrap(), Padding::Uniform(5.0));
        assert_eq!(
            parse_padding("5,3").unwrap(),
            Padding::PerAxis { y: 5.0, x: 3.0 }
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(parse_bounds("0,0,1").is_err());
        assert!(parse_bounds("a,b,c,d").is_err());
        assert!(parse_resolution("0").is_err());
        assert!(parse_max_len("0").is_err());
        assert!(parse_tries("0").is_err());
    }
}
