pub const DEFAULT_MIN_AXIS_PIXELS: u32 = 256;
pub const DEFAULT_MAX_AXIS_PIXELS: u32 = 4000;
pub const DEFAULT_WMS_VERSION: &str = "1.3.0";
pub const DEFAULT_IMAGE_FORMAT: &str = "image/png";
pub const USER_AGENT: &str = "wmsfetch/0.1";
pub const META_SUFFIX: &str = "meta.json";
