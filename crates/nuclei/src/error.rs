use thiserror::Error;

#[derive(Error, Debug)]
pub enum NucleiError {
    #[error("Failed to decode or encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid zone annotation: {0}")]
    InvalidAnnotation(String),

    #[error("Invalid detection summary: {0}")]
    InvalidSummary(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Too many contours: {found} found, limit is {limit}")]
    NoiseOverload { found: usize, limit: usize },

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

pub type Result<T> = std::result::Result<T, NucleiError>;
