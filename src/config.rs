//! Configuration types for archival material analysis.
//!
//! All run behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. The config is passed by reference into every
//! pipeline entry point; nothing is read from ambient global state once the
//! binary has mapped its flags and environment onto the builder.

use crate::error::AnalysisError;
use crate::pipeline::llm::VisionClient;
use crate::pipeline::render::PageRasterizer;
use crate::progress::ProgressCallback;
use crate::prompts::MaterialType;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default chat-completion endpoint.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default vision model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4-vision-preview";

/// Name of the JSON file written by [`crate::analyze::analyze_to_file`].
pub const RESULT_FILE_NAME: &str = "analysis_result.json";

/// Configuration for one analysis run.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use archscan::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .api_key("sk-test")
///     .sample_size(8)
///     .seed(42)
///     .build()
///     .unwrap();
/// assert_eq!(config.sample_size, 8);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Bearer token for the chat-completion endpoint.
    ///
    /// Only the default HTTP client needs it; a pre-built [`Self::client`]
    /// may ignore it.
    pub api_key: Option<String>,

    /// Chat-completion endpoint URL. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// Model identifier sent in the request body. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// `max_tokens` sent in the request body. Default: 1000.
    pub max_tokens: usize,

    /// Upper bound on images sent to the model per run. Default: 5.
    ///
    /// Two slots go to the lexicographically first images (covers and
    /// title pages); the rest are drawn at random from the remainder.
    pub sample_size: usize,

    /// Longest edge, in pixels, of each image sent to the model. Default: 1024.
    pub max_image_dimension: u32,

    /// JPEG quality (1–100) of the transport encoding. Default: 75.
    pub jpeg_quality: u8,

    /// Rendering DPI used when rasterising PDF pages. Range: 72–600. Default: 200.
    pub render_dpi: u32,

    /// Cap on either edge of a rasterised page, in pixels. Default: 4000.
    ///
    /// Keeps an oversized page (maps, posters) from allocating hundreds of
    /// megabytes before the encoder shrinks it to `max_image_dimension`.
    pub max_rendered_pixels: u32,

    /// User password for encrypted PDFs.
    pub pdf_password: Option<String>,

    /// Directory receiving rasterised pages and the result file. Default: `./output`.
    pub output_dir: PathBuf,

    /// Seed for the sampler's random draw. `None` seeds from OS entropy.
    pub seed: Option<u64>,

    /// Material-type vocabulary enumerated in the prompt.
    /// Default: the full [`MaterialType`] catalog, in catalog order.
    pub material_types: Vec<String>,

    /// Whole-request timeout for the model call. `None` keeps the transport default.
    pub request_timeout_secs: Option<u64>,

    /// Pre-constructed model client. Takes precedence over `api_key`/`api_url`.
    pub client: Option<Arc<dyn VisionClient>>,

    /// Pre-constructed rasterizer. Takes precedence over the pdfium default.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Receives pipeline events as the run progresses.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1000,
            sample_size: 5,
            max_image_dimension: 1024,
            jpeg_quality: 75,
            render_dpi: 200,
            max_rendered_pixels: 4000,
            pdf_password: None,
            output_dir: PathBuf::from("./output"),
            seed: None,
            material_types: MaterialType::catalog_labels(),
            request_timeout_secs: None,
            client: None,
            rasterizer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("sample_size", &self.sample_size)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("render_dpi", &self.render_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("output_dir", &self.output_dir)
            .field("seed", &self.seed)
            .field("material_types", &self.material_types)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("client", &self.client.as_ref().map(|_| "<dyn VisionClient>"))
            .field(
                "rasterizer",
                &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Show only the first few characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{prefix}…")
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn sample_size(mut self, k: usize) -> Self {
        self.config.sample_size = k;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn material_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.material_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn client(mut self, client: Arc<dyn VisionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.sample_size == 0 {
            return Err(AnalysisError::InvalidConfig(
                "Sample size must be ≥ 1".into(),
            ));
        }
        if c.max_image_dimension < 16 {
            return Err(AnalysisError::InvalidConfig(format!(
                "Maximum image dimension must be ≥ 16, got {}",
                c.max_image_dimension
            )));
        }
        if c.max_tokens == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_url.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig("API URL is empty".into()));
        }
        if c.material_types.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "At least one material type is required".into(),
            ));
        }
        Ok(self.config)
    }
}
