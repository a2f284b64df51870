
use std::env;

use thiserror::Error;
use url::Url;

/// Name of the subdirectory inside an indexed folder that holds the vector store.
pub const INDEX_DIR_NAME: &str = ".ragbox";

/// Optional per-folder instructions file, read from the folder root.
pub const INSTRUCTIONS_FILE_NAME: &str = "instructions.txt";

/// Plain text and markup extensions loaded verbatim.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Code and config extensions loaded as plain text.
pub const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "json", "yaml", "yml", "html", "css", "scss", "sass", "xml",
    "csv", "sql", "sh", "bash", "zsh", "ps1", "bat", "cmd", "java", "c", "cpp", "h", "hpp", "cs",
    "go", "rs", "rb", "php", "swift", "kt", "scala", "r", "m", "mm",
];

pub const PDF_EXTENSIONS: &[&str] = &["pdf"];
pub const DOCX_EXTENSIONS: &[&str] = &["docx"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid chunk size: {0} (must be greater than zero)")]
    InvalidChunkSize(usize),
    #[error("Invalid chunk overlap: {overlap} (must be less than chunk size {size})")]
    InvalidChunkOverlap { overlap: usize, size: usize },
    #[error("Invalid top-k: {0} (must be greater than zero)")]
    InvalidTopK(usize),
    #[error("Invalid Ollama URL: {0}")]
    InvalidOllamaUrl(String),
}

/// Application configuration, passed explicitly into every constructor.
///
/// Chunking and retrieval constants are fixed for the lifetime of an engine;
/// only top-k may be overridden per query.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunk windows, in characters.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per query.
    pub top_k: usize,

    /// Default generation provider id.
    pub default_llm: String,
    /// Default embedding provider id.
    pub default_embedding: String,

    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,

    pub anthropic_model: String,
    pub openai_model: String,
    pub openai_embedding_model: String,
    pub ollama_model: String,
    pub ollama_url: String,

    /// Output dimension of the OpenAI embedding model.
    pub openai_embedding_dimension: usize,
    /// Output dimension of the Ollama embedding model.
    pub ollama_embedding_dimension: usize,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            default_llm: "anthropic".to_string(),
            default_embedding: "ollama".to_string(),
            anthropic_api_key: None,
            openai_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            openai_model: "gpt-4o".to_string(),
            openai_embedding_model: "text-embedding-3-small".to_string(),
            ollama_model: "nomic-embed-text".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            openai_embedding_dimension: 1536,
            ollama_embedding_dimension: 768,
        }
    }
}

impl Config {
    /// Build a configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` beforehand if a `.env` file should be honored.
    #[inline]
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        config.anthropic_api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        config.openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Ok(llm) = env::var("RAGBOX_LLM") {
            config.default_llm = llm;
        }
        if let Ok(embedding) = env::var("RAGBOX_EMBEDDING") {
            config.default_embedding = embedding;
        }
        if let Ok(url) = env::var("OLLAMA_URL") {
            config.ollama_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the chunking and retrieval constants.
    ///
    /// A chunk overlap at or above the window size would make the window
    /// advance step non-positive, so it is rejected here rather than looping
    /// forever in the chunker.
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }

        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        Url::parse(&self.ollama_url)
            .map_err(|_| ConfigError::InvalidOllamaUrl(self.ollama_url.clone()))?;

        Ok(())
    }

    /// Vector dimension of the configured default embedding provider.
    #[inline]
    pub fn default_embedding_dimension(&self) -> usize {
        if self.default_embedding == "openai" {
            self.openai_embedding_dimension
        } else {
            self.ollama_embedding_dimension
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.ollama_url)
            .map_err(|_| ConfigError::InvalidOllamaUrl(self.ollama_url.clone()))
    }

    /// Every file extension the loader recognizes, lowercase, without dots.
    #[inline]
    pub fn supported_extensions() -> Vec<&'static str> {
        TEXT_EXTENSIONS
            .iter()
            .chain(CODE_EXTENSIONS)
            .chain(PDF_EXTENSIONS)
            .chain(DOCX_EXTENSIONS)
            .copied()
            .collect()
    }

    #[inline]
    pub fn is_supported_extension(ext: &str) -> bool {
        let ext = ext.to_lowercase();
        TEXT_EXTENSIONS.contains(&ext.as_str())
            || CODE_EXTENSIONS.contains(&ext.as_str())
            || PDF_EXTENSIONS.contains(&ext.as_str())
            || DOCX_EXTENSIONS.contains(&ext.as_str())
    }
}

impl From<ConfigError> for crate::RagError {
    #[inline]
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
