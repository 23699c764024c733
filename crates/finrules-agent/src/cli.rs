//! Command-line arguments of the `finrules` binary

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use clap::{Parser, ValueEnum};
use finrules_domain::{DocumentDescriptor, TrackCatalog};
use std::path::{Path, PathBuf};

/// Finrules - mine compliance rules from regulations and find catalog gaps.
#[derive(Debug, Parser)]
#[command(name = "finrules")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Text files to process
    pub inputs: Vec<PathBuf>,

    /// JSON array of `{name, url | file_path | content, type?}` descriptors
    #[arg(short, long)]
    pub batch: Option<PathBuf>,

    /// Configuration preset
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    pub preset: Preset,

    /// TOML configuration file; replaces the preset
    #[arg(short, long, env = "FINRULES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Extract from whole documents instead of retrieved chunks
    #[arg(long)]
    pub no_rag: bool,

    /// JSON track catalog; the reference catalog when absent
    #[arg(long, env = "FINRULES_TRACKS")]
    pub tracks: Option<PathBuf>,

    /// Chunk store database
    #[arg(long, env = "FINRULES_DB", default_value = "finrules.db")]
    pub db: PathBuf,

    /// Ollama endpoint
    #[arg(long, env = "OLLAMA_HOST", default_value = finrules_llm::ollama::DEFAULT_ENDPOINT)]
    pub ollama_host: String,

    /// Generation model; offline mode when absent
    #[arg(long, env = "FINRULES_LLM_MODEL")]
    pub model: Option<String>,

    /// Embedding model; hashed embeddings when absent
    #[arg(long, env = "FINRULES_EMBED_MODEL")]
    pub embed_model: Option<String>,

    /// Embedding dimension
    #[arg(long, env = "FINRULES_EMBED_DIM", default_value_t = 384)]
    pub embed_dim: usize,

    /// Include every per-document result in the output
    #[arg(long)]
    pub detailed: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Named configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Balanced defaults
    Default,
    /// Larger chunks and batches
    Fast,
    /// Smaller chunks and batches
    Thorough,
}

impl From<Preset> for PipelineConfig {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Default => PipelineConfig::default(),
            Preset::Fast => PipelineConfig::fast(),
            Preset::Thorough => PipelineConfig::thorough(),
        }
    }
}

impl Cli {
    /// Preset or file, then environment overrides, then `--no-rag`
    pub fn resolve_config<F>(&self, lookup: F) -> Result<PipelineConfig, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => self.preset.into(),
        };
        let mut config = base.with_overrides(lookup)?;
        if self.no_rag {
            config.use_rag = false;
        }
        config.validate()?;
        Ok(config)
    }

    /// Track catalog from `--tracks`, or the reference catalog
    pub fn catalog(&self) -> Result<TrackCatalog, PipelineError> {
        match &self.tracks {
            Some(path) => TrackCatalog::from_file(path)
                .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e))),
            None => Ok(TrackCatalog::reference()),
        }
    }

    /// Descriptors for the batch file followed by the positional inputs
    pub fn descriptors(&self) -> Result<Vec<DocumentDescriptor>, PipelineError> {
        let mut descriptors = match &self.batch {
            Some(path) => load_batch(path)?,
            None => Vec::new(),
        };

        descriptors.extend(self.inputs.iter().map(|path| {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            DocumentDescriptor::file(name, path.to_string_lossy())
        }));

        if descriptors.is_empty() {
            return Err(PipelineError::Config("no input documents given".to_string()));
        }
        Ok(descriptors)
    }
}

fn load_batch(path: &Path) -> Result<Vec<DocumentDescriptor>, PipelineError> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
}
