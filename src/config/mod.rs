use crate::error::IngestError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// How the store filename extension is chosen for an ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionPolicy {
    /// Keep the original extension; no extension when the original has none.
    #[default]
    Original,
    /// Prefer the sniffed extension when the original disagrees with the
    /// detected media type.
    Detected,
}

impl FromStr for ExtensionPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original" | "orig" => Ok(ExtensionPolicy::Original),
            "detected" | "mime" | "sniffed" => Ok(ExtensionPolicy::Detected),
            other => Err(IngestError::Config(format!(
                "unknown extension policy '{}', expected 'original' or 'detected'",
                other
            ))),
        }
    }
}

fn policy_or_default(
    value: Option<String>,
    default: ExtensionPolicy,
) -> Result<ExtensionPolicy, IngestError> {
    match value {
        Some(v) => v.parse(),
        None => Ok(default),
    }
}

/// Ingest pipeline configuration
///
/// Staging and store directories must live on the same filesystem for the
/// final move to be an atomic rename. Set `allow_cross_device` to accept the
/// non-atomic copy fallback instead.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Watched directory new files are dropped into
    pub input_dir: PathBuf,

    /// Claim target, also the crash recovery point
    pub staging_dir: PathBuf,

    /// Content-addressed store
    pub store_dir: PathBuf,

    /// Store filename extension selection (default: original)
    pub extension_policy: ExtensionPolicy,

    /// Maximum concurrently identified files (default: 8)
    pub identify_workers: usize,

    /// Capacity of each stage hand-off queue (default: 64)
    pub queue_capacity: usize,

    /// Read buffer used while hashing (default: 1 MB)
    pub hash_buffer_size: usize,

    /// Leading bytes handed to the media classifier (default: 8 KB)
    pub sniff_len: usize,

    /// Fall back to copy + fsync + rename across filesystems (default: false)
    pub allow_cross_device: bool,

    /// Claim files already sitting in the input directory at startup (default: false)
    pub sweep_input_on_start: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("tmp/in"),
            staging_dir: PathBuf::from("tmp/tmp"),
            store_dir: PathBuf::from("tmp/out"),
            extension_policy: ExtensionPolicy::Original,
            identify_workers: 8,
            queue_capacity: 64,
            hash_buffer_size: 1024 * 1024, // 1 MB
            sniff_len: 8 * 1024,           // 8 KB
            allow_cross_device: false,
            sweep_input_on_start: false,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables. An unparsable
    /// extension policy is a configuration error, not a silent default.
    pub fn from_env() -> Result<Self, IngestError> {
        let default = Self::default();

        Ok(Self {
            input_dir: env::var("TAGZ_IN_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.input_dir),

            staging_dir: env::var("TAGZ_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            store_dir: env::var("TAGZ_OUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.store_dir),

            extension_policy: policy_or_default(
                env::var("TAGZ_EXTENSION_POLICY").ok(),
                default.extension_policy,
            )?,

            identify_workers: env::var("TAGZ_IDENTIFY_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.identify_workers),

            queue_capacity: env::var("TAGZ_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.queue_capacity),

            hash_buffer_size: env::var("TAGZ_HASH_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.hash_buffer_size),

            sniff_len: env::var("TAGZ_SNIFF_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sniff_len),

            allow_cross_device: env::var("TAGZ_ALLOW_CROSS_DEVICE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.allow_cross_device),

            sweep_input_on_start: env::var("TAGZ_SWEEP_INPUT")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.sweep_input_on_start),
        })
    }

    /// Config rooted under a single base directory (`in/`, `tmp/`, `out/`).
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            input_dir: base.join("in"),
            staging_dir: base.join("tmp"),
            store_dir: base.join("out"),
            ..Self::default()
        }
    }

    pub fn with_extension_policy(mut self, policy: ExtensionPolicy) -> Self {
        self.extension_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.identify_workers == 0 {
            return Err(IngestError::Config(
                "identify_workers must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(IngestError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.hash_buffer_size == 0 || self.sniff_len == 0 {
            return Err(IngestError::Config(
                "hash_buffer_size and sniff_len must be non-zero".to_string(),
            ));
        }

        let dirs = [&self.input_dir, &self.staging_dir, &self.store_dir];
        for (i, a) in dirs.iter().enumerate() {
            for b in dirs.iter().skip(i + 1) {
                if a == b {
                    return Err(IngestError::Config(format!(
                        "input, staging and store directories must differ ({} used twice)",
                        a.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Creates the staging and store directories if missing. The input
    /// directory is owned by whoever drops files and must already exist.
    pub async fn ensure_dirs(&self) -> Result<(), IngestError> {
        match tokio::fs::metadata(&self.input_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(IngestError::Config(format!(
                    "input path {} is not a directory",
                    self.input_dir.display()
                )));
            }
            Err(e) => {
                return Err(IngestError::Config(format!(
                    "cannot access input directory {}: {}",
                    self.input_dir.display(),
                    e
                )));
            }
        }

        for dir in [&self.staging_dir, &self.store_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| IngestError::io(dir, e))?;
        }
        Ok(())
    }
}
