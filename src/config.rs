use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    #[serde(default)]
    pub kernel: KernelSpecConfig,

    #[serde(default)]
    pub models: ModelConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Name and label under which the kernel is registered with the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSpecConfig {
    #[serde(default = "default_kernel_name")]
    pub name: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

impl Default for KernelSpecConfig {
    fn default() -> Self {
        Self {
            name: default_kernel_name(),
            display_name: default_display_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Replaces the built-in default model
    #[serde(default)]
    pub default_model: Option<String>,
    /// Replaces the built-in catalog
    #[serde(default)]
    pub catalog: Option<Vec<String>>,
    /// How many catalog entries `%ai model` lists
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            catalog: None,
            list_limit: default_list_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// OpenAI-compatible endpoint of the local model server
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Never written back out and redacted in `Debug`
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_connect_timeout", with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            kernel: KernelSpecConfig::default(),
            models: ModelConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl KernelConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        from_file(path)
    }

    /// Reads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> InternalResult<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_event_buffer_size() -> usize {
    100
}

fn default_kernel_name() -> String {
    "llm".to_string()
}

fn default_display_name() -> String {
    "Local LLM".to_string()
}

fn default_list_limit() -> usize {
    20
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let key: Option<String> = Option::deserialize(deserializer)?;
    Ok(key.filter(|k| !k.is_empty()).map(SecretString::from))
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
