use clipforged_av::CodecParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Encoder settings for reference audio and trimmed video.
    #[serde(default)]
    pub transcode: CodecParams,

    #[serde(default)]
    pub trim: TrimConfig,

    #[serde(default)]
    pub assist: AssistConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Built browser UI, served with SPA fallback when present.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    /// Sandbox root. Every path taken from a request must resolve under it.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Meta store used when a request does not name one.
    #[serde(default)]
    pub default_meta_path: Option<PathBuf>,

    /// File name of the derived store, next to the meta store.
    #[serde(default = "default_derived_file_name")]
    pub derived_file_name: String,

    /// Directory (relative to the meta store) for trim outputs.
    #[serde(default = "default_processed_dir")]
    pub processed_dir: String,

    /// Directory (relative to the meta store) for downloaded sources.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_derived_file_name() -> String {
    clipforged_store::DEFAULT_DERIVED_FILE.to_string()
}
fn default_processed_dir() -> String {
    "dataset_processed".to_string()
}
fn default_downloads_dir() -> String {
    "downloads".to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            default_meta_path: None,
            derived_file_name: default_derived_file_name(),
            processed_dir: default_processed_dir(),
            downloads_dir: default_downloads_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Watchdog for every external tool invocation.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ytdlp_path: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrimConfig {
    /// Drop earlier derived entries for the same meta entry on re-trim
    /// instead of keeping them alongside the new one.
    #[serde(default)]
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer token. Usually supplied via `REPLICATE_API_TOKEN`.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Model used for captions, as `owner/name`.
    #[serde(default = "default_caption_model")]
    pub caption_model: String,

    #[serde(default = "default_caption_prompt")]
    pub caption_prompt: String,

    /// Model version hash used for transcription.
    #[serde(default = "default_transcribe_version")]
    pub transcribe_version: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polls before a prediction is reported as timed out.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

fn default_api_base_url() -> String {
    "https://api.replicate.com/v1".to_string()
}
fn default_caption_model() -> String {
    "google/gemini-2.5-flash".to_string()
}
fn default_caption_prompt() -> String {
    "Describe this video clip in one detailed paragraph: the subjects, their actions, \
     the setting, camera movement, and lighting."
        .to_string()
}
fn default_transcribe_version() -> String {
    "8099696689d249cf8b122d833c36ac3f75505c666a395ca40ef26f68e7d3d16e".to_string()
}
fn default_poll_interval_ms() -> u64 {
    2500
}
fn default_max_polls() -> u32 {
    120
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_token: None,
            caption_model: default_caption_model(),
            caption_prompt: default_caption_prompt(),
            transcribe_version: default_transcribe_version(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}
