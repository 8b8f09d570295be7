//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::progress::ProgressUpdate;

/// Unique identifier for a download task
///
/// Generated from a UUIDv4 at enqueue time and immutable for the lifetime
/// of the task. Collision probability over a process lifetime is negligible.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh task id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Download task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Queued and waiting for a free worker
    Queued,
    /// Resolving media metadata before the download starts
    FetchingInfo,
    /// Currently downloading
    Downloading,
    /// Moving and finalizing the downloaded artifact
    Processing,
    /// Successfully completed
    Completed,
    /// Failed with error
    Failed,
    /// Cancelled by request or shutdown
    Cancelled,
}

impl Status {
    /// Whether this is a terminal state (no further transitions occur)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }

    /// Whether a worker currently holds this task
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Status::FetchingInfo | Status::Downloading | Status::Processing
        )
    }
}

/// Output container format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// MP4 container (default)
    #[default]
    Mp4,
    /// WebM container
    Webm,
    /// Matroska container
    Mkv,
    /// Audio-only extraction (MP3)
    Audio,
}

impl VideoFormat {
    /// File extension for artifacts produced in this format
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Mkv => "mkv",
            VideoFormat::Audio => "mp3",
        }
    }
}

/// Target quality for a download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    /// Best available video + audio (default)
    #[default]
    #[serde(rename = "best")]
    Best,
    /// Worst available (smallest transfer)
    #[serde(rename = "worst")]
    Worst,
    /// Up to 2160p (4K)
    #[serde(rename = "2160p")]
    P2160,
    /// Up to 1440p
    #[serde(rename = "1440p")]
    P1440,
    /// Up to 1080p
    #[serde(rename = "1080p")]
    P1080,
    /// Up to 720p
    #[serde(rename = "720p")]
    P720,
    /// Up to 480p
    #[serde(rename = "480p")]
    P480,
    /// Up to 360p
    #[serde(rename = "360p")]
    P360,
}

impl Quality {
    /// Engine format-selector expression for this quality
    pub fn format_selector(&self) -> &'static str {
        match self {
            Quality::Best => "bestvideo+bestaudio/best",
            Quality::Worst => "worstvideo+worstaudio/worst",
            Quality::P2160 => "bestvideo[height<=2160]+bestaudio/best[height<=2160]",
            Quality::P1440 => "bestvideo[height<=1440]+bestaudio/best[height<=1440]",
            Quality::P1080 => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
            Quality::P720 => "bestvideo[height<=720]+bestaudio/best[height<=720]",
            Quality::P480 => "bestvideo[height<=480]+bestaudio/best[height<=480]",
            Quality::P360 => "bestvideo[height<=360]+bestaudio/best[height<=360]",
        }
    }

    /// Vertical resolution cap, if this quality names one
    pub fn height_cap(&self) -> Option<u32> {
        match self {
            Quality::Best | Quality::Worst => None,
            Quality::P2160 => Some(2160),
            Quality::P1440 => Some(1440),
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::P360 => Some(360),
        }
    }
}

/// Parameters for a download request
///
/// An immutable copy is stored on the task record at enqueue time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Media page or stream URL
    pub url: String,

    /// Output container format
    #[serde(default)]
    pub format: VideoFormat,

    /// Target quality
    #[serde(default)]
    pub quality: Quality,

    /// Extract audio only
    #[serde(default)]
    pub audio_only: bool,

    /// Specific playlist items to download (1-indexed)
    #[serde(default)]
    pub playlist_items: Option<Vec<u32>>,

    /// Subtitle language code to fetch alongside the media
    #[serde(default)]
    pub subtitle_lang: Option<String>,

    /// Embed fetched subtitles into the output container
    #[serde(default)]
    pub embed_subtitles: bool,
}

impl DownloadRequest {
    /// Create a request for `url` with default format and quality
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: VideoFormat::default(),
            quality: Quality::default(),
            audio_only: false,
            playlist_items: None,
            subtitle_lang: None,
            embed_subtitles: false,
        }
    }
}

/// Tracked state of a single download task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier
    pub id: TaskId,

    /// Current lifecycle status
    pub status: Status,

    /// The original request parameters (immutable)
    pub request: DownloadRequest,

    /// Media title, populated once metadata is resolved
    pub title: Option<String>,

    /// Progress percentage (0.0 to 100.0), non-decreasing while downloading
    pub progress: f32,

    /// Human-readable transfer speed, last-write-wins
    pub speed: Option<String>,

    /// Human-readable time remaining, last-write-wins
    pub eta: Option<String>,

    /// Bytes downloaded so far
    pub downloaded_bytes: Option<u64>,

    /// Total size in bytes (absent when the engine cannot estimate it)
    pub total_bytes: Option<u64>,

    /// Error message, set only when status is `Failed`
    pub error: Option<String>,

    /// Final artifact path, set only when status is `Completed`
    pub file_path: Option<PathBuf>,

    /// When the task was enqueued
    pub created_at: DateTime<Utc>,

    /// Refreshed on every field mutation
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a fresh record in the `Queued` state
    pub(crate) fn new(id: TaskId, request: DownloadRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: Status::Queued,
            request,
            title: None,
            progress: 0.0,
            speed: None,
            eta: None,
            downloaded_bytes: None,
            total_bytes: None,
            error: None,
            file_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to `next`, refusing to leave a terminal state.
    ///
    /// Returns whether the transition was applied. A task that is already
    /// `Completed`, `Failed`, or `Cancelled` keeps its status, so a late
    /// worker can never overwrite a cancellation and a duplicate cancel can
    /// never rewrite a completion.
    pub(crate) fn set_status(&mut self, next: Status) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }

    /// Transition to `Failed` with the given error message
    pub(crate) fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.set_status(Status::Failed) {
            return false;
        }
        self.error = Some(error.into());
        true
    }

    /// Transition to `Completed` with the final artifact path
    pub(crate) fn complete(&mut self, path: PathBuf) -> bool {
        if !self.set_status(Status::Completed) {
            return false;
        }
        self.progress = 100.0;
        self.file_path = Some(path);
        true
    }

    /// Apply a normalized progress update while downloading.
    ///
    /// Progress is clamped to the running maximum — the engine may report a
    /// smaller value after a fragment retry restarts. Other telemetry fields
    /// are last-write-wins; absent fields keep their previous value.
    pub(crate) fn apply_progress(&mut self, update: &ProgressUpdate) {
        if self.status != Status::Downloading {
            return;
        }
        if let Some(percent) = update.progress {
            self.progress = self.progress.max(percent);
        }
        if let Some(ref speed) = update.speed {
            self.speed = Some(speed.clone());
        }
        if let Some(ref eta) = update.eta {
            self.eta = Some(eta.clone());
        }
        if let Some(bytes) = update.downloaded_bytes {
            self.downloaded_bytes = Some(bytes);
        }
        if let Some(total) = update.total_bytes {
            self.total_bytes = Some(total);
        }
    }
}

/// Aggregate queue statistics computed from a single store snapshot
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Tasks currently held by a worker (fetching info, downloading, processing)
    pub active: usize,

    /// Tasks waiting for a free worker
    pub queued: usize,

    /// Tasks that completed successfully
    pub completed: usize,

    /// Tasks that failed or were cancelled
    pub failed: usize,

    /// Snapshots of all tracked tasks, oldest first
    pub tasks: Vec<TaskRecord>,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task added to the queue
    Queued {
        /// Task ID
        id: TaskId,
    },

    /// Media metadata resolved
    MetadataResolved {
        /// Task ID
        id: TaskId,
        /// Resolved media title
        title: String,
    },

    /// Download progress update
    Downloading {
        /// Task ID
        id: TaskId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Human-readable transfer speed, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        /// Human-readable time remaining, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
    },

    /// Task completed successfully
    Completed {
        /// Task ID
        id: TaskId,
        /// Final artifact path
        path: PathBuf,
    },

    /// Task failed
    Failed {
        /// Task ID
        id: TaskId,
        /// Error message
        error: String,
    },

    /// Task cancelled
    Cancelled {
        /// Task ID
        id: TaskId,
    },

    /// Task removed from the store
    Removed {
        /// Task ID
        id: TaskId,
    },

    /// Graceful shutdown initiated
    Shutdown,
}
