use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEntry {
    pub path: String,
    pub duration_secs: f32,
}

/// The media pool a big-change trigger re-randomizes from: pick an entry at
/// random, start it at a random offset within its duration. The mapper only
/// says *when*; this says *what*.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    entries: Vec<MediaEntry>,
}

/// A selected entry plus start offset, ready to hand to the video layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub path: String,
    pub start_secs: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistError {
    Io(String),
    Parse { line: usize, message: String },
    EmptyPlaylist,
    InvalidDuration { path: String, duration: f32 },
}

impl fmt::Display for PlaylistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
            Self::EmptyPlaylist => write!(f, "playlist must contain at least one entry"),
            Self::InvalidDuration { path, duration } => {
                write!(f, "invalid duration for '{path}': {duration}")
            }
        }
    }
}

impl std::error::Error for PlaylistError {}

impl Playlist {
    /// Parses `media <path> <duration-secs>` lines; `#` comments and blank
    /// lines ignored.
    pub fn parse(text: &str) -> Result<Self, PlaylistError> {
        let mut entries = Vec::new();

        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.first().copied() != Some("media") {
                return Err(PlaylistError::Parse {
                    line: line_no,
                    message: "expected 'media'".to_string(),
                });
            }
            if tokens.len() != 3 {
                return Err(PlaylistError::Parse {
                    line: line_no,
                    message: "media expects: media <path> <duration-secs>".to_string(),
                });
            }

            let path = tokens[1].to_string();
            let duration_secs = tokens[2].parse::<f32>().map_err(|_| PlaylistError::Parse {
                line: line_no,
                message: "invalid duration".to_string(),
            })?;

            entries.push(MediaEntry {
                path,
                duration_secs,
            });
        }

        let playlist = Self { entries };
        playlist.validate()?;
        Ok(playlist)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlaylistError> {
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|e| PlaylistError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    pub fn validate(&self) -> Result<(), PlaylistError> {
        if self.entries.is_empty() {
            return Err(PlaylistError::EmptyPlaylist);
        }
        for e in &self.entries {
            if !e.duration_secs.is_finite() || e.duration_secs <= 0.0 {
                return Err(PlaylistError::InvalidDuration {
                    path: e.path.clone(),
                    duration: e.duration_secs,
                });
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[MediaEntry] {
        &self.entries
    }

    /// Random entry, random whole-second start offset within its duration.
    pub fn cue_random(&self, rng: &mut fastrand::Rng) -> Cue {
        let entry = &self.entries[rng.usize(..self.entries.len())];
        let start_secs = (rng.f32() * entry.duration_secs).floor();
        Cue {
            path: entry.path.clone(),
            start_secs,
        }
    }
}
