//! Project metadata and on-disk layout.
//!
//! A project ties a source video to its captions, caption style, and output
//! framing:
//!
//! ```text
//! <root>/meta/project.json   metadata, source reference, output, style
//! <root>/meta/captions.json  caption chunk list
//! <root>/exports/            rendered artifacts
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::caption::CaptionTrack;
use crate::geometry::AspectPreset;
use crate::playback::PlaybackState;
use crate::style::StyleConfig;

/// Top-level project file (`project.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Unique project identifier.
    pub id: String,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,

    /// Last modified timestamp (RFC 3339).
    pub modified_at: String,

    /// The source video, once one is attached.
    #[serde(default)]
    pub source: Option<SourceRef>,

    /// Output framing.
    #[serde(default)]
    pub output: OutputSettings,

    /// Caption style.
    #[serde(default)]
    pub style: StyleConfig,
}

/// Reference to the source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Absolute path, or a path relative to the project root.
    pub path: PathBuf,

    /// Decoded frame dimensions.
    pub width: u32,
    pub height: u32,

    /// Duration in seconds.
    pub duration_secs: f64,
}

/// Output framing choices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub preset: AspectPreset,

    /// Horizontal crop offset, 0-100.
    pub crop_value: f64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            preset: AspectPreset::Vertical,
            crop_value: PlaybackState::DEFAULT_CROP,
        }
    }
}

/// The complete in-memory representation of a loaded project.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    /// Filesystem path to the project directory.
    pub root: PathBuf,

    /// Project metadata.
    pub project: Project,

    /// Caption chunk list.
    pub captions: CaptionTrack,
}

impl Project {
    /// Create a new project with defaults.
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            id: project_id(now),
            created_at: now.to_rfc3339(),
            modified_at: now.to_rfc3339(),
            source: None,
            output: OutputSettings::default(),
            style: StyleConfig::default(),
        }
    }
}

impl LoadedProject {
    /// Load a project from a directory.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();

        let project_path = root.join("meta").join("project.json");
        let captions_path = root.join("meta").join("captions.json");

        let project_json =
            std::fs::read_to_string(&project_path).map_err(|e| ProjectError::IoError {
                path: project_path.clone(),
                source: e,
            })?;

        let project: Project =
            serde_json::from_str(&project_json).map_err(|e| ProjectError::ParseError {
                path: project_path,
                source: e,
            })?;

        let captions = if captions_path.exists() {
            let captions_json =
                std::fs::read_to_string(&captions_path).map_err(|e| ProjectError::IoError {
                    path: captions_path.clone(),
                    source: e,
                })?;
            let track: CaptionTrack =
                serde_json::from_str(&captions_json).map_err(|e| ProjectError::ParseError {
                    path: captions_path,
                    source: e,
                })?;
            if let Some(chunk) = track.iter().find(|c| !c.id.is_reservable()) {
                return Err(ProjectError::ValidationError {
                    message: format!("caption id {} is out of range", chunk.id),
                });
            }
            // Re-run through the constructor so loaded ids are reserved.
            CaptionTrack::from_saved(track.chunks().to_vec())
        } else {
            CaptionTrack::new()
        };

        Ok(Self {
            root,
            project,
            captions,
        })
    }

    /// Save project and captions to disk, bumping the modified timestamp.
    pub fn save(&mut self) -> Result<(), ProjectError> {
        let meta_dir = self.root.join("meta");
        std::fs::create_dir_all(&meta_dir).map_err(|e| ProjectError::IoError {
            path: meta_dir.clone(),
            source: e,
        })?;

        self.project.modified_at = chrono::Utc::now().to_rfc3339();

        let project_path = meta_dir.join("project.json");
        let project_json =
            serde_json::to_string_pretty(&self.project).map_err(|e| ProjectError::ParseError {
                path: project_path.clone(),
                source: e,
            })?;
        std::fs::write(&project_path, project_json).map_err(|e| ProjectError::IoError {
            path: project_path,
            source: e,
        })?;

        let captions_path = meta_dir.join("captions.json");
        let captions_json =
            serde_json::to_string_pretty(&self.captions).map_err(|e| ProjectError::ParseError {
                path: captions_path.clone(),
                source: e,
            })?;
        std::fs::write(&captions_path, captions_json).map_err(|e| ProjectError::IoError {
            path: captions_path,
            source: e,
        })?;

        Ok(())
    }

    /// Create a new project on disk with the standard directory structure.
    pub fn create(root: impl AsRef<Path>, name: impl Into<String>) -> Result<Self, ProjectError> {
        let root = root.as_ref().to_path_buf();

        for subdir in &["meta", "exports"] {
            std::fs::create_dir_all(root.join(subdir)).map_err(|e| ProjectError::IoError {
                path: root.join(subdir),
                source: e,
            })?;
        }

        let mut loaded = Self {
            root,
            project: Project::new(name),
            captions: CaptionTrack::new(),
        };
        loaded.save()?;
        Ok(loaded)
    }

    /// Attach a source video. Existing captions belong to the old source and
    /// are dropped.
    pub fn attach_source(&mut self, source: SourceRef) {
        self.project.source = Some(source);
        self.captions.replace_all(Vec::new());
    }

    /// Absolute path of the source video, if one is attached.
    pub fn source_path(&self) -> Option<PathBuf> {
        self.project.source.as_ref().map(|s| {
            if s.path.is_absolute() {
                s.path.clone()
            } else {
                self.root.join(&s.path)
            }
        })
    }

    /// Initial playback state for the attached source.
    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.project.source.as_ref().map(|s| {
            let mut state = PlaybackState::new(s.duration_secs, s.width, s.height);
            state.set_crop(self.project.output.crop_value);
            state
        })
    }

    /// Directory for rendered artifacts.
    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    /// Validate that all referenced source files exist.
    pub fn validate_sources(&self) -> Vec<String> {
        let mut errors = vec![];

        match self.source_path() {
            Some(path) if !path.exists() => {
                errors.push(format!("Source video missing: {}", path.display()));
            }
            Some(_) => {}
            None => errors.push("No source video attached".to_string()),
        }

        let duration = self
            .project
            .source
            .as_ref()
            .map(|s| s.duration_secs)
            .unwrap_or(0.0);
        for (index, chunk) in self.captions.iter().enumerate() {
            if chunk.text.trim().is_empty() {
                errors.push(format!("Caption {} has no text", index + 1));
            }
            if chunk.end < chunk.start {
                errors.push(format!("Caption {} ends before it starts", index + 1));
            }
            if duration > 0.0 && chunk.start > duration {
                errors.push(format!(
                    "Caption {} starts after the clip ends ({:.2}s > {:.2}s)",
                    index + 1,
                    chunk.start,
                    duration
                ));
            }
        }

        errors
    }
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

fn project_id(now: chrono::DateTime<chrono::Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_default() as u64;
    format!("{:016x}-{:08x}", nanos, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::CaptionChunk;

    fn temp_root(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reelcap_test_{label}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_project_creation() {
        let project = Project::new("Test Clip");
        assert_eq!(project.name, "Test Clip");
        assert_eq!(project.output.preset, AspectPreset::Vertical);
        assert_eq!(project.output.crop_value, 50.0);
        assert!(project.source.is_none());
    }

    #[test]
    fn test_legacy_project_without_style_gets_defaults() {
        let mut value = serde_json::to_value(Project::new("Legacy")).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("style");
        object.remove("output");
        object.remove("source");

        let parsed: Project = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.style, StyleConfig::default());
        assert_eq!(parsed.output.crop_value, 50.0);
    }

    #[test]
    fn test_loaded_project_create_and_load() {
        let dir = temp_root("create_load");

        let mut created = LoadedProject::create(&dir, "Integration Test").unwrap();
        created
            .captions
            .replace_all(vec![CaptionChunk::new(0.0, 1.0, "hello")]);
        created.save().unwrap();

        let loaded = LoadedProject::load(&dir).unwrap();
        assert_eq!(loaded.project.name, "Integration Test");
        assert_eq!(loaded.captions.len(), 1);
        assert_eq!(loaded.captions.chunks()[0].text, "hello");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_repairs_saved_captions() {
        let dir = temp_root("repair");
        LoadedProject::create(&dir, "Repair").unwrap();
        std::fs::write(
            dir.join("meta").join("captions.json"),
            r#"[
                {"id":920001,"start":-2.0,"end":-1.0,"text":"before zero"},
                {"id":920002,"start":1.0,"end":2.0,"text":""}
            ]"#,
        )
        .unwrap();

        let loaded = LoadedProject::load(&dir).unwrap();
        assert_eq!(loaded.captions.len(), 1);
        let chunk = &loaded.captions.chunks()[0];
        assert_eq!(chunk.start, 0.0);
        assert!(chunk.end > chunk.start);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_top_caption_id() {
        let dir = temp_root("top_id");
        LoadedProject::create(&dir, "Top Id").unwrap();
        std::fs::write(
            dir.join("meta").join("captions.json"),
            r#"[{"id":18446744073709551615,"start":0.0,"end":1.0,"text":"x"}]"#,
        )
        .unwrap();

        let err = LoadedProject::load(&dir).unwrap_err();
        assert!(matches!(err, ProjectError::ValidationError { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_attach_source_resets_captions() {
        let dir = temp_root("attach");
        let mut project = LoadedProject::create(&dir, "Attach").unwrap();
        project
            .captions
            .replace_all(vec![CaptionChunk::new(0.0, 1.0, "stale")]);

        project.attach_source(SourceRef {
            path: PathBuf::from("clip.mp4"),
            width: 1920,
            height: 1080,
            duration_secs: 12.0,
        });

        assert!(project.captions.is_empty());
        assert_eq!(project.source_path(), Some(dir.join("clip.mp4")));
        let playback = project.playback_state().unwrap();
        assert!(!playback.is_vertical);
        assert_eq!(playback.duration, 12.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_validate_sources_reports_missing() {
        let dir = temp_root("validate");
        let mut project = LoadedProject::create(&dir, "Validate").unwrap();
        assert!(project
            .validate_sources()
            .iter()
            .any(|e| e.contains("No source video")));

        project.attach_source(SourceRef {
            path: PathBuf::from("missing.mp4"),
            width: 720,
            height: 1280,
            duration_secs: 4.0,
        });
        project
            .captions
            .replace_all(vec![CaptionChunk::new(6.0, 7.0, "late")]);

        let errors = project.validate_sources();
        assert!(errors.iter().any(|e| e.contains("Source video missing")));
        assert!(errors.iter().any(|e| e.contains("starts after the clip ends")));

        std::fs::remove_dir_all(&dir).ok();
    }
}
