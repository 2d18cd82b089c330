use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::{Deserialize, Serialize};

pub const PROGRESS_FILE: &str = "batch_progress.json";

/// Terms finished by earlier batch runs, persisted after every term.
#[derive(Serialize, Deserialize, Default)]
pub struct ProgressState {
    pub completed_terms: HashSet<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl ProgressState {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            info!("No progress file found. Starting fresh.");
            return ProgressState {
                path,
                ..ProgressState::default()
            };
        }

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read progress file: {}", e);
                return ProgressState {
                    path,
                    ..ProgressState::default()
                };
            }
        };
        match serde_json::from_str::<ProgressState>(&content) {
            Ok(mut state) => {
                info!("Resumed previous batch: {} terms done.", state.completed_terms.len());
                state.path = path;
                state
            }
            Err(e) => {
                error!("Failed to parse progress file: {}. Starting fresh.", e);
                ProgressState {
                    path,
                    ..ProgressState::default()
                }
            }
        }
    }

    pub fn mark_complete(&mut self, term: &str) {
        self.completed_terms.insert(term.to_string());
        self.save();
    }

    pub fn contains(&self, term: &str) -> bool {
        self.completed_terms.contains(term)
    }

    fn save(&self) {
        let json = match serde_json::to_string_pretty(self) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize progress state: {}", e);
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create progress directory: {}", e);
                return;
            }
        }
        if let Err(e) = fs::write(&self.path, json) {
            error!("Failed to write to progress file: {}", e);
        }
    }
}
