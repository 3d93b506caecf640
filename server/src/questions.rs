//! The question source: JSON category files loaded lazily and cached.
//!
//! Each category lives in `<dir>/<category>.json` as an array of questions.
//! The file is read on first fetch for that category and kept in memory;
//! every session gets its own shuffled sample. A missing or invalid file
//! yields an empty fetch, which the session reports as a content error.

use log::{info, warn};
use rand::seq::SliceRandom;
use rand::thread_rng;
use shared::Question;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Source of questions for new game sessions.
pub trait QuestionSource: Send + Sync {
    /// Up to `count` questions of the category, in random order. Empty when
    /// the category has no content.
    fn fetch(&self, category: &str, count: usize) -> Vec<Question>;
}

/// File-backed question bank with a per-category in-memory cache.
pub struct FileQuestionBank {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Vec<Question>>>,
}

impl FileQuestionBank {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        FileQuestionBank {
            dir: dir.as_ref().to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, category: &str) -> io::Result<Vec<Question>> {
        let path = self.dir.join(format!("{}.json", category));
        let data = fs::read_to_string(&path)?;
        let questions: Vec<Question> = serde_json::from_str(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        info!(
            "loaded {} questions for category '{}' from {}",
            questions.len(),
            category,
            path.display()
        );
        Ok(questions)
    }
}

impl QuestionSource for FileQuestionBank {
    fn fetch(&self, category: &str, count: usize) -> Vec<Question> {
        let mut cache = self.cache.lock().unwrap();
        let bank = cache.entry(category.to_string()).or_insert_with(|| {
            self.load(category).unwrap_or_else(|e| {
                warn!("no questions for category '{}': {}", category, e);
                Vec::new()
            })
        });

        let mut sample = bank.clone();
        sample.shuffle(&mut thread_rng());
        sample.truncate(count);
        sample
    }
}
