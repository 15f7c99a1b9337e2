use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const WINDOW_ROWS: usize = 16;

/// One directory's entries and a cursor over them.
#[derive(Debug)]
pub struct Browser {
    dir: PathBuf,
    entries: Vec<String>,
    cursor: usize,
}

impl Browser {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut browser = Self {
            dir: dir.into(),
            entries: Vec::new(),
            cursor: 0,
        };
        browser.refresh()?;
        Ok(browser)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.entries = list_dir(&self.dir)?;
        self.cursor = self.cursor.min(self.entries.len().saturating_sub(1));
        Ok(())
    }

    pub fn select_next(&mut self) {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }

    pub fn selected_path(&self) -> Option<PathBuf> {
        self.selected_name().map(|name| self.dir.join(name))
    }

    /// Descends into the entry under the cursor when it is a directory.
    /// Returns whether the directory changed.
    pub fn enter(&mut self) -> Result<bool> {
        let Some(path) = self.selected_path() else {
            return Ok(false);
        };
        let metadata = path
            .metadata()
            .with_context(|| format!("failed to inspect {}", path.display()))?;
        if !metadata.is_dir() {
            return Ok(false);
        }
        self.dir = path;
        self.cursor = 0;
        self.refresh()?;
        Ok(true)
    }

    /// Moves to the parent directory. At the filesystem root this only re-reads
    /// the listing and keeps the cursor.
    pub fn up(&mut self) -> Result<bool> {
        let changed = match self.dir.parent() {
            Some(parent) => {
                self.dir = parent.to_path_buf();
                self.cursor = 0;
                true
            }
            None => false,
        };
        self.refresh()?;
        Ok(changed)
    }

    /// Index range of the rows to draw, at most `WINDOW_ROWS` wide around the
    /// cursor.
    pub fn window(&self) -> std::ops::Range<usize> {
        let half = WINDOW_ROWS / 2;
        let start = self.cursor.saturating_sub(half);
        let end = (self.cursor + half).min(self.entries.len());
        start..end.max(start)
    }
}

fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}
