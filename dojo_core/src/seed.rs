//! Demo content for a fresh store.

use crate::error::Result;
use crate::store::ContentStore;
use std::fs;
use tracing::info;

pub const DEMO_SECTION: &str = "KungFu";
pub const DEMO_SUBSECTION: &str = "Basics";
pub const DEMO_EXERCISE: &str = "HorseStance";
pub const DEMO_TEXT: &str = "Demo text";
pub const DEMO_NOTES: &str = "Demo notes";

impl ContentStore {
    /// Populate an empty store with one sample exercise.
    ///
    /// Returns `false` without touching anything if the root already has
    /// entries.
    pub fn seed_demo(&self) -> Result<bool> {
        fs::create_dir_all(self.root())?;
        if fs::read_dir(self.root())?.next().is_some() {
            return Ok(false);
        }

        let section = self.create_section(None, DEMO_SECTION)?;
        let subsection = self.create_section(Some(&section), DEMO_SUBSECTION)?;
        let exercise = self.create_exercise(&subsection, DEMO_EXERCISE)?;
        self.update_text(&exercise, DEMO_TEXT)?;
        self.update_notes(&exercise, DEMO_NOTES)?;

        info!(root = %self.root().display(), exercise = %exercise, "seeded demo content");
        Ok(true)
    }
}
