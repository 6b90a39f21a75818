use std::path::Path;

use anyhow::{Context, Result};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::error::BotError;

/// Static list of canned comment lines, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct CommentStore {
    lines: Vec<String>,
}

impl CommentStore {
    /// Read one comment per line. Lines are trimmed and blank lines skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read comments file: {}", path.display()))?;

        let store = Self::from_lines(content.lines());
        if store.is_empty() {
            warn!(
                "Comments file {} has no usable lines; random comments are disabled",
                path.display()
            );
        } else {
            info!("Loaded {} comments from {}", store.len(), path.display());
        }
        Ok(store)
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = lines
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        Self { lines }
    }

    /// Uniformly pick one line.
    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&str, BotError> {
        self.lines
            .choose(rng)
            .map(String::as_str)
            .ok_or(BotError::EmptyStore)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_from_lines_skips_blank_and_trims() {
        let store = CommentStore::from_lines(["  first  ", "", "   ", "second"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.lines, vec!["first", "second"]);
    }

    #[test]
    fn test_pick_random_returns_member() {
        let store = CommentStore::from_lines(["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let picked = store.pick_random(&mut rng).unwrap();
            assert!(["a", "b", "c"].contains(&picked));
        }
    }

    #[test]
    fn test_pick_random_eventually_hits_every_line() {
        let store = CommentStore::from_lines(["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(store.pick_random(&mut rng).unwrap().to_string());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_pick_random_empty_store() {
        let store = CommentStore::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            store.pick_random(&mut rng),
            Err(BotError::EmptyStore)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "chatterbot-comments-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "you again?\n\n  nice try  \n").unwrap();

        let store = CommentStore::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(store.lines, vec!["you again?", "nice try"]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = std::env::temp_dir().join("chatterbot-does-not-exist.txt");
        assert!(CommentStore::load(&path).is_err());
    }
}
