//! Voice catalog and voice selection
//!
//! The catalog may be filled after startup (some backends list voices over
//! the network). Readers either see the voices or wait once for them.

use std::sync::Arc;

use tokio::sync::watch;

/// A synthesis voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Backend identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Descriptive labels (gender, accent, ...)
    pub tags: Vec<String>,
}

impl Voice {
    /// Whether the voice name or any tag mentions `preference`
    #[must_use]
    pub fn matches(&self, preference: &str) -> bool {
        let preference = preference.trim().to_lowercase();
        if preference.is_empty() {
            return false;
        }

        self.name.to_lowercase().contains(&preference)
            || self.tags.iter().any(|t| t.to_lowercase() == preference)
    }
}

/// Pick the preferred voice, falling back to the first one
#[must_use]
pub fn select_voice<'a>(voices: &'a [Voice], preference: &str) -> Option<&'a Voice> {
    voices
        .iter()
        .find(|v| v.matches(preference))
        .or_else(|| voices.first())
}

/// Shared, possibly not-yet-populated list of voices
///
/// `None` means the list has not arrived yet; an empty list means the
/// backend has no voices to offer.
#[derive(Clone)]
pub struct VoiceCatalog {
    cell: Arc<watch::Sender<Option<Arc<[Voice]>>>>,
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self::pending()
    }
}

impl VoiceCatalog {
    /// Catalog still waiting for its voices
    #[must_use]
    pub fn pending() -> Self {
        let (cell, _) = watch::channel(None);
        Self {
            cell: Arc::new(cell),
        }
    }

    /// Catalog that is ready right away
    #[must_use]
    pub fn ready(voices: Vec<Voice>) -> Self {
        let catalog = Self::pending();
        catalog.populate(voices);
        catalog
    }

    /// Publish the voice list
    pub fn populate(&self, voices: Vec<Voice>) {
        tracing::debug!(count = voices.len(), "voice catalog populated");
        self.cell.send_replace(Some(voices.into()));
    }

    /// Voices if already available
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<[Voice]>> {
        self.cell.borrow().clone()
    }

    /// Voices, waiting for one catalog update if none have arrived yet
    ///
    /// This waits for a single change and does not poll; if that change
    /// still carries no list, `None` is returned.
    pub async fn voices_or_wait(&self) -> Option<Arc<[Voice]>> {
        let mut rx = self.cell.subscribe();
        if let Some(voices) = rx.borrow_and_update().clone() {
            return Some(voices);
        }

        tracing::debug!("voice catalog not populated yet, deferring");
        if rx.changed().await.is_err() {
            return None;
        }
        rx.borrow().clone()
    }
}
