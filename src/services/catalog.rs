//! Category catalog: best-fit matching of free-text category labels.
//!
//! DESIGN
//! ======
//! Stored categories are free text, so the same logical category shows up
//! under several spellings. The catalog holds the known display labels and
//! maps any raw label onto one of them: normalized exact match first, then
//! the highest word-overlap score above [`MATCH_THRESHOLD`]. Labels that fit
//! nothing keep their own (trimmed) spelling as a group.
//!
//! The catalog is plain data handed to whoever needs it; `reload` swaps the
//! label set explicitly.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::template::{TemplateRecord, UNCATEGORIZED, normalize_label, slugify};

/// Minimum word-overlap score for a fuzzy catalog match.
pub const MATCH_THRESHOLD: f64 = 0.5;

const GROUP_COLORS: [&str; 8] = ["#EF4444", "#F59E0B", "#10B981", "#3B82F6", "#8B5CF6", "#EC4899", "#14B8A6", "#64748B"];
const GROUP_ICONS: [&str; 8] = ["film", "image", "layout", "megaphone", "music", "sparkles", "star", "folder"];

/// Known category labels, in display order.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    // Video platforms
    "YouTube Video",
    "YouTube Intro",
    "YouTube Outro",
    "YouTube Shorts",
    "YouTube Thumbnail",
    "YouTube Banner",
    "YouTube End Screen",
    "Instagram Post",
    "Instagram Story",
    "Instagram Reel",
    "Instagram Carousel",
    "Instagram Highlight Cover",
    "TikTok Video",
    "TikTok Ad",
    "Facebook Post",
    "Facebook Cover",
    "Facebook Story",
    "Facebook Ad",
    "Facebook Event Cover",
    "Twitter Post",
    "Twitter Header",
    "LinkedIn Post",
    "LinkedIn Banner",
    "LinkedIn Carousel",
    "Pinterest Pin",
    "Pinterest Idea Pin",
    "Snapchat Story",
    "Twitch Overlay",
    "Twitch Panel",
    "Twitch Offline Screen",
    "Twitch Alert",
    "Discord Banner",
    "Podcast Cover",
    "Podcast Audiogram",
    "Spotify Canvas",
    "Album Cover",
    "Vimeo Video",
    // Video formats
    "Intro",
    "Outro",
    "Logo Reveal",
    "Lower Third",
    "Title Sequence",
    "Opener",
    "Slideshow",
    "Promo Video",
    "Explainer Video",
    "Product Video",
    "Product Demo",
    "Testimonial Video",
    "Tutorial",
    "Vlog",
    "Trailer",
    "Teaser",
    "Countdown",
    "Transition",
    "Kinetic Typography",
    "Lyric Video",
    "Music Visualizer",
    "Animated Text",
    "Animated Logo",
    "Subtitles",
    "Green Screen",
    "Stop Motion",
    "Whiteboard Animation",
    "Infographic Video",
    "Motion Graphics",
    "Glitch Effect",
    "Photo Collage",
    "Split Screen",
    "Quote Video",
    "Meme",
    "GIF",
    // Marketing
    "Marketing",
    "Advertisement",
    "Banner Ad",
    "Display Ad",
    "Sale",
    "Black Friday",
    "Cyber Monday",
    "Flash Sale",
    "Discount Coupon",
    "Product Launch",
    "Brand Story",
    "Email Header",
    "Newsletter",
    "Landing Page Hero",
    "Real Estate",
    "Restaurant Menu",
    "Food",
    "Fashion",
    "Beauty",
    "Fitness",
    "Travel",
    "Technology",
    "Gaming",
    "Sports",
    "Education",
    "Healthcare",
    "Finance",
    "Nonprofit",
    "Automotive",
    "Music",
    // Events
    "Event",
    "Event Invitation",
    "Wedding",
    "Wedding Invitation",
    "Birthday",
    "Birthday Invitation",
    "Anniversary",
    "Baby Shower",
    "Graduation",
    "Party Flyer",
    "Concert Poster",
    "Conference",
    "Webinar",
    "Live Stream",
    "Save the Date",
    // Seasonal
    "Christmas",
    "New Year",
    "Halloween",
    "Thanksgiving",
    "Valentine's Day",
    "Easter",
    "Mother's Day",
    "Father's Day",
    "Summer",
    "Back to School",
    "Ramadan",
    "Diwali",
    "Lunar New Year",
    // Print and documents
    "Poster",
    "Flyer",
    "Brochure",
    "Business Card",
    "Certificate",
    "Invoice",
    "Letterhead",
    "Resume",
    "Menu",
    "Postcard",
    "Greeting Card",
    "Label",
    "Ticket",
    // Presentations and web
    "Presentation",
    "Pitch Deck",
    "Infographic",
    "Report",
    "Mockup",
    "Logo",
    "Website Banner",
    "Blog Graphic",
    "Social Media",
    "Quote",
];

// =============================================================================
// TYPES
// =============================================================================

/// A view-time partition of templates sharing a display label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    /// Slug of `label`; the first half of a playground composite key.
    pub id: String,
    pub label: String,
    pub templates: Vec<TemplateRecord>,
    pub expanded: bool,
    pub color: &'static str,
    pub icon: &'static str,
}

impl CategoryGroup {
    #[must_use]
    pub fn new(label: &str) -> Self {
        let id = slugify(label);
        let (color, icon) = appearance(&id);
        Self { id, label: label.to_owned(), templates: Vec::new(), expanded: true, color, icon }
    }

    #[must_use]
    pub fn position(&self, template_id: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.id == template_id)
    }
}

/// Stable color and icon for a group id.
fn appearance(id: &str) -> (&'static str, &'static str) {
    let digest = Sha256::digest(id.as_bytes());
    let color = GROUP_COLORS[usize::from(digest[0]) % GROUP_COLORS.len()];
    let icon = GROUP_ICONS[usize::from(digest[1]) % GROUP_ICONS.len()];
    (color, icon)
}

#[derive(Debug, Clone)]
struct Entry {
    label: String,
    normalized: String,
    words: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    entries: Vec<Entry>,
    by_normalized: HashMap<String, usize>,
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().copied())
    }
}

impl CategoryCatalog {
    /// Build a catalog from display labels. Duplicates (after normalization)
    /// keep the first spelling.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = Self { entries: Vec::new(), by_normalized: HashMap::new() };
        catalog.reload(labels);
        catalog
    }

    /// Replace the label set.
    pub fn reload<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entries.clear();
        self.by_normalized.clear();
        for label in labels {
            let label = label.as_ref().trim();
            let normalized = normalize_label(label);
            if normalized.is_empty() || self.by_normalized.contains_key(&normalized) {
                continue;
            }
            let words = normalized.split(' ').map(str::to_owned).collect();
            self.by_normalized.insert(normalized.clone(), self.entries.len());
            self.entries.push(Entry { label: label.to_owned(), normalized, words });
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// Catalog label that best fits `raw`, if any clears the threshold.
    #[must_use]
    pub fn best_match(&self, raw: &str) -> Option<&str> {
        let normalized = normalize_label(raw);
        if normalized.is_empty() {
            return None;
        }
        if let Some(&index) = self.by_normalized.get(&normalized) {
            return Some(&self.entries[index].label);
        }

        let words: HashSet<String> = normalized.split(' ').map(str::to_owned).collect();
        let mut best: Option<(usize, f64)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let score = overlap(&words, &entry.words);
            if score < MATCH_THRESHOLD {
                continue;
            }
            // Strictly greater keeps the earlier entry on ties.
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| self.entries[index].label.as_str())
    }

    /// Display label for a raw category: catalog match, else the trimmed raw
    /// label, else [`UNCATEGORIZED`].
    #[must_use]
    pub fn resolve_label(&self, raw: &str) -> String {
        if let Some(label) = self.best_match(raw) {
            return label.to_owned();
        }
        let trimmed = raw.trim();
        if normalize_label(trimmed).is_empty() { UNCATEGORIZED.to_owned() } else { trimmed.to_owned() }
    }

    /// Partition records into category groups.
    ///
    /// Every record lands in exactly one group. Catalog groups come first in
    /// catalog order, then unmatched labels alphabetically. Record order inside
    /// a group follows input order.
    #[must_use]
    pub fn group(&self, records: &[TemplateRecord]) -> Vec<CategoryGroup> {
        let mut groups: HashMap<String, CategoryGroup> = HashMap::new();
        for record in records {
            let label = self.resolve_label(&record.category);
            let group = groups.entry(slugify(&label)).or_insert_with(|| CategoryGroup::new(&label));
            group.templates.push(record.clone());
        }

        let mut ordered: Vec<CategoryGroup> = groups.into_values().collect();
        ordered.sort_by(|a, b| {
            let rank_a = self.rank(&a.label);
            let rank_b = self.rank(&b.label);
            rank_a.cmp(&rank_b).then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
        });
        ordered
    }

    fn rank(&self, label: &str) -> usize {
        self.by_normalized
            .get(&normalize_label(label))
            .copied()
            .unwrap_or(usize::MAX)
    }
}

/// Jaccard index of two word sets. Empty sets score 0.
fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let score = a.intersection(b).count() as f64 / union as f64;
    score
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
