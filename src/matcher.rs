//! Finding favorite clubs among a page's activity entries.
//!
//! A page is scanned in four steps: locate candidate entries (ordered
//! structural strategies, then a keyword text scan), pull a club name out of
//! each entry's text, fuzzy-match it against the favorites, and drop entries
//! that look unavailable or expose no signup control. Surviving matches are
//! ranked by favorite priority.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::browser::{first_visible_within, BrowserPage, ElementHandle, Locator};
use crate::config::AppConfig;
use crate::error::Result;

/// Lines carrying these words describe the slot, not the club.
const STATUS_WORDS: &[&str] = &["signups", "capacity", "room", "sponsor"];

/// Structural selectors for activity containers, most specific first.
const ACTIVITY_SELECTORS: &[&str] = &[
    ".activity-row",
    ".signup-row",
    "tr.activity",
    ".eighth-activity",
    "[data-activity]",
];

pub const DEFAULT_MAX_ENTRIES: usize = 20;

static UNAVAILABLE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)full|closed|waitlist|cancelled|no\s+space|disabled").expect("static pattern")
});

static SEAT_RATIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)/(\d+)").expect("static pattern"));

/// Favorite club names in priority order (index 0 first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteList {
    names: Vec<String>,
}

impl FavoriteList {
    /// Trim entries, drop blank ones, and reject empty or duplicated lists.
    pub fn parse(raw: &[String]) -> std::result::Result<Self, String> {
        let mut names: Vec<String> = Vec::with_capacity(raw.len());
        for entry in raw {
            let name = entry.trim();
            if name.is_empty() {
                continue;
            }
            if names.iter().any(|n| n == name) {
                return Err(format!("monitor.favorites has duplicate entry '{name}'"));
            }
            names.push(name.to_string());
        }

        if names.is_empty() {
            return Err("monitor.favorites must list at least one club".to_string());
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, favorite: &str) -> Option<usize> {
        self.names.iter().position(|n| n == favorite)
    }

    /// First favorite (in priority order) that fuzzily matches `club_name`.
    ///
    /// A favorite matches when it contains the name, the name contains it,
    /// or any of its words longer than three characters appears in the name.
    /// All comparisons ignore case.
    pub fn match_name(&self, club_name: &str) -> Option<(usize, &str)> {
        let name = club_name.to_lowercase();
        self.names.iter().enumerate().find_map(|(priority, favorite)| {
            let fav = favorite.to_lowercase();
            let hit = name.contains(&fav)
                || fav.contains(&name)
                || favorite
                    .split_whitespace()
                    .filter(|w| w.chars().count() > 3)
                    .any(|w| name.contains(&w.to_lowercase()));
            hit.then_some((priority, favorite.as_str()))
        })
    }
}

/// One activity as rendered on the currently loaded page.
///
/// `action` points into the live page and is only usable until the next
/// navigation.
pub struct ActivityEntry {
    pub raw_text: String,
    pub raw_markup: String,
    pub extracted_name: String,
    pub action: ElementHandle,
}

impl std::fmt::Debug for ActivityEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityEntry")
            .field("extracted_name", &self.extracted_name)
            .field("raw_text", &self.raw_text)
            .finish_non_exhaustive()
    }
}

/// An available activity whose name matched a favorite.
#[derive(Debug)]
pub struct Match {
    pub name: String,
    pub favorite: String,
    /// Index of `favorite` in the favorites list
    pub priority: usize,
    pub entry: ActivityEntry,
}

/// A way of locating activity containers on a page.
#[derive(Debug, Clone)]
pub enum ExtractionStrategy {
    /// Containers matching a structural selector
    Structural(Locator),
    /// Any element whose text mentions one of the keywords
    KeywordScan(Locator),
}

impl ExtractionStrategy {
    pub fn structural(css: &str) -> Self {
        ExtractionStrategy::Structural(Locator::css(css))
    }

    /// Case-insensitive scan for any of `keywords` in element text.
    pub fn keyword_scan<S: AsRef<str>>(keywords: &[S]) -> Option<Self> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return None;
        }

        match Regex::new(&format!("(?i){}", alternatives.join("|"))) {
            Ok(pattern) => Some(ExtractionStrategy::KeywordScan(Locator::matching(
                "body *", pattern,
            ))),
            Err(e) => {
                warn!("Keyword scan disabled: {}", e);
                None
            }
        }
    }

    fn locator(&self) -> &Locator {
        match self {
            ExtractionStrategy::Structural(l) | ExtractionStrategy::KeywordScan(l) => l,
        }
    }

    /// Entries this strategy finds, or `None` when it finds nothing.
    pub async fn extract(&self, page: &dyn BrowserPage) -> Option<Vec<ElementHandle>> {
        match page.find(self.locator()).await {
            Ok(found) if !found.is_empty() => Some(found),
            Ok(_) => None,
            Err(e) => {
                debug!(strategy = %self.locator(), "Extraction strategy failed: {}", e);
                None
            }
        }
    }
}

/// Pull a club name out of an entry's rendered text.
///
/// Skips status lines and returns the first line longer than five
/// characters that is not purely numeric, falling back to the first line.
pub fn extract_club_name(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .find(|line| {
            let lower = line.to_lowercase();
            !STATUS_WORDS.iter().any(|w| lower.contains(w))
                && line.chars().count() > 5
                && !line.chars().all(|c| c.is_ascii_digit())
        })
        .or_else(|| lines.first())
        .map(|l| l.to_string())
}

/// Whether an entry looks open for signups.
///
/// Availability is a denylist over the entry's text plus markup: any
/// closed/full wording, or a seat count of `0/n` or `n/n` (and over-full
/// counts), marks it unavailable. Anything else counts as available.
pub fn is_available(text: &str, markup: &str) -> bool {
    let combined = format!("{text} {markup}");
    if UNAVAILABLE_WORDS.is_match(&combined) {
        return false;
    }

    !SEAT_RATIO.captures_iter(&combined).any(|caps| {
        let taken = caps[1].parse::<u64>();
        let capacity = caps[2].parse::<u64>();
        match (taken, capacity) {
            (Ok(taken), Ok(capacity)) => taken == 0 || taken >= capacity,
            // Digit runs too long for u64 compare textually
            _ => caps[1].trim_start_matches('0').is_empty() || caps[1] == caps[2],
        }
    })
}

/// Controls that reserve an activity, tried in order.
pub fn signup_locators() -> Vec<Locator> {
    vec![
        Locator::has_text("button", "Sign up"),
        Locator::has_text("a", "Sign up"),
        Locator::css(r#"input[value*="Sign up"]"#),
        Locator::has_text("button", "Join"),
        Locator::has_text("a", "Join"),
        Locator::css(".signup-button"),
        Locator::css(".btn-signup"),
    ]
}

/// Scans pages for favorite clubs.
#[derive(Debug, Clone)]
pub struct ClubMatcher {
    favorites: FavoriteList,
    strategies: Vec<ExtractionStrategy>,
    fallback: Option<ExtractionStrategy>,
    max_entries: usize,
}

impl ClubMatcher {
    /// `fallback_keywords` plus the favorites themselves drive the
    /// last-resort text scan.
    pub fn new(favorites: FavoriteList, fallback_keywords: &[String], max_entries: usize) -> Self {
        let mut keywords: Vec<&str> = fallback_keywords.iter().map(String::as_str).collect();
        keywords.extend(favorites.names().iter().map(String::as_str));

        Self {
            strategies: ACTIVITY_SELECTORS
                .iter()
                .map(|css| ExtractionStrategy::structural(css))
                .collect(),
            fallback: ExtractionStrategy::keyword_scan(&keywords),
            favorites,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.favorites(),
            &config.monitor.fallback_keywords,
            config.monitor.max_entries_per_page,
        )
    }

    pub fn favorites(&self) -> &FavoriteList {
        &self.favorites
    }

    /// Available favorite matches on the loaded page, best first.
    ///
    /// Never fails: entries that error while being inspected are skipped.
    pub async fn find_matches(&self, page: &dyn BrowserPage) -> Vec<Match> {
        let candidates = self.candidates(page).await;
        let examined = candidates.len().min(self.max_entries);

        let mut matches = Vec::new();
        for element in candidates.into_iter().take(self.max_entries) {
            match self.inspect(element).await {
                Ok(Some(m)) => matches.push(m),
                Ok(None) => {}
                Err(e) => debug!("Skipping activity entry: {}", e),
            }
        }

        // Stable sort keeps page order among equal priorities
        matches.sort_by_key(|m| m.priority);
        debug!(examined, matched = matches.len(), "Scanned activity entries");
        matches
    }

    async fn candidates(&self, page: &dyn BrowserPage) -> Vec<ElementHandle> {
        for strategy in &self.strategies {
            if let Some(found) = strategy.extract(page).await {
                debug!(strategy = %strategy.locator(), count = found.len(), "Activity entries located");
                return found;
            }
        }

        match &self.fallback {
            Some(fallback) => {
                debug!("No structural activity entries, falling back to keyword scan");
                fallback.extract(page).await.unwrap_or_default()
            }
            None => Vec::new(),
        }
    }

    async fn inspect(&self, element: ElementHandle) -> Result<Option<Match>> {
        let raw_text = element.text().await?;
        let raw_markup = element.markup().await?;

        let Some(name) = extract_club_name(&raw_text) else {
            return Ok(None);
        };
        let Some((priority, favorite)) = self.favorites.match_name(&name) else {
            return Ok(None);
        };
        if !is_available(&raw_text, &raw_markup) {
            debug!(club = %name, "Favorite found but unavailable");
            return Ok(None);
        }
        let Some(action) = first_visible_within(element.as_ref(), &signup_locators()).await? else {
            debug!(club = %name, "Favorite available but no signup control");
            return Ok(None);
        };

        Ok(Some(Match {
            favorite: favorite.to_string(),
            priority,
            entry: ActivityEntry {
                raw_text,
                raw_markup,
                extracted_name: name.clone(),
                action,
            },
            name,
        }))
    }
}
