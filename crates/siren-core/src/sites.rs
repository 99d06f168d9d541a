use siren_store::{SiteMatch, SiteRegistry};

/// One matchable entry: lowered patterns paired with the match to return.
#[derive(Debug, Clone)]
struct SiteEntry {
    patterns: Vec<String>,
    result: SiteMatch,
}

/// Maps URLs to tracked sites by case-insensitive substring match.
///
/// Sites are tried in registry order and the first pattern hit wins; there
/// is no overlap resolution beyond that. Registry entries disabled at load
/// time are excluded entirely (per-site runtime toggles live in `Settings`
/// and are the daemon's concern).
#[derive(Debug, Clone)]
pub struct SiteMatcher {
    entries: Vec<SiteEntry>,
}

impl SiteMatcher {
    #[must_use]
    pub fn new(registry: &SiteRegistry) -> Self {
        let entries = registry
            .sites
            .iter()
            .filter(|site| site.enabled)
            .map(|site| SiteEntry {
                patterns: site.patterns.iter().map(|p| p.to_lowercase()).collect(),
                result: SiteMatch {
                    key: site.key.clone(),
                    name: site.name.clone(),
                },
            })
            .collect();
        Self { entries }
    }

    /// Detect which tracked site the URL belongs to, if any. Side-effect
    /// free; unmatched URLs return `None`.
    #[must_use]
    pub fn detect(&self, url: &str) -> Option<SiteMatch> {
        let url_lower = url.to_lowercase();
        for entry in &self.entries {
            if entry.patterns.iter().any(|p| url_lower.contains(p)) {
                return Some(entry.result.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siren_store::TrackedSite;

    fn matcher() -> SiteMatcher {
        SiteMatcher::new(&SiteRegistry::defaults())
    }

    #[test]
    fn detects_default_sites() {
        let m = matcher();
        assert_eq!(
            m.detect("https://www.netflix.com/browse").unwrap().key,
            "netflix"
        );
        assert_eq!(m.detect("https://www.xbox.com/play").unwrap().key, "xbox");
        assert_eq!(
            m.detect("https://www.hotstar.com/in/home").unwrap().name,
            "Disney+ Hotstar"
        );
    }

    #[test]
    fn match_is_case_insensitive() {
        let m = matcher();
        assert_eq!(m.detect("https://WWW.NETFLIX.COM/").unwrap().key, "netflix");
    }

    #[test]
    fn prime_matches_either_pattern() {
        let m = matcher();
        assert_eq!(
            m.detect("https://www.primevideo.com/detail").unwrap().key,
            "prime"
        );
        assert_eq!(
            m.detect("https://www.amazon.com/gp/video/storefront")
                .unwrap()
                .key,
            "prime"
        );
        assert!(m.detect("https://www.amazon.com/dp/B000").is_none());
    }

    #[test]
    fn unmatched_url_returns_none() {
        let m = matcher();
        assert!(m.detect("https://docs.rs/rodio").is_none());
        assert!(m.detect("about:blank").is_none());
    }

    #[test]
    fn first_listed_site_wins_on_overlap() {
        let site = |key: &str, pattern: &str| TrackedSite {
            key: key.to_string(),
            name: key.to_string(),
            patterns: vec![pattern.to_string()],
            enabled: true,
        };
        let registry = SiteRegistry {
            sites: vec![site("video", "video"), site("prime", "primevideo.com")],
        };
        let m = SiteMatcher::new(&registry);
        assert_eq!(m.detect("https://primevideo.com/").unwrap().key, "video");
    }

    #[test]
    fn disabled_registry_entries_are_skipped() {
        let registry = SiteRegistry {
            sites: vec![TrackedSite {
                key: "netflix".to_string(),
                name: "Netflix".to_string(),
                patterns: vec!["netflix.com".to_string()],
                enabled: false,
            }],
        };
        let m = SiteMatcher::new(&registry);
        assert!(m.detect("https://netflix.com/").is_none());
    }
}
