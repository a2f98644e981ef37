//! Bundled error page themes.

/// Theme used when the configuration does not name one.
pub const DEFAULT_THEME: &str = "cats";

/// Theme used when the configured one cannot be found.
pub const FALLBACK_THEME: &str = "app-down";

const THEMES: [(&str, &str); 2] = [
    ("app-down", include_str!("../themes/app-down.html")),
    ("cats", include_str!("../themes/cats.html")),
];

/// Strips an optional `.html` suffix from a theme name.
pub fn canonical_name(name: &str) -> &str {
    name.strip_suffix(".html").unwrap_or(name)
}

/// Returns the raw template document for `name`, if bundled.
pub fn get(name: &str) -> Option<&'static str> {
    let name = canonical_name(name);
    THEMES
        .iter()
        .find(|(theme, _)| *theme == name)
        .map(|(_, source)| *source)
}

/// Names of all bundled themes.
pub fn names() -> impl Iterator<Item = &'static str> {
    THEMES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_fallback_are_bundled() {
        assert!(get(DEFAULT_THEME).is_some());
        assert!(get(FALLBACK_THEME).is_some());
    }

    #[test]
    fn lookup_ignores_html_suffix() {
        assert_eq!(get("app-down.html"), get("app-down"));
        assert!(get("missing").is_none());
        assert!(get(".html").is_none());
    }

    #[test]
    fn lists_every_theme() {
        assert_eq!(names().collect::<Vec<_>>(), vec!["app-down", "cats"]);
    }
}
