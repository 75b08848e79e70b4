//! Placeholder substitution for generated configuration.
//!
//! Templates use `%TOKEN%` placeholders. Rendering is a single left-to-right
//! pass: substituted values are never rescanned, and tokens missing from the
//! map stay in the output verbatim.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ProvisionError;

/// Templates compiled into the binary, keyed by file name
const EMBEDDED: &[(&str, &str)] = &[
    ("indiserver.service", include_str!("../../templates/indiserver.service")),
    ("indi-allsky.service", include_str!("../../templates/indi-allsky.service")),
    ("apache_indi-allsky.conf", include_str!("../../templates/apache_indi-allsky.conf")),
    (
        "apache_indi-allsky_redhat.conf",
        include_str!("../../templates/apache_indi-allsky_redhat.conf"),
    ),
    ("rsyslog_indi-allsky.conf", include_str!("../../templates/rsyslog_indi-allsky.conf")),
    ("logrotate_indi-allsky", include_str!("../../templates/logrotate_indi-allsky")),
    ("flask.json", include_str!("../../templates/flask.json")),
];

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%[A-Z][A-Z0-9_]*%").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDocument {
    pub source_path: PathBuf,
    source: String,
    pub placeholders: BTreeMap<String, String>,
}

impl TemplateDocument {
    pub fn new(source_path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            source: source.into(),
            placeholders: BTreeMap::new(),
        }
    }

    /// Load template `name`, preferring a copy in `override_dir` over the
    /// embedded one.
    pub fn load(name: &str, override_dir: Option<&Path>) -> Result<Self, ProvisionError> {
        if let Some(dir) = override_dir {
            let path = dir.join(name);
            if path.is_file() {
                let source = std::fs::read_to_string(&path)
                    .map_err(|e| ProvisionError::resource(&path, format!("Failed to read template: {e}")))?;
                log::debug!("Using template override {}", path.display());
                return Ok(Self::new(path, source));
            }
        }

        EMBEDDED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(n, src)| Self::new(format!("<embedded>/{n}"), *src))
            .ok_or_else(|| ProvisionError::resource(name, "no such template"))
    }

    pub fn with(mut self, token: &str, value: impl Into<String>) -> Self {
        self.placeholders.insert(token.to_string(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute every mapped placeholder. Pure: same input, same bytes.
    pub fn render(&self) -> String {
        render(&self.source, &self.placeholders)
    }
}

/// Replace each exact occurrence of a mapped token with its value.
///
/// Where tokens overlap at one position the longest wins.
pub fn render(source: &str, placeholders: &BTreeMap<String, String>) -> String {
    let mut tokens: Vec<(&str, &str)> = placeholders
        .iter()
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if tokens.is_empty() {
        return source.to_string();
    }
    tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while !rest.is_empty() {
        if let Some((token, value)) = tokens.iter().find(|(t, _)| rest.starts_with(t)) {
            out.push_str(value);
            rest = &rest[token.len()..];
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
    }
    out
}

/// `%NAME%` tokens still present in rendered text
pub fn unresolved_tokens(rendered: &str) -> Vec<String> {
    let mut found: Vec<String> = TOKEN_RE
        .find_iter(rendered)
        .map(|m| m.as_str().to_string())
        .collect();
    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_every_occurrence() {
        let out = render(
            "WorkingDirectory=%APP_DIRECTORY%\nExecStart=%APP_DIRECTORY%/allsky.py\n",
            &map(&[("%APP_DIRECTORY%", "/home/pi/indi-allsky")]),
        );
        assert_eq!(
            out,
            "WorkingDirectory=/home/pi/indi-allsky\nExecStart=/home/pi/indi-allsky/allsky.py\n"
        );
    }

    #[test]
    fn unknown_tokens_are_left_verbatim() {
        let out = render("User=%APP_USER% Extra=%NOT_MAPPED%", &map(&[("%APP_USER%", "pi")]));
        assert_eq!(out, "User=pi Extra=%NOT_MAPPED%");
        assert_eq!(unresolved_tokens(&out), vec!["%NOT_MAPPED%".to_string()]);
    }

    #[test]
    fn token_scan_skips_apache_variables() {
        let site = TemplateDocument::load("apache_indi-allsky.conf", None).unwrap();
        assert!(unresolved_tokens(site.source()).is_empty());

        let text = "%LOG_FILE% %{HTTP_HOST} %lower% %LOG_FILE% %DB_URI%";
        for _ in 0..3 {
            assert_eq!(unresolved_tokens(text), ["%DB_URI%", "%LOG_FILE%"]);
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let doc = TemplateDocument::load("indiserver.service", None)
            .unwrap()
            .with("%DRIVER_PATH%", "/usr/bin")
            .with("%SERVICE_USER%", "pi")
            .with("%DRIVER_NAME%", "indi_asi_ccd");
        assert_eq!(doc.render().as_bytes(), doc.render().as_bytes());
        assert!(doc.render().contains("ExecStart=/usr/bin/indiserver -v indi_asi_ccd"));
        assert!(unresolved_tokens(&doc.render()).is_empty());
    }

    #[test]
    fn values_are_not_rescanned() {
        let out = render(
            "%A% %B%",
            &map(&[("%A%", "%B%"), ("%B%", "b")]),
        );
        assert_eq!(out, "%B% b");
    }

    #[test]
    fn longest_token_wins_on_overlap() {
        let out = render("%APP%%APP_USER%", &map(&[("%APP%", "x"), ("%APP_USER%", "pi")]));
        assert_eq!(out, "xpi");
    }

    #[test]
    fn empty_map_returns_source() {
        let src = "RewriteCond %{HTTPS} off\n";
        assert_eq!(render(src, &BTreeMap::new()), src);
    }

    #[test]
    fn multibyte_text_survives() {
        let out = render("Öffnung %DIR% ✓", &map(&[("%DIR%", "/tmp")]));
        assert_eq!(out, "Öffnung /tmp ✓");
    }

    #[test]
    fn override_directory_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("indiserver.service"), "custom %DRIVER_NAME%").unwrap();

        let doc = TemplateDocument::load("indiserver.service", Some(dir.path())).unwrap();
        assert_eq!(doc.source(), "custom %DRIVER_NAME%");

        let fallback = TemplateDocument::load("indi-allsky.service", Some(dir.path())).unwrap();
        assert!(fallback.source().contains("%APP_DIRECTORY%"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(TemplateDocument::load("nope.conf", None).is_err());
    }
}
