use regex::Regex;
use tracing::warn;

const MIN_CONFIDENCE: f32 = 0.3;
const NAME_SCORE: f32 = 3.0;
const TEXT_PATTERN_SCORE: f32 = 2.0;
const URL_PATTERN_SCORE: f32 = 1.0;

struct Signature {
    name: &'static str,
    aliases: &'static [&'static str],
    patterns: &'static [&'static str],
}

const SIGNATURES: &[Signature] = &[
    Signature {
        name: "rust",
        aliases: &["rust", "rustlang"],
        patterns: &[r"\.rs\b", r"\bcargo\b", r"\bcrates?(?:\.io)?\b", r"\btokio\b"],
    },
    Signature {
        name: "go",
        aliases: &["go", "golang"],
        patterns: &[r"\.go\b", r"\bgo\.mod\b", r"\bgoroutines?\b"],
    },
    Signature {
        name: "python",
        aliases: &["python", "python3"],
        patterns: &[r"\.py\b", r"\bpip\b", r"\bdjango\b", r"\bflask\b", r"requirements\.txt", r"\bpypi\b"],
    },
    Signature {
        name: "javascript",
        aliases: &["javascript", "js"],
        patterns: &[r"\.js\b", r"\bnpm\b", r"\bnode(?:\.?js)?\b", r"\breact\b", r"package\.json"],
    },
    Signature {
        name: "typescript",
        aliases: &["typescript", "ts"],
        patterns: &[r"\.tsx?\b", r"\btsconfig\b", r"\bdeno\b"],
    },
    Signature {
        name: "java",
        aliases: &["java"],
        patterns: &[r"\.java\b", r"\bmaven\b", r"\bgradle\b", r"\bspring\b", r"pom\.xml"],
    },
    Signature {
        name: "ruby",
        aliases: &["ruby"],
        patterns: &[r"\.rb\b", r"\brails\b", r"\bgemfile\b"],
    },
    Signature {
        name: "csharp",
        aliases: &["c#", "csharp"],
        patterns: &[r"\.cs\b", r"\.csproj\b", r"\bdotnet\b", r"\bnuget\b"],
    },
    Signature {
        name: "php",
        aliases: &["php"],
        patterns: &[r"\.php\b", r"\bcomposer\b", r"\blaravel\b"],
    },
];

struct Compiled {
    name: &'static str,
    aliases: Vec<Regex>,
    patterns: Vec<Regex>,
}

/// Scores candidate languages from the request text and repository URL
pub struct LanguageDetector {
    signatures: Vec<Compiled>,
}

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("(?i){}", pattern))
        .map_err(|e| warn!(pattern, error = %e, "Skipping invalid language pattern"))
        .ok()
}

fn alias_pattern(alias: &str) -> String {
    // `\b` does not match around '#', so delimit aliases by non-word or edges
    format!(r"(?:^|[^\w]){}(?:[^\w#]|$)", regex::escape(alias))
}

impl LanguageDetector {
    pub fn new() -> Self {
        let signatures = SIGNATURES
            .iter()
            .map(|sig| Compiled {
                name: sig.name,
                aliases: sig
                    .aliases
                    .iter()
                    .filter_map(|a| compile(&alias_pattern(a)))
                    .collect(),
                patterns: sig.patterns.iter().filter_map(|p| compile(p)).collect(),
            })
            .collect();
        Self { signatures }
    }

    /// Languages with normalized confidence above 0.3, most confident first
    pub fn detect(&self, text: &str, url: &str) -> Vec<(String, f32)> {
        let mut scores: Vec<(&'static str, f32)> = self
            .signatures
            .iter()
            .map(|sig| {
                let mut score = 0.0;
                if sig.aliases.iter().any(|a| a.is_match(text)) {
                    score += NAME_SCORE;
                }
                for pattern in &sig.patterns {
                    score += TEXT_PATTERN_SCORE * pattern.find_iter(text).count() as f32;
                    score += URL_PATTERN_SCORE * pattern.find_iter(url).count() as f32;
                }
                (sig.name, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        let max = scores.iter().map(|(_, s)| *s).fold(0.0_f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }

        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        scores
            .into_iter()
            .map(|(name, score)| (name.to_string(), score / max))
            .filter(|(_, confidence)| *confidence > MIN_CONFIDENCE)
            .collect()
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(detected: &[(String, f32)]) -> Vec<&str> {
        detected.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn test_name_mention() {
        let detector = LanguageDetector::new();
        let detected = detector.detect("explore this Go repository", "https://github.com/a/b");
        assert_eq!(names(&detected), vec!["go"]);
        assert_eq!(detected[0].1, 1.0);
    }

    #[test]
    fn test_low_scores_dropped() {
        let detector = LanguageDetector::new();
        // rust: 3 + 2 (cargo) + 2 (crates) = 7; python: 2 (pip) -> 0.28
        let detected = detector.detect("audit the Rust cargo crates and pip usage", "");
        assert_eq!(names(&detected), vec!["rust"]);
    }

    #[test]
    fn test_url_patterns_count() {
        let detector = LanguageDetector::new();
        let detected = detector.detect("check it", "https://github.com/acme/widget-django-flask");
        assert_eq!(names(&detected), vec!["python"]);
    }

    #[test]
    fn test_csharp_alias() {
        let detector = LanguageDetector::new();
        let detected = detector.detect("review this C# service", "");
        assert_eq!(names(&detected), vec!["csharp"]);
    }

    #[test]
    fn test_nothing_detected() {
        let detector = LanguageDetector::new();
        assert!(detector.detect("look around", "").is_empty());
    }
}
