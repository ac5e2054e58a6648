use regex::Regex;

/// Compiles and evaluates the four ordered pattern sets that gate a request:
/// `allow`, `deny`, `no_cache`, `rolling`.
///
/// Unparseable patterns are dropped at construction with a logged warning; a bad
/// pattern never fails startup.
#[derive(Debug, Clone)]
pub struct PolicyMatcher {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
    no_cache: Vec<Regex>,
    rolling: Vec<Regex>,
}

impl PolicyMatcher {
    pub fn new(
        allow: &[String],
        deny: &[String],
        no_cache: &[String],
        rolling: &[String],
    ) -> Self {
        Self {
            allow: compile_all(allow),
            deny: compile_all(deny),
            no_cache: compile_all(no_cache),
            rolling: compile_all(rolling),
        }
    }

    /// True iff some `allow` pattern matches the normalized path AND no `deny`
    /// pattern matches it. A path outside the allow surface is rejected without
    /// ever consulting `deny` — deny is a surgical override *within* the admitted
    /// surface, not an independent veto.
    pub fn is_allowed(&self, path: &str) -> bool {
        let normalized = normalize(path);
        for pattern in &self.allow {
            if pattern.is_match(&normalized) {
                return !self.deny.iter().any(|d| d.is_match(&normalized));
            }
        }
        false
    }

    /// True iff no `no_cache` pattern matches the normalized path.
    pub fn is_cacheable(&self, path: &str) -> bool {
        let normalized = normalize(path);
        !self.no_cache.iter().any(|p| p.is_match(&normalized))
    }

    /// True iff some `rolling` pattern matches the normalized path.
    pub fn is_rolling_redirection(&self, path: &str) -> bool {
        let normalized = normalize(path);
        self.rolling.iter().any(|p| p.is_match(&normalized))
    }
}

/// Strip the query string and collapse to a leading `/`.
fn normalize(path: &str) -> String {
    let without_query = path.split('?').next().unwrap_or("");
    format!("/{}", without_query.trim_matches('/'))
}

fn compile_all(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "dropping unparseable policy pattern");
                None
            }
        })
        .collect()
}
