//! Natural-language project reference resolution.
//!
//! # Responsibility
//! - Map free text plus session context to one canonical project name and a
//!   confidence tier.
//! - Surface ambiguity instead of tie-breaking it.
//! - Record every definite resolution in the session context.
//!
//! # Invariants
//! - Stages run in trust order: explicit, implicit, partial, active.
//! - An explicitly named fragment with no exact match only seeds the partial
//!   stage; it never produces a tier of its own.
//! - Implicit rules only see the query with the explicit span removed, so
//!   "the project amarillo" names amarillo rather than the active project.
//! - Session references never resolve to an archived or missing project.
//! - The cached name listing is reused until [`ProjectReferenceResolver::clear_cache`].

use crate::config::SitebookConfig;
use crate::naming::generator::normalize_name;
use crate::repo::project_repo::{ProjectStore, RepoResult};
use crate::repo::session_repo::SessionContextStore;
use crate::resolve::fuzzy::{query_tokens, rank_names, MatchPolicy, PartialMatch};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};

/// Ordered explicit-reference rules; the `name` group captures the fragment.
static EXPLICIT_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bfor\s+project\s+(?P<name>[a-z0-9][a-z0-9_\-]*)",
        r"(?i)\bfor\s+(?:the\s+)?(?P<name>[a-z0-9][a-z0-9_\-]*)\s+project\b",
        r"(?i)\bproject\s+(?P<name>[a-z0-9][a-z0-9_\-]*)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid explicit rule"))
    .collect()
});

/// Captured words that are grammar, not project names.
const EXPLICIT_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "called", "for", "from", "in", "into", "is", "it", "named",
    "of", "on", "or", "that", "the", "this", "to", "with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImplicitTarget {
    MostRecent,
    Active,
}

/// Ordered implicit-reference rules.
static IMPLICIT_RULES: Lazy<Vec<(Regex, ImplicitTarget)>> = Lazy::new(|| {
    [
        (
            r"(?i)\bthat\s+(?:project|one|site)\b",
            ImplicitTarget::MostRecent,
        ),
        (
            r"(?i)\b(?:the|this|current)\s+(?:project|site)\b",
            ImplicitTarget::Active,
        ),
        (
            r"(?i)\b(?:continue|keep\s+going|carry\s+on|resume)\b",
            ImplicitTarget::Active,
        ),
        // Bare pronoun, as lifted out of "delete it".
        (r"(?i)^\s*it\s*$", ImplicitTarget::Active),
    ]
    .into_iter()
    .map(|(pattern, target)| (Regex::new(pattern).expect("valid implicit rule"), target))
    .collect()
});

/// Self-reported trust level of a resolution, most trusted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Query named an existing project exactly.
    Explicit,
    /// Query used a session reference such as "that project".
    Implicit,
    /// Fuzzy match against existing names.
    Partial,
    /// Nothing matched; fell back to the session's active project.
    Active,
    /// No project could be identified.
    #[serde(rename = "none")]
    Unresolved,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
            Self::Partial => "partial",
            Self::Active => "active",
            Self::Unresolved => "none",
        }
    }
}

/// Result of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// Resolved canonical name; `None` when ambiguous or unresolved.
    pub name: Option<String>,
    pub confidence: Confidence,
    pub is_ambiguous: bool,
    /// Competing names when `is_ambiguous`.
    pub candidates: Vec<String>,
}

impl ResolutionResult {
    fn resolved(name: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            name: Some(name.into()),
            confidence,
            is_ambiguous: false,
            candidates: Vec::new(),
        }
    }

    fn ambiguous(candidates: Vec<String>) -> Self {
        Self {
            name: None,
            confidence: Confidence::Partial,
            is_ambiguous: true,
            candidates,
        }
    }

    fn unresolved() -> Self {
        Self {
            name: None,
            confidence: Confidence::Unresolved,
            is_ambiguous: false,
            candidates: Vec::new(),
        }
    }

    /// True when exactly one project was identified.
    pub fn is_resolved(&self) -> bool {
        self.name.is_some() && !self.is_ambiguous
    }
}

/// Cascading reference resolver with a cached name listing.
pub struct ProjectReferenceResolver<S, C> {
    store: Arc<S>,
    sessions: Arc<C>,
    names: Mutex<Option<Arc<Vec<String>>>>,
    suffix: String,
    threshold: f64,
    margin: f64,
}

impl<S: ProjectStore, C: SessionContextStore> ProjectReferenceResolver<S, C> {
    pub fn new(store: Arc<S>, sessions: Arc<C>, config: &SitebookConfig) -> Self {
        Self {
            store,
            sessions,
            names: Mutex::new(None),
            suffix: config.name_suffix.clone(),
            threshold: config.partial_match_threshold,
            margin: config.ambiguity_margin,
        }
    }

    /// Resolves a full command sentence.
    ///
    /// # Errors
    /// - Returns store or session persistence errors unchanged.
    pub fn resolve(&self, session_id: &str, query: &str) -> RepoResult<ResolutionResult> {
        let names = self.cached_names()?;

        let mut seed = None;
        let mut remainder = query.to_string();
        if let Some((span, fragment)) = explicit_capture(query) {
            if let Some(name) = self.exact_match(&names, &fragment) {
                return self.commit(session_id, ResolutionResult::resolved(name, Confidence::Explicit));
            }
            remainder.replace_range(span, " ");
            seed = Some(fragment);
        }

        if let Some(name) = self.implicit_target(session_id, &remainder)? {
            return self.commit(session_id, ResolutionResult::resolved(name, Confidence::Implicit));
        }

        if let Some(seed) = seed {
            if let Some(result) = self.partial(&names, &seed) {
                return self.commit(session_id, result);
            }
        }
        if let Some(result) = self.partial(&names, query) {
            return self.commit(session_id, result);
        }

        match self.live(self.sessions.active_project(session_id)?)? {
            Some(active) => {
                self.commit(session_id, ResolutionResult::resolved(active, Confidence::Active))
            }
            None => {
                debug!("event=resolve module=resolver status=unresolved session={session_id}");
                Ok(ResolutionResult::unresolved())
            }
        }
    }

    /// Resolves a bare reference lifted out of a command, e.g. the `X` in
    /// "delete project X".
    ///
    /// Unlike [`Self::resolve`] there is no active-project fallback: an
    /// unmatched fragment stays unresolved so destructive commands never
    /// silently retarget.
    pub fn resolve_fragment(
        &self,
        session_id: &str,
        fragment: &str,
    ) -> RepoResult<ResolutionResult> {
        let names = self.cached_names()?;
        if let Some(name) = self.exact_match(&names, fragment) {
            return self.commit(session_id, ResolutionResult::resolved(name, Confidence::Explicit));
        }
        if let Some(name) = self.implicit_target(session_id, fragment)? {
            return self.commit(session_id, ResolutionResult::resolved(name, Confidence::Implicit));
        }
        if let Some(result) = self.partial(&names, fragment) {
            return self.commit(session_id, result);
        }
        Ok(ResolutionResult::unresolved())
    }

    /// Drops the cached name listing; the next resolution re-reads the store.
    pub fn clear_cache(&self) {
        *self.names.lock().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("event=resolver_cache module=resolver status=cleared");
    }

    fn cached_names(&self) -> RepoResult<Arc<Vec<String>>> {
        let mut guard = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(names) = guard.as_ref() {
            return Ok(Arc::clone(names));
        }
        let names = Arc::new(self.store.list_names()?);
        *guard = Some(Arc::clone(&names));
        Ok(names)
    }

    fn exact_match(&self, names: &[String], fragment: &str) -> Option<String> {
        let typed = fragment.trim().to_lowercase().replace([' ', '_'], "-");
        if typed.is_empty() {
            return None;
        }
        let canonical = normalize_name(&typed, &self.suffix);
        names
            .iter()
            .find(|name| {
                let lowered = name.to_lowercase();
                lowered == typed || lowered == canonical
            })
            .cloned()
    }

    fn implicit_target(&self, session_id: &str, query: &str) -> RepoResult<Option<String>> {
        for (rule, target) in IMPLICIT_RULES.iter() {
            if !rule.is_match(query) {
                continue;
            }
            let found = match target {
                ImplicitTarget::MostRecent => self
                    .sessions
                    .context(session_id)?
                    .most_recent()
                    .map(str::to_string),
                ImplicitTarget::Active => self.sessions.active_project(session_id)?,
            };
            if let Some(name) = self.live(found)? {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    /// Keeps a session reference only while it names a stored, unarchived
    /// project.
    fn live(&self, reference: Option<String>) -> RepoResult<Option<String>> {
        let Some(name) = reference else {
            return Ok(None);
        };
        match self.store.load_project(&name)? {
            Some(record) if !record.is_archived() => Ok(Some(name)),
            _ => {
                debug!(
                    "event=resolve module=resolver status=stale_reference name={name}"
                );
                Ok(None)
            }
        }
    }

    fn partial(&self, names: &[String], text: &str) -> Option<ResolutionResult> {
        let tokens = query_tokens(text, &self.suffix);
        let policy = MatchPolicy {
            threshold: self.threshold,
            margin: self.margin,
            suffix: &self.suffix,
        };
        match rank_names(&tokens, names, policy) {
            PartialMatch::Unique(name) => Some(ResolutionResult::resolved(name, Confidence::Partial)),
            PartialMatch::Ambiguous(candidates) => Some(ResolutionResult::ambiguous(candidates)),
            PartialMatch::NoMatch => None,
        }
    }

    fn commit(&self, session_id: &str, result: ResolutionResult) -> RepoResult<ResolutionResult> {
        if let (Some(name), false) = (result.name.as_deref(), result.is_ambiguous) {
            self.sessions.append_history(session_id, name)?;
            self.sessions.set_active_project(session_id, name)?;
        }
        debug!(
            "event=resolve module=resolver status=ok session={} confidence={} ambiguous={} name={}",
            session_id,
            result.confidence.as_str(),
            result.is_ambiguous,
            result.name.as_deref().unwrap_or("-")
        );
        Ok(result)
    }
}

/// First explicitly named fragment in `query`, skipping grammar words.
pub fn extract_explicit_fragment(query: &str) -> Option<String> {
    explicit_capture(query).map(|(_, fragment)| fragment)
}

/// Byte span of the whole explicit phrase plus the captured fragment.
fn explicit_capture(query: &str) -> Option<(Range<usize>, String)> {
    EXPLICIT_RULES.iter().find_map(|rule| {
        rule.captures_iter(query).find_map(|caps| {
            let whole = caps.get(0)?;
            let fragment = caps.name("name")?.as_str();
            if EXPLICIT_STOP_WORDS.contains(&fragment.to_lowercase().as_str()) {
                return None;
            }
            Some((whole.range(), fragment.to_string()))
        })
    })
}
