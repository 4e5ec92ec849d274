//! Command intent rule table.
//!
//! # Invariants
//! - Rules are tried in table order against the whole trimmed command; the
//!   first match wins.
//! - Captured references are returned raw (minus filler words) and resolved
//!   later; this module never touches the store.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// One recognised lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandIntent {
    Delete { target: String },
    BulkDelete { pattern: String },
    Rename { target: String, new_name: String },
    List { include_archived: bool },
    Archive { target: String },
    Unarchive { target: String },
    Merge {
        first: String,
        second: String,
        keep: Option<String>,
    },
    Export { target: String },
    FindDuplicates,
}

#[derive(Debug, Clone, Copy)]
enum IntentKind {
    BulkDelete,
    Delete,
    Rename,
    FindDuplicates,
    List,
    Unarchive,
    Archive,
    Merge,
    Export,
}

static COMMAND_RULES: Lazy<Vec<(Regex, IntentKind)>> = Lazy::new(|| {
    [
        (
            r"^(?:delete|remove|trash)\s+(?:all\s+)?projects\s+(?:matching|starting\s+with|like|named)\s+(?P<pattern>\S+)$",
            IntentKind::BulkDelete,
        ),
        (
            r"^(?:delete|remove|trash|get\s+rid\s+of)\s+(?P<target>.+)$",
            IntentKind::Delete,
        ),
        (
            r"^rename\s+(?P<target>.+?)\s+(?:to|as)\s+(?P<new>.+)$",
            IntentKind::Rename,
        ),
        (
            r"^change\s+(?:the\s+)?name\s+of\s+(?P<target>.+?)\s+to\s+(?P<new>.+)$",
            IntentKind::Rename,
        ),
        (
            r"^(?:find|check|show|list)\s+(?:for\s+)?(?:possible\s+)?duplicates?(?:\s+.*)?$",
            IntentKind::FindDuplicates,
        ),
        (
            r"^(?:list|show|display)\s+(?:me\s+)?(?:all\s+)?(?:of\s+)?(?:my\s+)?(?P<archived>archived\s+)?projects(?P<including>\s+including\s+archived(?:\s+ones)?)?$",
            IntentKind::List,
        ),
        (r"^what\s+are\s+my\s+projects$", IntentKind::List),
        (
            r"^(?:unarchive|restore)\s+(?P<target>.+)$",
            IntentKind::Unarchive,
        ),
        (r"^archive\s+(?P<target>.+)$", IntentKind::Archive),
        (
            r"^move\s+(?P<target>.+?)\s+to\s+(?:the\s+)?archive$",
            IntentKind::Archive,
        ),
        (
            r"^merge\s+(?P<first>.+?)\s+(?:and|with|into)\s+(?P<second>.+?)(?:\s*,?\s+(?:keep|keeping)\s+(?:the\s+name\s+)?(?P<keep>.+))?$",
            IntentKind::Merge,
        ),
        (
            r"^export\s+(?P<target>.+?)(?:\s+(?:to|as)\s+json)?$",
            IntentKind::Export,
        ),
    ]
    .into_iter()
    .map(|(pattern, kind)| {
        let case_insensitive = format!("(?i){pattern}");
        (
            Regex::new(&case_insensitive).expect("valid command rule"),
            kind,
        )
    })
    .collect()
});

static LEADING_FILLER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:the\s+)?(?:project\s+)?(?:called\s+|named\s+)?")
        .expect("valid leading filler regex")
});
static TRAILING_FILLER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+project$").expect("valid trailing filler regex"));
static DEICTIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:that|this|the|current)\s+(?:project|one|site)|it)$")
        .expect("valid deictic regex")
});

/// Parses one command sentence; `None` when no rule matches.
pub fn parse_command(text: &str) -> Option<CommandIntent> {
    let command = text
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?'))
        .trim();
    if command.is_empty() {
        return None;
    }
    COMMAND_RULES.iter().find_map(|(rule, kind)| {
        rule.captures(command)
            .and_then(|caps| build_intent(*kind, &caps))
    })
}

fn build_intent(kind: IntentKind, caps: &Captures<'_>) -> Option<CommandIntent> {
    let reference = |group: &str| caps.name(group).map(|m| clean_reference(m.as_str()));
    let intent = match kind {
        IntentKind::BulkDelete => CommandIntent::BulkDelete {
            pattern: caps.name("pattern")?.as_str().trim_matches(quote_char).to_string(),
        },
        IntentKind::Delete => CommandIntent::Delete {
            target: reference("target")?,
        },
        IntentKind::Rename => CommandIntent::Rename {
            target: reference("target")?,
            new_name: caps.name("new")?.as_str().trim().trim_matches(quote_char).to_string(),
        },
        IntentKind::FindDuplicates => CommandIntent::FindDuplicates,
        IntentKind::List => CommandIntent::List {
            include_archived: caps.name("archived").is_some() || caps.name("including").is_some(),
        },
        IntentKind::Unarchive => CommandIntent::Unarchive {
            target: reference("target")?,
        },
        IntentKind::Archive => CommandIntent::Archive {
            target: reference("target")?,
        },
        IntentKind::Merge => CommandIntent::Merge {
            first: reference("first")?,
            second: reference("second")?,
            keep: reference("keep"),
        },
        IntentKind::Export => CommandIntent::Export {
            target: reference("target")?,
        },
    };
    Some(intent)
}

/// Strips quoting and filler words around a captured project reference.
///
/// Deictic references such as "that project" are returned untouched so the
/// resolver can map them through session context.
fn clean_reference(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(quote_char).trim();
    if DEICTIC_RE.is_match(trimmed) {
        return trimmed.to_string();
    }
    let without_leading = LEADING_FILLER_RE.replace(trimmed, "");
    let cleaned = TRAILING_FILLER_RE.replace(&without_leading, "");
    let cleaned = cleaned.trim().trim_matches(quote_char).trim();
    if cleaned.is_empty() {
        trimmed.to_string()
    } else {
        cleaned.to_string()
    }
}

fn quote_char(c: char) -> bool {
    matches!(c, '"' | '\'' | '`')
}

#[cfg(test)]
mod tests {
    use super::{parse_command, CommandIntent};

    fn target(value: &str) -> String {
        value.to_string()
    }

    #[test]
    fn delete_vocabulary() {
        for text in [
            "delete project amarillo-tx-wind-farm",
            "remove amarillo-tx-wind-farm",
            "get rid of project amarillo-tx-wind-farm.",
            "Trash the amarillo-tx-wind-farm project",
        ] {
            assert_eq!(
                parse_command(text),
                Some(CommandIntent::Delete {
                    target: target("amarillo-tx-wind-farm")
                }),
                "{text}"
            );
        }
    }

    #[test]
    fn bulk_delete_takes_precedence_over_single_delete() {
        assert_eq!(
            parse_command("delete all projects matching test-*"),
            Some(CommandIntent::BulkDelete {
                pattern: "test-*".into()
            })
        );
        assert_eq!(
            parse_command("remove projects starting with tmp"),
            Some(CommandIntent::BulkDelete {
                pattern: "tmp".into()
            })
        );
    }

    #[test]
    fn rename_vocabulary() {
        let expected = Some(CommandIntent::Rename {
            target: target("old-site-wind-farm"),
            new_name: "Panhandle North".into(),
        });
        assert_eq!(
            parse_command("rename project old-site-wind-farm to Panhandle North"),
            expected
        );
        assert_eq!(
            parse_command("change the name of project old-site-wind-farm to Panhandle North"),
            expected
        );
    }

    #[test]
    fn list_vocabulary() {
        for text in ["list projects", "show my projects", "display all projects", "What are my projects?"] {
            assert_eq!(
                parse_command(text),
                Some(CommandIntent::List {
                    include_archived: false
                }),
                "{text}"
            );
        }
        assert_eq!(
            parse_command("list projects including archived"),
            Some(CommandIntent::List {
                include_archived: true
            })
        );
        assert_eq!(
            parse_command("show archived projects"),
            Some(CommandIntent::List {
                include_archived: true
            })
        );
    }

    #[test]
    fn archive_and_unarchive_vocabulary() {
        assert_eq!(
            parse_command("archive project lubbock-wind-farm"),
            Some(CommandIntent::Archive {
                target: target("lubbock-wind-farm")
            })
        );
        assert_eq!(
            parse_command("move lubbock-wind-farm to the archive"),
            Some(CommandIntent::Archive {
                target: target("lubbock-wind-farm")
            })
        );
        assert_eq!(
            parse_command("unarchive project lubbock-wind-farm"),
            Some(CommandIntent::Unarchive {
                target: target("lubbock-wind-farm")
            })
        );
        assert_eq!(
            parse_command("restore lubbock-wind-farm"),
            Some(CommandIntent::Unarchive {
                target: target("lubbock-wind-farm")
            })
        );
    }

    #[test]
    fn merge_vocabulary_with_optional_keep() {
        assert_eq!(
            parse_command("merge project a-wind-farm and b-wind-farm"),
            Some(CommandIntent::Merge {
                first: target("a-wind-farm"),
                second: target("b-wind-farm"),
                keep: None,
            })
        );
        assert_eq!(
            parse_command("merge a-wind-farm into b-wind-farm, keeping b-wind-farm"),
            Some(CommandIntent::Merge {
                first: target("a-wind-farm"),
                second: target("b-wind-farm"),
                keep: Some(target("b-wind-farm")),
            })
        );
    }

    #[test]
    fn export_and_duplicates_vocabulary() {
        assert_eq!(
            parse_command("export project sweetwater-wind-farm to json"),
            Some(CommandIntent::Export {
                target: target("sweetwater-wind-farm")
            })
        );
        assert_eq!(parse_command("find duplicates"), Some(CommandIntent::FindDuplicates));
        assert_eq!(
            parse_command("check for duplicate projects"),
            Some(CommandIntent::FindDuplicates)
        );
    }

    #[test]
    fn deictic_references_survive_cleanup() {
        assert_eq!(
            parse_command("delete that project"),
            Some(CommandIntent::Delete {
                target: target("that project")
            })
        );
    }

    #[test]
    fn unknown_text_is_not_a_command() {
        assert_eq!(parse_command("run a wake simulation"), None);
        assert_eq!(parse_command("   "), None);
    }
}
