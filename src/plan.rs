//! Best-effort extraction of an embedded planning object from section text.
//!
//! The generator is not contractually required to keep its structured
//! planning data out of the narrative stream, so a section body may carry a
//! JSON plan inline: as the whole body, inside a fenced code block, or as a
//! bare brace-delimited span. This module detects such a plan, splits it out
//! losslessly, and normalizes it into a stable shape. Every failure path
//! falls through to "no plan found"; nothing here ever errors.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use serde::Serialize;

/// The five recognized plan keys.
const PLAN_KEYS: [&str; 5] = [
    "beats",
    "conflicts",
    "foreshadowing",
    "callback_targets",
    "role_goals",
];

/// Keys probed, in order, when a list entry is an object instead of a string.
const ENTRY_TEXT_KEYS: [&str; 9] = [
    "description",
    "beat",
    "content",
    "text",
    "goal",
    "item",
    "target",
    "name",
    "potential_use",
];

/// Role names that are really stray scalar keys, not characters.
const IGNORED_ROLE_KEYS: [&str; 9] = [
    "goal",
    "goals",
    "id",
    "description",
    "type",
    "item",
    "target",
    "source_chapter",
    "potential_use",
];

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").unwrap());

/// Normalized structured plan recovered from a section body.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlanDraft {
    pub beats: Vec<String>,
    pub conflicts: Vec<String>,
    pub foreshadowing: Vec<String>,
    pub callback_targets: Vec<String>,
    /// `(role, goal)` pairs in document order.
    pub role_goals: Vec<(String, String)>,
}

impl PlanDraft {
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
            && self.conflicts.is_empty()
            && self.foreshadowing.is_empty()
            && self.callback_targets.is_empty()
            && self.role_goals.is_empty()
    }
}

/// A section body split into prose and recovered plan data.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSectionBody {
    pub narrative: String,
    pub plan: Option<PlanDraft>,
}

/// Configurable acceptance thresholds for plan candidates.
///
/// The thresholds are heuristics observed against real generator output, not
/// a documented contract, so they are tunable rather than baked in.
#[derive(Debug, Clone, Copy)]
pub struct PlanExtractor {
    /// A candidate object needs at least this many of the five plan keys.
    pub min_key_hits: usize,
    /// Looser fallback: accept a content-bearing plan when at least this
    /// many key tokens appear textually in the candidate.
    pub min_text_key_hits: usize,
}

impl Default for PlanExtractor {
    fn default() -> Self {
        Self {
            min_key_hits: 2,
            min_text_key_hits: 3,
        }
    }
}

/// Parse a section body with the default thresholds.
pub fn parse_section_body(
    body: &str,
    chapter_number: u32,
    chapter_title: &str,
) -> ParsedSectionBody {
    PlanExtractor::default().parse(body, chapter_number, chapter_title)
}

impl PlanExtractor {
    /// Split `body` into narrative prose and an optional embedded plan.
    /// Pure and deterministic; a body with no valid candidate comes back
    /// unchanged apart from duplicate-heading removal.
    pub fn parse(&self, body: &str, chapter_number: u32, chapter_title: &str) -> ParsedSectionBody {
        for candidate in candidate_spans(body) {
            if let Some(plan) = self.accept(&body[candidate.json.clone()]) {
                let before = body[..candidate.span.start].trim();
                let after = body[candidate.span.end..].trim();
                let narrative = match (before.is_empty(), after.is_empty()) {
                    (true, true) => String::new(),
                    (false, true) => before.to_string(),
                    (true, false) => after.to_string(),
                    (false, false) => format!("{}\n\n{}", before, after),
                };
                return ParsedSectionBody {
                    narrative: strip_duplicate_heading(&narrative, chapter_number, chapter_title),
                    plan: Some(plan),
                };
            }
        }

        ParsedSectionBody {
            narrative: strip_duplicate_heading(body, chapter_number, chapter_title),
            plan: None,
        }
    }

    /// Try one candidate; `None` means "skip, keep scanning" - never an error.
    fn accept(&self, candidate: &str) -> Option<PlanDraft> {
        let candidate = candidate.trim();
        let parsed = parse_object(candidate)?;
        let object = parsed.as_object()?;

        let key_hits = PLAN_KEYS.iter().filter(|k| object.contains_key(**k)).count();
        let plan = normalize_plan(&parsed);
        if plan.is_empty() {
            return None;
        }
        if key_hits >= self.min_key_hits {
            return Some(plan);
        }

        // The object may carry content under fewer structural keys than the
        // threshold; fall back to counting key tokens in the raw text.
        let text_hits = PLAN_KEYS
            .iter()
            .filter(|k| {
                candidate.contains(&format!("\"{}\"", k))
                    || candidate.contains(&format!("'{}'", k))
            })
            .count();
        if text_hits >= self.min_text_key_hits {
            return Some(plan);
        }
        None
    }
}

/// Parse a candidate as a JSON value, retrying with quotes swapped for
/// Python-repr-style dicts (single-quoted throughout). The retry only runs
/// when the text carries no double quote at all, so mixed-quote prose can
/// never be corrupted into a false positive.
fn parse_object(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    if text.contains('\'') && !text.contains('"') {
        return serde_json::from_str(&text.replace('\'', "\"")).ok();
    }
    None
}

/// One detection candidate: `span` is what gets removed from the narrative,
/// `json` is the text that gets parsed. They differ only for fenced blocks,
/// where the markers are removed but the inner block is parsed.
struct Candidate {
    span: std::ops::Range<usize>,
    json: std::ops::Range<usize>,
}

/// Candidates in detection order: the whole trimmed body, each fenced code
/// block in document order, then the outermost brace span.
fn candidate_spans(body: &str) -> Vec<Candidate> {
    let mut spans = Vec::new();

    let trimmed = body.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        let start = body.len() - body.trim_start().len();
        spans.push(Candidate {
            span: start..start + trimmed.len(),
            json: start..start + trimmed.len(),
        });
    }

    for caps in FENCE_RE.captures_iter(body) {
        let whole = caps.get(0).expect("match always has group 0");
        let inner = caps.get(1).expect("fence pattern has one group");
        spans.push(Candidate {
            span: whole.start()..whole.end(),
            json: inner.start()..inner.end(),
        });
    }

    if let (Some(first), Some(last)) = (body.find('{'), body.rfind('}')) {
        if first < last {
            spans.push(Candidate {
                span: first..last + 1,
                json: first..last + 1,
            });
        }
    }

    spans
}

fn normalize_plan(value: &Value) -> PlanDraft {
    PlanDraft {
        beats: normalize_list(value.get("beats")),
        conflicts: normalize_list(value.get("conflicts")),
        foreshadowing: normalize_list(value.get("foreshadowing")),
        callback_targets: normalize_list(value.get("callback_targets")),
        role_goals: normalize_role_goals(value.get("role_goals")),
    }
}

/// Collapse internal whitespace and trim.
fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn entry_text(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(collapse_ws(s)),
        Value::Object(map) => {
            for key in ENTRY_TEXT_KEYS {
                match map.get(key) {
                    Some(Value::String(s)) if !s.trim().is_empty() => return Some(collapse_ws(s)),
                    Some(Value::Number(n)) => return Some(n.to_string()),
                    _ => {}
                }
            }
            None
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    let mut normalized: Vec<String> = Vec::new();
    for item in items {
        if let Some(text) = entry_text(item) {
            let lowered = text.to_lowercase();
            if text.is_empty() || lowered == "none" || lowered == "null" {
                continue;
            }
            if !normalized.contains(&text) {
                normalized.push(text);
            }
        }
    }
    normalized
}

fn normalize_role_goals(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(map)) = value else {
        return Vec::new();
    };
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (raw_role, raw_goal) in map {
        let role = collapse_ws(raw_role);
        let goal = match raw_goal {
            Value::String(s) => collapse_ws(s),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        };
        if role.is_empty() || goal.is_empty() {
            continue;
        }
        if IGNORED_ROLE_KEYS.contains(&role.to_lowercase().as_str()) {
            continue;
        }
        match pairs.iter_mut().find(|(r, _)| *r == role) {
            Some(pair) => pair.1 = goal,
            None => pairs.push((role, goal)),
        }
    }
    pairs
}

/// Drop a leading line that merely echoes the known chapter heading, e.g. a
/// generator that repeats "Chapter 3 The Locked Gate" above the prose.
fn strip_duplicate_heading(text: &str, chapter_number: u32, chapter_title: &str) -> String {
    let mut lines = text.splitn(2, '\n');
    let Some(first) = lines.next() else {
        return text.to_string();
    };
    let rest = lines.next().unwrap_or("");

    let normalized = collapse_ws(first.trim_start_matches('#'))
        .trim_end_matches(|c| c == ':' || c == '：')
        .to_lowercase();
    if normalized.is_empty() {
        return text.to_string();
    }

    let title = collapse_ws(chapter_title).to_lowercase();
    let mut known = vec![
        format!("chapter {}", chapter_number),
        format!("第{}章", chapter_number),
    ];
    if !title.is_empty() {
        known.push(title.clone());
        known.push(format!("chapter {} {}", chapter_number, title));
        known.push(format!("chapter {}: {}", chapter_number, title));
        known.push(format!("第{}章 {}", chapter_number, title));
    }

    if known.iter().any(|k| *k == normalized) {
        rest.trim_start_matches(|c| c == '\n' || c == '\r').to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brace_span_worked_example() {
        let body = "intro text\n{\"beats\":[\"a\",\"b\"],\"conflicts\":[\"x\"]}\nmore text";
        let parsed = parse_section_body(body, 1, "");
        let plan = parsed.plan.expect("plan recovered");
        assert_eq!(plan.beats, vec!["a", "b"]);
        assert_eq!(plan.conflicts, vec!["x"]);
        assert!(plan.foreshadowing.is_empty());
        assert!(plan.callback_targets.is_empty());
        assert!(plan.role_goals.is_empty());
        assert_eq!(parsed.narrative, "intro text\n\nmore text");
    }

    #[test]
    fn test_whole_body_json() {
        let body = r#"  {"beats": ["open"], "role_goals": {"Chen": "find the key"}}  "#;
        let parsed = parse_section_body(body, 1, "");
        let plan = parsed.plan.expect("plan recovered");
        assert_eq!(plan.beats, vec!["open"]);
        assert_eq!(
            plan.role_goals,
            vec![("Chen".to_string(), "find the key".to_string())]
        );
        assert_eq!(parsed.narrative, "");
    }

    #[test]
    fn test_fenced_block_removed_from_narrative() {
        let body = "The rain kept falling.\n\n```json\n{\"beats\": [\"flood\"], \"conflicts\": [\"dam breaks\"]}\n```\n\nShe ran for the hills.";
        let parsed = parse_section_body(body, 2, "Rain");
        let plan = parsed.plan.expect("plan recovered");
        assert_eq!(plan.beats, vec!["flood"]);
        assert_eq!(
            parsed.narrative,
            "The rain kept falling.\n\nShe ran for the hills."
        );
    }

    #[test]
    fn test_fence_without_language_tag() {
        let body = "before\n```\n{\"conflicts\": [\"a\"], \"foreshadowing\": [\"b\"]}\n```\nafter";
        let parsed = parse_section_body(body, 1, "");
        assert!(parsed.plan.is_some());
        assert_eq!(parsed.narrative, "before\n\nafter");
    }

    #[test]
    fn test_narrative_only_round_trip() {
        let body = "A quiet morning in the valley.\nNothing stirred.";
        let parsed = parse_section_body(body, 1, "Valley");
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.narrative, body);
    }

    #[test]
    fn test_unrelated_braces_are_not_a_plan() {
        let body = "He whispered {almost nothing} and left.";
        let parsed = parse_section_body(body, 1, "");
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.narrative, body);
    }

    #[test]
    fn test_single_key_rejected_by_default_threshold() {
        let body = "prose\n{\"beats\": [\"only one key\"]}\nmore prose";
        let parsed = parse_section_body(body, 1, "");
        assert!(parsed.plan.is_none());
    }

    #[test]
    fn test_threshold_is_configurable() {
        let extractor = PlanExtractor {
            min_key_hits: 1,
            min_text_key_hits: 3,
        };
        let body = "prose\n{\"beats\": [\"only one key\"]}\nmore prose";
        let parsed = extractor.parse(body, 1, "");
        assert_eq!(parsed.plan.expect("accepted at 1").beats, vec!["only one key"]);
    }

    #[test]
    fn test_empty_lists_do_not_count_as_content() {
        let body = r#"{"beats": [], "conflicts": [], "foreshadowing": []}"#;
        let parsed = parse_section_body(body, 1, "");
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.narrative, body);
    }

    #[test]
    fn test_whitespace_collapse_and_blank_drop() {
        let body = r#"{"beats": ["  a   beat  ", "", "a   beat"], "conflicts": ["x"]}"#;
        let plan = parse_section_body(body, 1, "").plan.unwrap();
        // Collapsed duplicates merge, blanks vanish.
        assert_eq!(plan.beats, vec!["a beat"]);
    }

    #[test]
    fn test_object_entries_use_recognized_text_keys() {
        let body = r#"{"beats": [{"description": "the gate opens"}], "conflicts": [{"text": "guards wake"}]}"#;
        let plan = parse_section_body(body, 1, "").plan.unwrap();
        assert_eq!(plan.beats, vec!["the gate opens"]);
        assert_eq!(plan.conflicts, vec!["guards wake"]);
    }

    #[test]
    fn test_role_goals_order_and_junk_keys() {
        let body = r#"{"beats": ["b"], "role_goals": {"Zara": "escape", "id": "x", "Aaron": "follow her", "Empty": ""}}"#;
        let plan = parse_section_body(body, 1, "").plan.unwrap();
        assert_eq!(
            plan.role_goals,
            vec![
                ("Zara".to_string(), "escape".to_string()),
                ("Aaron".to_string(), "follow her".to_string()),
            ]
        );
    }

    #[test]
    fn test_duplicate_heading_stripped() {
        let body = "# Chapter 3: The Locked Gate\nThe gate had rusted shut years ago.";
        let parsed = parse_section_body(body, 3, "The Locked Gate");
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.narrative, "The gate had rusted shut years ago.");
    }

    #[test]
    fn test_unrelated_heading_kept() {
        let body = "# A Different Heading\nProse follows.";
        let parsed = parse_section_body(body, 3, "The Locked Gate");
        assert_eq!(parsed.narrative, body);
    }

    #[test]
    fn test_chinese_heading_stripped() {
        let body = "第5章\n夜色渐深。";
        let parsed = parse_section_body(body, 5, "");
        assert_eq!(parsed.narrative, "夜色渐深。");
    }

    #[test]
    fn test_first_valid_candidate_wins() {
        // The fenced block holds the plan; the later brace span in prose
        // must not shadow it.
        let body = "```json\n{\"beats\": [\"b\"], \"conflicts\": [\"c\"]}\n```\nShe said {nothing}.";
        let parsed = parse_section_body(body, 1, "");
        assert_eq!(parsed.plan.unwrap().beats, vec!["b"]);
        assert_eq!(parsed.narrative, "She said {nothing}.");
    }

    #[test]
    fn test_single_quoted_dict_recovered() {
        // Some generator backends emit the plan as a Python-style repr.
        let body = "prose before\n{'beats': ['the gate opens'], 'conflicts': ['guards wake']}\nprose after";
        let parsed = parse_section_body(body, 1, "");
        let plan = parsed.plan.expect("quote-swapped candidate accepted");
        assert_eq!(plan.beats, vec!["the gate opens"]);
        assert_eq!(plan.conflicts, vec!["guards wake"]);
        assert_eq!(parsed.narrative, "prose before\n\nprose after");
    }

    #[test]
    fn test_mixed_quote_prose_not_reparsed() {
        // An apostrophe plus real double quotes means the swap never runs.
        let body = "He said {it isn't \"beats\", \"conflicts\" or anything else} and left.";
        let parsed = parse_section_body(body, 1, "");
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.narrative, body);
    }

    #[test]
    fn test_invalid_json_candidates_skipped_silently() {
        let body = "{not json at all";
        let parsed = parse_section_body(body, 1, "");
        assert!(parsed.plan.is_none());
        assert_eq!(parsed.narrative, body);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let body = "intro\n{\"beats\":[\"a\"],\"conflicts\":[\"x\"]}\noutro";
        let first = parse_section_body(body, 1, "T");
        let second = parse_section_body(body, 1, "T");
        assert_eq!(first, second);
    }
}
