//! Request matching.
//!
//! Two passes decide whether a live request is the recorded one. First every
//! rule the provider declared for the request side runs, in declaration
//! order. Then every remaining field is compared exactly, in a fixed order:
//! method, target, headers (sorted by name), metadata (sorted by key), body.
//! The first failing field becomes the diff.
//!
//! Headers are grouped by lowercase name, so the relative order of different
//! headers does not matter, while repeated values of one header compare in
//! the order they were sent.
//!
//! Bodies are bytes. A JSON pointer rule masks the values it selects in the
//! recorded text and everything else is compared byte for byte, so member
//! order, whitespace and number spelling all count.

use crate::model::{RequestRecord, ResponseRecord, short_sha256};
use crate::scrub::{FieldPath, ScrubPolicy, ScrubRuleSet, Side};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;
use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use url::form_urlencoded;

const DIFF_VALUE_LIMIT: usize = 160;
const ABSENT: &str = "<absent>";

/// The first field that failed to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDiff {
    pub path: FieldPath,
    /// Label of the policy the field was compared under.
    pub policy: String,
    /// Raw stored value, rendered for humans; `None` when absent.
    pub stored: Option<String>,
    pub live: Option<String>,
}

impl fmt::Display for MatchDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} differs ({}): stored={} live={}",
            self.path,
            self.policy,
            self.stored.as_deref().unwrap_or(ABSENT),
            self.live.as_deref().unwrap_or(ABSENT),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub diff: Option<MatchDiff>,
}

impl MatchResult {
    fn from_diff(diff: Option<MatchDiff>) -> Self {
        Self {
            matched: diff.is_none(),
            diff,
        }
    }
}

/// Decides whether `live` is equivalent to `stored` under the request-side
/// rules of `rules`. Neither record is modified.
pub fn match_request(
    live: &RequestRecord,
    stored: &RequestRecord,
    rules: &ScrubRuleSet,
) -> MatchResult {
    let stored = Fields::of_request(stored);
    let live = Fields::of_request(live);
    MatchResult::from_diff(compare(Side::Request, rules, &stored, &live))
}

/// Compares a fresh response against a recorded one under the response-side
/// rules. Replay never calls this; it is for checking drift between
/// recordings.
pub fn compare_responses(
    live: &ResponseRecord,
    stored: &ResponseRecord,
    rules: &ScrubRuleSet,
) -> MatchResult {
    let stored = Fields::of_response(stored);
    let live = Fields::of_response(live);
    MatchResult::from_diff(compare(Side::Response, rules, &stored, &live))
}

struct Fields<'a> {
    method: Option<&'a str>,
    target: Option<&'a str>,
    status: Option<u16>,
    headers: &'a [(String, String)],
    metadata: Option<&'a BTreeMap<String, String>>,
    body: &'a [u8],
}

impl<'a> Fields<'a> {
    fn of_request(request: &'a RequestRecord) -> Self {
        Self {
            method: Some(&request.method),
            target: Some(&request.target),
            status: None,
            headers: &request.headers,
            metadata: Some(&request.metadata),
            body: &request.body,
        }
    }

    fn of_response(response: &'a ResponseRecord) -> Self {
        Self {
            method: None,
            target: None,
            status: Some(response.status),
            headers: &response.headers,
            metadata: None,
            body: &response.body,
        }
    }

    fn values(&self, path: &FieldPath) -> Option<Vec<String>> {
        let values = match path {
            FieldPath::Method => vec![self.method?.to_string()],
            FieldPath::Target => vec![self.target?.to_string()],
            FieldPath::Query(name) => query_pairs(self.target?)
                .filter(|(key, _)| key == name)
                .map(|(_, value)| value)
                .collect(),
            FieldPath::Header(name) => self
                .headers
                .iter()
                .filter(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
                .collect(),
            FieldPath::Metadata(key) => vec![self.metadata?.get(key)?.clone()],
            FieldPath::Body => vec![std::str::from_utf8(self.body).ok()?.to_string()],
            FieldPath::BodyJson(pointer) => {
                let text = std::str::from_utf8(self.body).ok()?;
                pointer_spans(text, pointer)
                    .into_iter()
                    .map(|span| text[span].to_string())
                    .collect()
            }
            FieldPath::Status => vec![self.status?.to_string()],
        };
        (!values.is_empty()).then_some(values)
    }

    fn header_names(&self) -> impl Iterator<Item = String> + '_ {
        self.headers.iter().map(|(name, _)| name.to_ascii_lowercase())
    }
}

fn compare(
    side: Side,
    rules: &ScrubRuleSet,
    stored: &Fields<'_>,
    live: &Fields<'_>,
) -> Option<MatchDiff> {
    for rule in rules.rules_for(side) {
        let diff = if rule.path == FieldPath::Body {
            compare_body_under(&rule.policy, stored.body, live.body)
        } else {
            compare_under(
                &rule.path,
                &rule.policy,
                stored.values(&rule.path),
                live.values(&rule.path),
            )
        };
        if diff.is_some() {
            return diff;
        }
    }
    compare_uncovered(side, rules, stored, live)
}

fn compare_under(
    path: &FieldPath,
    policy: &ScrubPolicy,
    stored: Option<Vec<String>>,
    live: Option<Vec<String>>,
) -> Option<MatchDiff> {
    if matches!(policy, ScrubPolicy::Ignore) {
        return None;
    }
    let normalize = |values: &Option<Vec<String>>| -> Option<Vec<String>> {
        values.as_ref().map(|values| {
            values
                .iter()
                .filter_map(|value| policy.apply(value).map(Cow::into_owned))
                .collect()
        })
    };
    if normalize(&stored) == normalize(&live) {
        return None;
    }
    Some(MatchDiff {
        path: path.clone(),
        policy: policy.label().to_string(),
        stored: stored.map(|values| render(&values.join(", "))),
        live: live.map(|values| render(&values.join(", "))),
    })
}

/// Whole-body rules see bytes. Normalizers only run when both bodies are
/// UTF-8; otherwise the raw bytes must be equal.
fn compare_body_under(policy: &ScrubPolicy, stored: &[u8], live: &[u8]) -> Option<MatchDiff> {
    let equal = match policy {
        ScrubPolicy::Ignore => true,
        ScrubPolicy::RequireEqual => stored == live,
        ScrubPolicy::Normalize { .. } => {
            match (std::str::from_utf8(stored), std::str::from_utf8(live)) {
                (Ok(s), Ok(l)) => policy.apply(s) == policy.apply(l),
                _ => stored == live,
            }
        }
    };
    (!equal).then(|| MatchDiff {
        path: FieldPath::Body,
        policy: policy.label().to_string(),
        stored: Some(render_bytes(stored)),
        live: Some(render_bytes(live)),
    })
}

fn exact_diff(path: FieldPath, stored: Option<String>, live: Option<String>) -> MatchDiff {
    rendered_diff(
        path,
        stored.map(|value| render(&value)),
        live.map(|value| render(&value)),
    )
}

fn rendered_diff(path: FieldPath, stored: Option<String>, live: Option<String>) -> MatchDiff {
    MatchDiff {
        path,
        policy: ScrubPolicy::RequireEqual.label().to_string(),
        stored,
        live,
    }
}

fn compare_uncovered(
    side: Side,
    rules: &ScrubRuleSet,
    stored: &Fields<'_>,
    live: &Fields<'_>,
) -> Option<MatchDiff> {
    let exact = ScrubPolicy::RequireEqual;

    if !rules.covers(side, &FieldPath::Method) {
        if let (Some(s), Some(l)) = (stored.method, live.method) {
            if !s.eq_ignore_ascii_case(l) {
                return Some(exact_diff(
                    FieldPath::Method,
                    Some(s.to_string()),
                    Some(l.to_string()),
                ));
            }
        }
    }

    if !rules.covers(side, &FieldPath::Target) {
        if let (Some(s), Some(l)) = (stored.target, live.target) {
            let (s, l) = if rules.has_query_rules(side) {
                (
                    strip_ruled_query(s, rules, side),
                    strip_ruled_query(l, rules, side),
                )
            } else {
                (Cow::Borrowed(s), Cow::Borrowed(l))
            };
            if s != l {
                return Some(exact_diff(
                    FieldPath::Target,
                    Some(s.into_owned()),
                    Some(l.into_owned()),
                ));
            }
        }
    }

    if !rules.covers(side, &FieldPath::Status) && stored.status != live.status {
        return Some(exact_diff(
            FieldPath::Status,
            stored.status.map(|s| s.to_string()),
            live.status.map(|s| s.to_string()),
        ));
    }

    let names: BTreeSet<String> = stored.header_names().chain(live.header_names()).collect();
    for name in names {
        let path = FieldPath::Header(name);
        if rules.covers(side, &path) {
            continue;
        }
        let diff = compare_under(&path, &exact, stored.values(&path), live.values(&path));
        if diff.is_some() {
            return diff;
        }
    }

    let keys: BTreeSet<&String> = stored
        .metadata
        .into_iter()
        .chain(live.metadata)
        .flat_map(BTreeMap::keys)
        .collect();
    for key in keys {
        let path = FieldPath::Metadata(key.clone());
        if rules.covers(side, &path) {
            continue;
        }
        let diff = compare_under(&path, &exact, stored.values(&path), live.values(&path));
        if diff.is_some() {
            return diff;
        }
    }

    if rules.covers(side, &FieldPath::Body) {
        return None;
    }
    let (s, l) = if rules.has_body_json_rules(side) {
        (
            mask_ruled_pointers(stored.body, rules, side),
            mask_ruled_pointers(live.body, rules, side),
        )
    } else {
        (Cow::Borrowed(stored.body), Cow::Borrowed(live.body))
    };
    if s != l {
        return Some(rendered_diff(
            FieldPath::Body,
            Some(render_bytes(&s)),
            Some(render_bytes(&l)),
        ));
    }
    None
}

/// Splits a target into the part before the query, the query, and the
/// fragment (including its `#`).
fn split_target(target: &str) -> (&str, Option<&str>, &str) {
    let (rest, fragment) = target
        .find('#')
        .map_or((target, ""), |pos| target.split_at(pos));
    match rest.split_once('?') {
        Some((base, query)) => (base, Some(query), fragment),
        None => (rest, None, fragment),
    }
}

fn query_pairs(target: &str) -> impl Iterator<Item = (String, String)> + '_ {
    let (_, query, _) = split_target(target);
    form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
}

fn strip_ruled_query<'a>(target: &'a str, rules: &ScrubRuleSet, side: Side) -> Cow<'a, str> {
    let (base, Some(query), fragment) = split_target(target) else {
        return Cow::Borrowed(target);
    };
    // Unruled pairs keep their exact encoding; only the key is decoded.
    let kept = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = form_urlencoded::parse(pair.as_bytes()).next().map(|(key, _)| key);
            !key.is_some_and(|key| rules.covers(side, &FieldPath::Query(key.into_owned())))
        })
        .collect::<Vec<_>>()
        .join("&");
    if kept.is_empty() {
        Cow::Owned(format!("{base}{fragment}"))
    } else {
        Cow::Owned(format!("{base}?{kept}{fragment}"))
    }
}

/// Replaces every value a request-side JSON pointer rule selects with `null`.
/// Bodies that are not JSON come back unchanged.
fn mask_ruled_pointers<'a>(body: &'a [u8], rules: &ScrubRuleSet, side: Side) -> Cow<'a, [u8]> {
    let Ok(text) = std::str::from_utf8(body) else {
        return Cow::Borrowed(body);
    };
    let mut spans: Vec<Range<usize>> = rules
        .rules_for(side)
        .filter_map(|rule| match &rule.path {
            FieldPath::BodyJson(pointer) => Some(pointer),
            _ => None,
        })
        .flat_map(|pointer| pointer_spans(text, pointer))
        .collect();
    if spans.is_empty() {
        return Cow::Borrowed(body);
    }
    spans.sort_by_key(|span| (span.start, Reverse(span.end)));

    let mut masked = String::with_capacity(text.len());
    let mut end = 0;
    for span in spans {
        // Nested inside a span that is already masked.
        if span.start < end {
            continue;
        }
        masked.push_str(&text[end..span.start]);
        masked.push_str("null");
        end = span.end;
    }
    masked.push_str(&text[end..]);
    Cow::Owned(masked.into_bytes())
}

/// Byte ranges of the values `pointer` selects in `text`, which must be one
/// JSON document. A key repeated within an object selects every occurrence.
fn pointer_spans(text: &str, pointer: &str) -> Vec<Range<usize>> {
    let Ok(root) = serde_json::from_str::<&RawValue>(text) else {
        return Vec::new();
    };
    let mut selected = vec![root];
    if !pointer.is_empty() {
        let Some(tokens) = pointer.strip_prefix('/') else {
            return Vec::new();
        };
        for token in tokens.split('/') {
            let token = token.replace("~1", "/").replace("~0", "~");
            selected = selected
                .into_iter()
                .flat_map(|value| children(value, &token))
                .collect();
        }
    }
    selected
        .into_iter()
        .filter_map(|value| span_in(text, value))
        .collect()
}

fn children<'a>(value: &'a RawValue, token: &str) -> Vec<&'a RawValue> {
    let raw = value.get();
    if raw.starts_with('{') {
        serde_json::from_str::<Members<'a>>(raw)
            .map(|members| {
                members
                    .0
                    .into_iter()
                    .filter(|(key, _)| key == token)
                    .map(|(_, value)| value)
                    .collect()
            })
            .unwrap_or_default()
    } else if raw.starts_with('[') {
        array_index(token)
            .and_then(|index| {
                serde_json::from_str::<Vec<&'a RawValue>>(raw)
                    .ok()?
                    .get(index)
                    .copied()
            })
            .into_iter()
            .collect()
    } else {
        Vec::new()
    }
}

/// `0` or digits without a leading zero.
fn array_index(token: &str) -> Option<usize> {
    let digits = !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit());
    if !digits || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    token.parse().ok()
}

fn span_in(text: &str, value: &RawValue) -> Option<Range<usize>> {
    let raw = value.get();
    let start = (raw.as_ptr() as usize).checked_sub(text.as_ptr() as usize)?;
    let span = start..start + raw.len();
    (text.get(span.clone()) == Some(raw)).then_some(span)
}

/// Object members in document order, duplicates included.
struct Members<'a>(Vec<(String, &'a RawValue)>);

impl<'de> Deserialize<'de> for Members<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = Members<'de>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut members = Vec::new();
                while let Some(entry) = map.next_entry::<String, &'de RawValue>()? {
                    members.push(entry);
                }
                Ok(Members(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}

fn render(value: &str) -> String {
    if value.len() <= DIFF_VALUE_LIMIT {
        return format!("{value:?}");
    }
    let mut cut = DIFF_VALUE_LIMIT;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{:?}... ({} bytes, sha256={})",
        &value[..cut],
        value.len(),
        short_sha256(value.as_bytes())
    )
}

fn render_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => render(text),
        Err(_) => format!(
            "<binary {} bytes, sha256={}>",
            bytes.len(),
            short_sha256(bytes)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_items() -> RequestRecord {
        RequestRecord::new("GET", "https://api.example.com/items?page=1")
            .header("Accept", "application/json")
            .header("Date", "Mon, 01 Jan 2018")
    }

    #[test]
    fn identical_requests_match() {
        let result = match_request(&get_items(), &get_items(), &ScrubRuleSet::new("fake"));
        assert!(result.matched);
        assert!(result.diff.is_none());
    }

    #[test]
    fn ignored_date_header_tolerates_new_value() {
        let rules = ScrubRuleSet::new("fake").ignore(FieldPath::header("Date"));
        let stored = get_items();
        let mut live = get_items();
        live.headers[1].1 = "Tue, 02 Jan 2019".to_string();
        assert!(match_request(&live, &stored, &rules).matched);
    }

    #[test]
    fn unruled_header_difference_is_named_in_diff() {
        let stored = get_items();
        let mut live = get_items();
        live.headers[1].1 = "Tue, 02 Jan 2019".to_string();
        let result = match_request(&live, &stored, &ScrubRuleSet::new("fake"));
        assert!(!result.matched);
        let diff = result.diff.expect("diff");
        assert_eq!(diff.path, FieldPath::header("date"));
        assert_eq!(diff.policy, "require_equal");
        assert_eq!(diff.stored.as_deref(), Some("\"Mon, 01 Jan 2018\""));
        assert_eq!(diff.live.as_deref(), Some("\"Tue, 02 Jan 2019\""));
    }

    #[test]
    fn single_body_byte_difference_fails() {
        let stored = RequestRecord::new("PUT", "/blob").body(vec![1u8, 2, 3, 0xff]);
        let live = RequestRecord::new("PUT", "/blob").body(vec![1u8, 2, 4, 0xff]);
        let diff = match_request(&live, &stored, &ScrubRuleSet::new("fake"))
            .diff
            .expect("diff");
        assert_eq!(diff.path, FieldPath::Body);
        assert!(diff.stored.as_deref().unwrap_or_default().starts_with("<binary 4 bytes"));
    }

    #[test]
    fn header_order_across_names_is_irrelevant() {
        let stored = RequestRecord::new("GET", "/items")
            .header("A", "1")
            .header("B", "2");
        let live = RequestRecord::new("GET", "/items")
            .header("b", "2")
            .header("a", "1");
        assert!(match_request(&live, &stored, &ScrubRuleSet::new("fake")).matched);
    }

    #[test]
    fn repeated_header_values_compare_in_order() {
        let stored = RequestRecord::new("GET", "/items")
            .header("Accept-Encoding", "gzip")
            .header("Accept-Encoding", "br");
        let live = RequestRecord::new("GET", "/items")
            .header("Accept-Encoding", "br")
            .header("Accept-Encoding", "gzip");
        let diff = match_request(&live, &stored, &ScrubRuleSet::new("fake"))
            .diff
            .expect("diff");
        assert_eq!(diff.path, FieldPath::header("accept-encoding"));
    }

    #[test]
    fn missing_header_is_a_difference() {
        let stored = get_items();
        let live = RequestRecord::new("GET", "https://api.example.com/items?page=1")
            .header("Accept", "application/json");
        let diff = match_request(&live, &stored, &ScrubRuleSet::new("fake"))
            .diff
            .expect("diff");
        assert_eq!(diff.path, FieldPath::header("date"));
        assert!(diff.live.is_none());
        assert!(diff.to_string().contains("live=<absent>"));
    }

    #[test]
    fn method_compares_case_insensitively() {
        let live = RequestRecord::new("get", "/items");
        let stored = RequestRecord::new("GET", "/items");
        assert!(match_request(&live, &stored, &ScrubRuleSet::new("fake")).matched);
    }

    #[test]
    fn rule_failures_are_reported_before_default_failures() {
        let rules = ScrubRuleSet::new("fake").normalize(
            FieldPath::header("Authorization"),
            ScrubPolicy::replace_regex(r"Signature=\w+", "Signature=*").expect("pattern"),
        );
        let stored = RequestRecord::new("GET", "/a")
            .header("Authorization", "Credential=alice, Signature=abc");
        let live = RequestRecord::new("GET", "/b")
            .header("Authorization", "Credential=bob, Signature=def");
        let diff = match_request(&live, &stored, &rules).diff.expect("diff");
        assert_eq!(diff.path, FieldPath::header("authorization"));
        assert!(diff.policy.starts_with("replace("), "{}", diff.policy);
    }

    #[test]
    fn normalized_signature_matches() {
        let rules = ScrubRuleSet::new("fake").normalize(
            FieldPath::header("Authorization"),
            ScrubPolicy::replace_regex(r"Signature=\w+", "Signature=*").expect("pattern"),
        );
        let stored =
            RequestRecord::new("GET", "/a").header("Authorization", "Credential=a, Signature=abc");
        let live =
            RequestRecord::new("GET", "/a").header("Authorization", "Credential=a, Signature=def");
        assert!(match_request(&live, &stored, &rules).matched);
    }

    #[test]
    fn ignored_query_parameter_leaves_rest_of_target_strict() {
        let rules = ScrubRuleSet::new("fake").ignore(FieldPath::query("X-Amz-Date"));
        let stored = RequestRecord::new("GET", "https://s3.example.com/b/k?X-Amz-Date=20180101&versionId=1");
        let live = RequestRecord::new("GET", "https://s3.example.com/b/k?X-Amz-Date=20190102&versionId=1");
        assert!(match_request(&live, &stored, &rules).matched);

        let other_version =
            RequestRecord::new("GET", "https://s3.example.com/b/k?X-Amz-Date=20190102&versionId=2");
        let diff = match_request(&other_version, &stored, &rules)
            .diff
            .expect("diff");
        assert_eq!(diff.path, FieldPath::Target);
    }

    #[test]
    fn json_pointer_rule_ignores_one_member() {
        let rules = ScrubRuleSet::new("fake").ignore(FieldPath::body_json("/clientToken"));
        let stored = RequestRecord::new("POST", "/tables").body(r#"{"clientToken":"a1","name":"t"}"#);
        let live = RequestRecord::new("POST", "/tables").body(r#"{"clientToken":"b2","name":"t"}"#);
        assert!(match_request(&live, &stored, &rules).matched);

        let renamed = RequestRecord::new("POST", "/tables").body(r#"{"clientToken":"b2","name":"u"}"#);
        let diff = match_request(&renamed, &stored, &rules).diff.expect("diff");
        assert_eq!(diff.path, FieldPath::Body);
    }

    #[test]
    fn metadata_participates_in_matching() {
        let stored = RequestRecord::new("POST", "pubsub.googleapis.com:443")
            .metadata("rpc_method", "/google.pubsub.v1.Publisher/Publish");
        let live = RequestRecord::new("POST", "pubsub.googleapis.com:443")
            .metadata("rpc_method", "/google.pubsub.v1.Publisher/CreateTopic");
        let diff = match_request(&live, &stored, &ScrubRuleSet::new("fake"))
            .diff
            .expect("diff");
        assert_eq!(diff.path, FieldPath::metadata("rpc_method"));
    }

    #[test]
    fn matching_does_not_mutate_inputs() {
        let rules = ScrubRuleSet::new("fake")
            .ignore(FieldPath::header("Date"))
            .ignore(FieldPath::body_json("/id"));
        let stored = get_items().body(r#"{"id":1}"#);
        let live = get_items().body(r#"{"id":2}"#);
        let (stored_before, live_before) = (stored.clone(), live.clone());
        let _ = match_request(&live, &stored, &rules);
        assert_eq!(stored, stored_before);
        assert_eq!(live, live_before);
    }

    #[test]
    fn response_rules_check_drift() {
        let rules = ScrubRuleSet::new("fake")
            .response_rule(FieldPath::header("Date"), ScrubPolicy::Ignore)
            .response_rule(FieldPath::body_json("/etag"), ScrubPolicy::Ignore);
        let stored = ResponseRecord::new(200)
            .header("Date", "Mon, 01 Jan 2018")
            .body(r#"{"etag":"1","items":[]}"#);
        let live = ResponseRecord::new(200)
            .header("Date", "Tue, 02 Jan 2019")
            .body(r#"{"etag":"2","items":[]}"#);
        assert!(compare_responses(&live, &stored, &rules).matched);

        let failed = ResponseRecord::new(500).header("Date", "x").body(r#"{"items":[]}"#);
        let diff = compare_responses(&failed, &stored, &rules).diff.expect("diff");
        assert_eq!(diff.path, FieldPath::Status);
    }

    #[test]
    fn long_values_are_truncated_in_diff() {
        let rendered = render(&"x".repeat(1000));
        assert!(rendered.contains("(1000 bytes, sha256="), "{rendered}");
        assert!(rendered.len() < 300);
    }

    #[test]
    fn json_pointer_rule_keeps_rest_of_body_byte_exact() {
        let rules = ScrubRuleSet::new("fake").ignore(FieldPath::body_json("/clientToken"));
        let stored = RequestRecord::new("POST", "/tables")
            .body(r#"{"clientToken":"a1","name":"t","size":12345678901234567890123}"#);
        let cases = [
            r#"{"name":"t","clientToken":"b2","size":12345678901234567890123}"#,
            r#"{"clientToken":"b2", "name":"t","size":12345678901234567890123}"#,
            r#"{"clientToken":"b2","name":"t","size":12345678901234567890124}"#,
            r#"{"clientToken":"b2","name":"t","name":"t","size":12345678901234567890123}"#,
            r#"{"name":"t","size":12345678901234567890123}"#,
        ];
        for body in cases {
            let live = RequestRecord::new("POST", "/tables").body(body);
            let diff = match_request(&live, &stored, &rules).diff.expect(body);
            assert_eq!(diff.path, FieldPath::Body, "{body}");
        }
    }

    #[test]
    fn duplicate_members_are_not_collapsed() {
        let stored = RequestRecord::new("POST", "/x").body(r#"{"x":1,"x":2}"#);
        let live = RequestRecord::new("POST", "/x").body(r#"{"x":2}"#);
        let rules = ScrubRuleSet::new("fake").ignore(FieldPath::body_json("/y"));
        assert!(!match_request(&live, &stored, &rules).matched);

        let ignore_x = ScrubRuleSet::new("fake").ignore(FieldPath::body_json("/x"));
        let live = RequestRecord::new("POST", "/x").body(r#"{"x":3,"x":4}"#);
        assert!(match_request(&live, &stored, &ignore_x).matched);
    }

    #[test]
    fn pointer_spans_follow_escapes_and_array_indices() {
        fn spans_of<'a>(text: &'a str, pointer: &str) -> Vec<&'a str> {
            pointer_spans(text, pointer)
                .into_iter()
                .map(|span| &text[span])
                .collect()
        }
        let text = r#"{"a/b": 1, "list": [10, {"id": "q"}, 30], "t~": true}"#;
        let selected = |pointer| spans_of(text, pointer);
        assert_eq!(selected("/a~1b"), vec!["1"]);
        assert_eq!(selected("/list/1/id"), vec![r#""q""#]);
        assert_eq!(selected("/list/2"), vec!["30"]);
        assert_eq!(selected("/t~0"), vec!["true"]);
        assert!(selected("/list/01").is_empty());
        assert!(selected("/list/3").is_empty());
        assert!(selected("/missing").is_empty());
        assert_eq!(selected(""), vec![text]);
    }

    #[test]
    fn nested_pointer_rules_mask_once() {
        let rules = ScrubRuleSet::new("fake")
            .ignore(FieldPath::body_json("/meta"))
            .ignore(FieldPath::body_json("/meta/token"));
        let stored = RequestRecord::new("POST", "/x").body(r#"{"meta":{"token":"a"},"n":1}"#);
        let live = RequestRecord::new("POST", "/x").body(r#"{"meta":{"token":"b","extra":2},"n":1}"#);
        assert!(match_request(&live, &stored, &rules).matched);
    }

    #[test]
    fn body_rule_compares_bytes_not_lossy_text() {
        let rules = ScrubRuleSet::new("fake").rule(
            Side::Request,
            FieldPath::Body,
            ScrubPolicy::RequireEqual,
        );
        let stored = RequestRecord::new("PUT", "/blob").body(vec![0xffu8, 0x01]);
        let live = RequestRecord::new("PUT", "/blob").body(vec![0xfeu8, 0x01]);
        let diff = match_request(&live, &stored, &rules).diff.expect("diff");
        assert_eq!(diff.path, FieldPath::Body);
        assert!(diff.live.as_deref().unwrap_or_default().starts_with("<binary 2 bytes"));

        let trimmed = ScrubRuleSet::new("fake").normalize(
            FieldPath::Body,
            ScrubPolicy::normalize("trim", |raw| raw.trim().to_string()),
        );
        assert!(!match_request(&live, &stored, &trimmed).matched);
        let padded = RequestRecord::new("PUT", "/blob").body(" abc ");
        let plain = RequestRecord::new("PUT", "/blob").body("abc");
        assert!(match_request(&padded, &plain, &trimmed).matched);
    }

    #[test]
    fn ignored_query_parameter_keeps_other_encodings_strict() {
        let rules = ScrubRuleSet::new("fake").ignore(FieldPath::query("sig"));
        let stored = RequestRecord::new("GET", "/o?name=a%20b&sig=1");
        let live = RequestRecord::new("GET", "/o?name=a+b&sig=2");
        let diff = match_request(&live, &stored, &rules).diff.expect("diff");
        assert_eq!(diff.path, FieldPath::Target);
        assert_eq!(diff.stored.as_deref(), Some("\"/o?name=a%20b\""));
        assert_eq!(diff.live.as_deref(), Some("\"/o?name=a+b\""));

        let same = RequestRecord::new("GET", "/o?name=a%20b&sig=2");
        assert!(match_request(&same, &stored, &rules).matched);
    }

    #[test]
    fn header_rule_declared_with_capitals_still_applies() {
        let rules = ScrubRuleSet::new("fake").rule(
            Side::Request,
            FieldPath::Header("Date".into()),
            ScrubPolicy::Ignore,
        );
        let stored = get_items();
        let mut live = get_items();
        live.headers[1].1 = "Tue, 02 Jan 2019".to_string();
        assert!(match_request(&live, &stored, &rules).matched);
    }
}
