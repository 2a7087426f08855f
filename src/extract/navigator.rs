//! Pure queries over raw API responses.
//!
//! None of these functions fail: missing or malformed structure yields an
//! empty result.

use serde_json::Value;
use tracing::debug;

use super::shapes::{parse_lenient, ContinuationItemRenderer};
use crate::constants::{COMMENT_SECTION_ID, MAX_SEARCH_DEPTH, MAX_SEARCH_NODES};

fn tabs(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .pointer("/contents/twoColumnBrowseResultsRenderer/tabs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|tab| tab.get("tabRenderer"))
}

fn sections(tab: &Value) -> impl Iterator<Item = &Value> {
    tab.pointer("/content/sectionListRenderer/contents")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|section| section.get("itemSectionRenderer"))
}

fn section_items(section: &Value) -> Vec<&Value> {
    section
        .get("contents")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

/// The `tabRenderer` whose lowercased title is one of `titles`.
#[must_use]
pub fn find_tab<'a>(response: &'a Value, titles: &[&str]) -> Option<&'a Value> {
    let found = tabs(response).find(|tab| {
        tab.get("title")
            .and_then(Value::as_str)
            .is_some_and(|title| titles.contains(&title.to_lowercase().as_str()))
    });
    if found.is_none() {
        debug!("No matching tab in response");
    }
    found
}

/// Items of a tab's first section.
#[must_use]
pub fn tab_items(tab: &Value) -> Vec<&Value> {
    tab.pointer("/content/sectionListRenderer/contents/0/itemSectionRenderer")
        .map(section_items)
        .unwrap_or_default()
}

/// Items of a continuation response, concatenated across every endpoint
/// entry and both the append and reload action variants.
#[must_use]
pub fn continuation_items(response: &Value) -> Vec<&Value> {
    let Some(endpoints) = response
        .get("onResponseReceivedEndpoints")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    endpoints
        .iter()
        .flat_map(|endpoint| {
            ["appendContinuationItemsAction", "reloadContinuationItemsCommand"]
                .into_iter()
                .filter_map(move |action| endpoint.get(action))
        })
        .filter_map(|action| action.get("continuationItems").and_then(Value::as_array))
        .flatten()
        .collect()
}

/// Items from either a tab node or a continuation response.
#[must_use]
pub fn extract_items(node: &Value) -> Vec<&Value> {
    if node.get("content").is_some() {
        tab_items(node)
    } else {
        continuation_items(node)
    }
}

/// Token of the first continuation marker among `items`.
#[must_use]
pub fn find_continuation_token(items: &[&Value]) -> Option<String> {
    items.iter().find_map(|item| {
        item.get("continuationItemRenderer")
            .and_then(parse_lenient::<ContinuationItemRenderer>)
            .and_then(|marker| marker.token().map(str::to_string))
    })
}

/// Next reply page token: a continuation marker among the items, else
/// `continuationContents.commentRepliesContinuation.continuations`.
#[must_use]
pub fn reply_continuation_token(response: &Value) -> Option<String> {
    find_continuation_token(&continuation_items(response)).or_else(|| {
        response
            .pointer("/continuationContents/commentRepliesContinuation/continuations")
            .and_then(Value::as_array)?
            .iter()
            .filter_map(|c| c.pointer("/nextContinuationData/continuation"))
            .filter_map(Value::as_str)
            .find(|t| !t.is_empty())
            .map(str::to_string)
    })
}

/// Seed token of the comment section in a post-detail response.
#[must_use]
pub fn comment_section_token(detail: &Value) -> Option<String> {
    let is_comment_section = |section: &&Value| {
        section.get("sectionIdentifier").and_then(Value::as_str) == Some(COMMENT_SECTION_ID)
    };

    let section = tabs(detail)
        .flat_map(sections)
        .find(is_comment_section)
        .or_else(|| {
            debug!("Comment section not at the expected path, searching");
            bounded_find(detail, MAX_SEARCH_DEPTH, MAX_SEARCH_NODES, |node| {
                node.get("itemSectionRenderer")
                    .filter(is_comment_section)
            })
        })?;

    find_continuation_token(&section_items(section))
}

/// The `backstagePostRenderer` of a post-detail response.
#[must_use]
pub fn find_post_renderer(detail: &Value) -> Option<&Value> {
    let direct = tabs(detail)
        .flat_map(sections)
        .flat_map(section_items)
        .find_map(|item| {
            item.pointer("/backstagePostThreadRenderer/post/backstagePostRenderer")
                .or_else(|| item.get("backstagePostRenderer"))
        });

    direct.or_else(|| {
        debug!("Post renderer not at the expected path, searching");
        bounded_find(detail, MAX_SEARCH_DEPTH, MAX_SEARCH_NODES, |node| {
            node.get("backstagePostRenderer")
        })
    })
}

/// Entity mutations accompanying a batch.
#[must_use]
pub fn entity_mutations(response: &Value) -> &[Value] {
    response
        .pointer("/frameworkUpdates/entityBatchUpdate/mutations")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Depth-first search for the first node where `pick` returns a match.
///
/// Stops after `max_depth` levels or `max_nodes` visited nodes, whichever
/// comes first.
pub fn bounded_find<'a, F>(root: &'a Value, max_depth: usize, max_nodes: usize, pick: F) -> Option<&'a Value>
where
    F: Fn(&'a Value) -> Option<&'a Value>,
{
    let mut stack = vec![(root, 0usize)];
    let mut visited = 0usize;

    while let Some((node, depth)) = stack.pop() {
        visited += 1;
        if visited > max_nodes {
            debug!(max_nodes, "Search node budget exhausted");
            return None;
        }
        if let Some(found) = pick(node) {
            return Some(found);
        }
        if depth >= max_depth {
            continue;
        }
        match node {
            Value::Object(map) => stack.extend(map.values().rev().map(|v| (v, depth + 1))),
            Value::Array(items) => stack.extend(items.iter().rev().map(|v| (v, depth + 1))),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(title: &str) -> Value {
        json!({
            "contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
                {"tabRenderer": {"title": "Home"}},
                {"expandableTabRenderer": {}},
                {"tabRenderer": {"title": title, "content": {"sectionListRenderer": {"contents": [
                    {"itemSectionRenderer": {"contents": [
                        {"backstagePostThreadRenderer": {}},
                        {"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": "NEXT"}}}}
                    ]}}
                ]}}}}
            ]}}
        })
    }

    #[test]
    fn test_find_tab_matches_titles() {
        let response = feed("Posts");
        let tab = find_tab(&response, &["posts", "community"]).unwrap();
        assert_eq!(tab["title"], "Posts");
        assert_eq!(tab_items(tab).len(), 2);
        assert_eq!(extract_items(tab).len(), 2);

        let response = feed("Community");
        assert!(find_tab(&response, &["posts", "community"]).is_some());

        let response = feed("Videos");
        assert!(find_tab(&response, &["posts", "community"]).is_none());
        assert!(find_tab(&json!({}), &["posts"]).is_none());
        assert!(find_tab(&json!({"contents": "garbage"}), &["posts"]).is_none());
    }

    #[test]
    fn test_continuation_items_spans_endpoints_and_actions() {
        let response = json!({"onResponseReceivedEndpoints": [
            {"appendContinuationItemsAction": {"continuationItems": [{"a": 1}, {"b": 2}]}},
            {"reloadContinuationItemsCommand": {"continuationItems": [
                {"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": "T"}}}}
            ]}},
            {"somethingElse": {}}
        ]});
        let items = continuation_items(&response);
        assert_eq!(items.len(), 3);
        assert_eq!(extract_items(&response).len(), 3);
        assert_eq!(find_continuation_token(&items).as_deref(), Some("T"));
    }

    #[test]
    fn test_find_continuation_token_absent() {
        let items: Vec<&Value> = vec![];
        assert_eq!(find_continuation_token(&items), None);
        let a = json!({"commentThreadRenderer": {}});
        let b = json!({"continuationItemRenderer": {"trigger": "CONTINUATION_TRIGGER_ON_ITEM_SHOWN"}});
        assert_eq!(find_continuation_token(&[&a, &b]), None);
        assert!(continuation_items(&json!({"onResponseReceivedEndpoints": 5})).is_empty());
    }

    #[test]
    fn test_reply_continuation_token_sources() {
        let from_items = json!({"onResponseReceivedEndpoints": [{"appendContinuationItemsAction": {"continuationItems": [
            {"continuationItemRenderer": {"button": {"buttonRenderer": {"command": {"continuationCommand": {"token": "BTN"}}}}}}
        ]}}]});
        assert_eq!(reply_continuation_token(&from_items).as_deref(), Some("BTN"));

        let from_contents = json!({"continuationContents": {"commentRepliesContinuation": {"continuations": [
            {"nextContinuationData": {"continuation": "NCD"}}
        ]}}});
        assert_eq!(reply_continuation_token(&from_contents).as_deref(), Some("NCD"));
        assert_eq!(reply_continuation_token(&json!({})), None);
    }

    fn detail() -> Value {
        json!({"contents": {"twoColumnBrowseResultsRenderer": {"tabs": [{"tabRenderer": {"content": {"sectionListRenderer": {"contents": [
            {"itemSectionRenderer": {"contents": [
                {"backstagePostThreadRenderer": {"post": {"backstagePostRenderer": {"postId": "P1"}}}}
            ]}},
            {"itemSectionRenderer": {"sectionIdentifier": "comment-item-section", "contents": [
                {"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": "COMMENTS"}}}}
            ]}}
        ]}}}}]}}})
    }

    #[test]
    fn test_comment_section_token() {
        assert_eq!(comment_section_token(&detail()).as_deref(), Some("COMMENTS"));
        assert_eq!(comment_section_token(&json!({})), None);
    }

    #[test]
    fn test_comment_section_token_fallback_search() {
        let odd = json!({"wrapper": {"deeper": [{"itemSectionRenderer": {
            "sectionIdentifier": "comment-item-section",
            "contents": [{"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": "DEEP"}}}}]
        }}]}});
        assert_eq!(comment_section_token(&odd).as_deref(), Some("DEEP"));
    }

    #[test]
    fn test_find_post_renderer() {
        let d = detail();
        assert_eq!(find_post_renderer(&d).unwrap()["postId"], "P1");

        let odd = json!({"x": [{"y": {"backstagePostRenderer": {"postId": "P2"}}}]});
        assert_eq!(find_post_renderer(&odd).unwrap()["postId"], "P2");
        assert!(find_post_renderer(&json!({"x": 1})).is_none());
    }

    #[test]
    fn test_bounded_find_respects_depth() {
        let mut nested = json!({"target": true});
        for _ in 0..10 {
            nested = json!({"n": nested});
        }
        fn pick(v: &Value) -> Option<&Value> {
            v.get("target")
        }
        assert!(bounded_find(&nested, 20, 1000, pick).is_some());
        assert!(bounded_find(&nested, 5, 1000, pick).is_none());
        assert!(bounded_find(&nested, 20, 3, pick).is_none());
    }

    #[test]
    fn test_entity_mutations() {
        let response = json!({"frameworkUpdates": {"entityBatchUpdate": {"mutations": [{"entityKey": "a"}]}}});
        assert_eq!(entity_mutations(&response).len(), 1);
        assert!(entity_mutations(&json!({})).is_empty());
    }
}
