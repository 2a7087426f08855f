//! End-to-end extraction tests: real transport, scripted API server.

use std::sync::Arc;
use std::time::Duration;

use community_post_archiver::api::{HostThrottle, HttpTransport, InnertubeClient, TransportSettings};
use community_post_archiver::scraper::{CommunityScraper, ScrapeSettings};
use community_post_archiver::ArchiverError;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CH: &str = "UCabcdefghijklmnopqrstuv";

fn post_item(id: &str, comments: &str) -> Value {
    json!({"backstagePostThreadRenderer": {"post": {"backstagePostRenderer": {
        "postId": id,
        "contentText": {"runs": [{"text": "Hello "}, {"text": "world"}]},
        "publishedTimeText": {"runs": [{"text": "3 days ago"}]},
        "voteCount": {"simpleText": "1.2K"},
        "authorText": {"runs": [{"text": "Channel Name"}]},
        "actionButtons": {"commentActionButtonsRenderer": {"replyButton": {"buttonRenderer": {"text": {"simpleText": comments}}}}}
    }}}})
}

fn marker(token: &str) -> Value {
    json!({"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": token}}}})
}

fn feed(items: Vec<Value>) -> Value {
    json!({"contents": {"twoColumnBrowseResultsRenderer": {"tabs": [
        {"tabRenderer": {"title": "Home"}},
        {"tabRenderer": {"title": "Posts", "content": {"sectionListRenderer": {"contents": [
            {"itemSectionRenderer": {"contents": items}}
        ]}}}}
    ]}}})
}

fn batch(items: Vec<Value>) -> Value {
    json!({"onResponseReceivedEndpoints": [{"appendContinuationItemsAction": {"continuationItems": items}}]})
}

fn detail(post_id: &str, comment_token: &str) -> Value {
    json!({"contents": {"twoColumnBrowseResultsRenderer": {"tabs": [{"tabRenderer": {"content": {"sectionListRenderer": {"contents": [
        {"itemSectionRenderer": {"contents": [post_item(post_id, "3")]}},
        {"itemSectionRenderer": {"sectionIdentifier": "comment-item-section", "contents": [marker(comment_token)]}}
    ]}}}}]}}})
}

fn legacy_comment(id: &str, reply_token: Option<&str>) -> Value {
    let mut thread = json!({"comment": {"commentRenderer": {
        "commentId": id,
        "contentText": {"runs": [{"text": format!("comment {id}")}]},
        "authorText": {"simpleText": "@viewer"}
    }}});
    if let Some(token) = reply_token {
        thread["replies"] = json!({"commentRepliesRenderer": {"contents": [marker(token)]}});
    }
    json!({"commentThreadRenderer": thread})
}

fn entity(key: &str, id: &str, text: &str) -> Value {
    json!({"entityKey": key, "payload": {"commentEntityPayload": {
        "key": key,
        "properties": {"commentId": id, "content": {"content": text}, "publishedTime": "1 hour ago"},
        "author": {"channelId": "UCother", "displayName": "@other"},
        "toolbar": {"likeCountA11y": "4"}
    }}})
}

fn reply(id: &str) -> Value {
    json!({"commentRenderer": {"commentId": id, "contentText": {"simpleText": format!("reply {id}")}}})
}

struct Harness {
    server: MockServer,
}

impl Harness {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    async fn browse(&self, body: Value, response: Value) {
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/browse"))
            .and(body_partial_json(body))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.server)
            .await;
    }

    async fn next(&self, token: &str, response: Value) {
        Mock::given(method("POST"))
            .and(path("/youtubei/v1/next"))
            .and(body_partial_json(json!({"continuation": token})))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.server)
            .await;
    }

    async fn continuation(&self, token: &str, response: Value) {
        self.browse(json!({"continuation": token}), response).await;
    }

    fn scraper(&self, settings: ScrapeSettings) -> CommunityScraper {
        let transport = HttpTransport::new(
            TransportSettings {
                timeout: Duration::from_secs(5),
                max_retries: 1,
                retry_delay: Duration::from_millis(10),
            },
            None,
            Arc::new(HostThrottle::new(4)),
        )
        .expect("Failed to build transport");
        let client = InnertubeClient::new(Arc::new(transport), &format!("{}/youtubei/v1", self.server.uri()));
        CommunityScraper::new(client, settings, CancellationToken::new())
    }

    async fn bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

fn settings() -> ScrapeSettings {
    ScrapeSettings {
        post_batch_delay: Duration::ZERO,
        comment_batch_delay: Duration::ZERO,
        reply_batch_delay: Duration::ZERO,
        site_base_url: "https://www.youtube.com".to_string(),
        ..ScrapeSettings::default()
    }
}

#[tokio::test]
async fn test_paginates_posts_across_token_only_batch() {
    let h = Harness::start().await;
    h.browse(json!({"browseId": CH}), feed(vec![post_item("UgkxA", "0"), marker("T1")]))
        .await;
    h.continuation("T1", batch(vec![marker("T2")])).await;
    h.continuation("T2", batch(vec![post_item("UgkxB", "0"), post_item("UgkxA", "0")]))
        .await;

    let archive = h.scraper(settings()).scrape_channel(CH).await.unwrap();
    let ids: Vec<_> = archive.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["UgkxA", "UgkxB"]);
    assert_eq!(archive.metadata.channel_id, CH);
    assert_eq!(archive.metadata.posts_count, 2);
    assert_eq!(archive.posts[0].text, "Hello world");
    assert!(archive.posts[0].timestamp_is_relative);
}

#[tokio::test]
async fn test_first_page_rate_limit_fails_run() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.scraper(settings()).scrape_channel(CH).await.unwrap_err();
    assert!(matches!(err, ArchiverError::RateLimited { .. }));
}

#[tokio::test]
async fn test_later_rate_limit_keeps_partial_results() {
    let h = Harness::start().await;
    h.browse(json!({"browseId": CH}), feed(vec![post_item("UgkxA", "0"), marker("T1")]))
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"continuation": "T1"})))
        .respond_with(ResponseTemplate::new(429))
        .mount(&h.server)
        .await;

    let scraper = h.scraper(settings());
    let archive = scraper.scrape_channel(CH).await.unwrap();
    assert_eq!(archive.posts.len(), 1);
    assert_eq!(archive.metadata.warnings, 1);
}

#[tokio::test]
async fn test_cursor_cycle_is_not_refetched() {
    let h = Harness::start().await;
    h.browse(json!({"browseId": CH}), feed(vec![post_item("UgkxA", "0"), marker("LOOP")]))
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"continuation": "LOOP"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch(vec![post_item("UgkxB", "0"), marker("LOOP")])))
        .expect(1)
        .mount(&h.server)
        .await;

    let archive = h.scraper(settings()).scrape_channel(CH).await.unwrap();
    assert_eq!(archive.posts.len(), 2);
}

#[tokio::test]
async fn test_comments_in_both_formats_with_replies() {
    let h = Harness::start().await;
    h.browse(json!({"browseId": CH}), feed(vec![post_item("UgkxA", "3")])).await;
    h.browse(json!({"browseId": "FEpost_detail"}), detail("UgkxA", "C1")).await;
    h.continuation(
        "C1",
        json!({
            "onResponseReceivedEndpoints": [{"reloadContinuationItemsCommand": {"continuationItems": [
                legacy_comment("UgwLEGACY", Some("R1")),
                {"commentThreadRenderer": {"commentViewModel": {"commentViewModel": {
                    "commentKey": "ck", "inlineRepliesKey": "ck-inline"
                }}}}
            ]}}],
            "frameworkUpdates": {"entityBatchUpdate": {"mutations": [
                entity("ck", "UgwENTITY", "entity comment"),
                entity("ck-inline-1", "UgwENTITY.r1", "inline reply")
            ]}}
        }),
    )
    .await;
    h.next("R1", batch(vec![reply("UgwLEGACY.r1"), reply("UgwLEGACY.r2")])).await;

    let scraper = h.scraper(ScrapeSettings {
        extract_comments: true,
        ..settings()
    });
    let archive = scraper.scrape_channel(CH).await.unwrap();
    let comments = &archive.posts[0].comments;

    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].id, "UgwLEGACY");
    let replies: Vec<_> = comments[0].replies.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(replies, vec!["UgwLEGACY.r1", "UgwLEGACY.r2"]);

    assert_eq!(comments[1].id, "UgwENTITY");
    assert_eq!(comments[1].text, "entity comment");
    assert_eq!(comments[1].like_count_display, "4");
    assert_eq!(comments[1].replies.len(), 1);

    assert_eq!(archive.metadata.total_comments, 5);
}

#[tokio::test]
async fn test_reply_fallback_uses_browse_endpoint() {
    let h = Harness::start().await;
    h.browse(json!({"browseId": "FEpost_detail"}), detail("UgkxA", "C1")).await;
    h.continuation("C1", batch(vec![legacy_comment("UgwA", Some("R1"))])).await;
    h.next("R1", json!({"responseContext": {}})).await;
    h.continuation("R1", batch(vec![reply("UgwA.r1")])).await;

    let comments = h.scraper(settings()).extract_comments(CH, "UgkxA").await.unwrap();
    assert_eq!(comments[0].replies.len(), 1);
    assert_eq!(comments[0].replies[0].id, "UgwA.r1");
}

#[tokio::test]
async fn test_replies_respect_bound() {
    let h = Harness::start().await;
    h.browse(json!({"browseId": "FEpost_detail"}), detail("UgkxA", "C1")).await;
    h.continuation("C1", batch(vec![legacy_comment("UgwA", Some("R1"))])).await;
    h.next("R1", batch(vec![reply("r1"), reply("r2"), marker("R2")])).await;
    h.next("R2", batch(vec![reply("r3"), reply("r4"), marker("R3")])).await;

    let scraper = h.scraper(ScrapeSettings {
        max_replies: 3,
        ..settings()
    });
    let comments = scraper.extract_comments(CH, "UgkxA").await.unwrap();
    assert_eq!(comments[0].replies.len(), 3);

    let tokens: Vec<String> = h
        .bodies()
        .await
        .iter()
        .filter_map(|b| b["continuation"].as_str().map(str::to_string))
        .collect();
    assert!(!tokens.contains(&"R3".to_string()));
}

#[tokio::test]
async fn test_individual_post_mode() {
    let h = Harness::start().await;
    h.browse(json!({"browseId": "FEpost_detail"}), detail("UgkxPOST", "C1")).await;
    h.continuation("C1", batch(vec![legacy_comment("UgwA", None), legacy_comment("UgwB", None)]))
        .await;

    let scraper = h.scraper(ScrapeSettings {
        extract_comments: true,
        ..settings()
    });
    let post = scraper.scrape_post(CH, "UgkxPOST").await.unwrap();
    let archive = scraper.archive(CH, vec![post]);

    assert_eq!(archive.posts.len(), 1);
    assert_eq!(archive.posts[0].id, "UgkxPOST");
    assert_eq!(archive.posts[0].comments.len(), 2);
    assert_eq!(archive.metadata.total_comments, 2);

    let detail_body = h
        .bodies()
        .await
        .into_iter()
        .find(|b| b["browseId"] == "FEpost_detail")
        .unwrap();
    assert!(detail_body["params"].as_str().is_some_and(|p| !p.is_empty()));
}
