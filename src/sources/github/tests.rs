use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tenant() -> Tenant {
    Tenant {
        id: "tenant-a".to_string(),
        github_token: Some("ghs_test".to_string()),
        notion_api_key: None,
        notion_database_id: None,
    }
}

fn connector(server: &MockServer) -> GithubConnector {
    GithubConnector::with_api_base(&SyncConfig::default(), &server.uri())
        .expect("can create connector")
        .with_retry_attempts(1)
}

async fn mount_repos(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/installation/repositories"))
        .and(header("Authorization", "Bearer ghs_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "repositories": [
                { "full_name": "acme/api", "language": "Rust" }
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn list_all_walks_tree_and_skips_excluded_dirs() {
    let server = MockServer::start().await;
    mount_repos(&server).await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "lib.rs", "path": "lib.rs", "type": "file" },
            { "name": "src", "path": "src", "type": "dir" },
            { "name": "node_modules", "path": "node_modules", "type": "dir" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/src"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "main.rs", "path": "src/main.rs", "type": "file" }
        ])))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let items = connector.list_all(&tenant()).await.expect("list_all works");

    let keys: Vec<&str> = items.iter().map(|i| i.source_key.as_str()).collect();
    assert!(keys.contains(&"acme/api:lib.rs"));
    assert!(keys.contains(&"acme/api:src/main.rs"));
    assert_eq!(items.len(), 2, "excluded dir must not be entered");
    assert!(items.iter().all(|i| i.status == ChangeStatus::Added));
    assert_eq!(items[0].metadata.repository.as_deref(), Some("acme/api"));
}

#[tokio::test]
async fn list_changed_dedupes_by_filename_keeping_latest_status() {
    let server = MockServer::start().await;
    mount_repos(&server).await;

    let since = Utc::now() - chrono::Duration::hours(24);

    // The matcher only accepts the Z-suffixed timestamp; an offset form with
    // a raw `+` would decode as a space and miss.
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/commits"))
        .and(query_param(
            "since",
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "sha": "new" },
            { "sha": "old" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/api/commits/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "filename": "a.rs", "status": "removed", "additions": 0, "deletions": 10, "changes": 10 }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/api/commits/old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [
                { "filename": "a.rs", "status": "modified", "additions": 5, "deletions": 2, "changes": 7 },
                { "filename": "b.rs", "status": "added", "additions": 20, "deletions": 0, "changes": 20 }
            ]
        })))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let items = connector
        .list_changed(&tenant(), since)
        .await
        .expect("list_changed works");

    assert_eq!(items.len(), 2);

    let a = items
        .iter()
        .find(|i| i.source_key == "acme/api:a.rs")
        .expect("a.rs present");
    // Newest commit wins the dedup.
    assert_eq!(a.status, ChangeStatus::Removed);

    let b = items
        .iter()
        .find(|i| i.source_key == "acme/api:b.rs")
        .expect("b.rs present");
    assert_eq!(b.status, ChangeStatus::Added);
    assert_eq!(b.metadata.additions, Some(20));
}

#[tokio::test]
async fn repository_listing_pages_until_short_page() {
    let server = MockServer::start().await;

    let full_page: Vec<_> = (0..REPOS_PER_PAGE)
        .map(|i| json!({ "full_name": format!("acme/repo-{}", i), "language": null }))
        .collect();

    Mock::given(method("GET"))
        .and(path("/installation/repositories"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "repositories": full_page })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/installation/repositories"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "repositories": [{ "full_name": "acme/last", "language": null }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(&server);
    let repositories = connector
        .list_repositories("ghs_test")
        .expect("can list repositories");

    assert_eq!(repositories.len(), REPOS_PER_PAGE + 1);
}

#[tokio::test]
async fn fetch_content_decodes_base64() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/src/lib.rs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "Zm4gbWFpbigpIHt9\n",
            "encoding": "base64"
        })))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let item = ContentItem {
        source: SourceKind::Github,
        source_key: "acme/api:src/lib.rs".to_string(),
        status: ChangeStatus::Modified,
        metadata: ItemMetadata::default(),
    };

    let content = connector
        .fetch_content(&tenant(), &item)
        .await
        .expect("fetch works");
    assert_eq!(content.as_deref(), Some("fn main() {}"));
}

#[tokio::test]
async fn fetch_content_missing_file_is_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let item = ContentItem {
        source: SourceKind::Github,
        source_key: "acme/api:gone.rs".to_string(),
        status: ChangeStatus::Modified,
        metadata: ItemMetadata::default(),
    };

    let content = connector
        .fetch_content(&tenant(), &item)
        .await
        .expect("fetch works");
    assert!(content.is_none());
}

#[tokio::test]
async fn fetch_content_binary_is_absent() {
    let server = MockServer::start().await;

    // 0xFF 0xFE is not valid UTF-8.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "//4=",
            "encoding": "base64"
        })))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let item = ContentItem {
        source: SourceKind::Github,
        source_key: "acme/api:logo.png".to_string(),
        status: ChangeStatus::Added,
        metadata: ItemMetadata::default(),
    };

    let content = connector
        .fetch_content(&tenant(), &item)
        .await
        .expect("fetch works");
    assert!(content.is_none());
}

#[tokio::test]
async fn directory_failure_skips_but_continues() {
    let server = MockServer::start().await;
    mount_repos(&server).await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "ok.rs", "path": "ok.rs", "type": "file" },
            { "name": "broken", "path": "broken", "type": "dir" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/api/contents/broken"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let connector = connector(&server);
    let items = connector.list_all(&tenant()).await.expect("list_all works");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source_key, "acme/api:ok.rs");
}

#[test]
fn supported_extension_allow_list() {
    let config = SyncConfig::default();
    let connector = GithubConnector::new(&config).expect("can create connector");

    let supported = ContentItem {
        source: SourceKind::Github,
        source_key: "acme/api:src/lib.rs".to_string(),
        status: ChangeStatus::Added,
        metadata: ItemMetadata::default(),
    };
    assert!(connector.is_supported(&supported));

    let unsupported = ContentItem {
        source: SourceKind::Github,
        source_key: "acme/api:logo.png".to_string(),
        status: ChangeStatus::Added,
        metadata: ItemMetadata::default(),
    };
    assert!(!connector.is_supported(&unsupported));

    let no_extension = ContentItem {
        source: SourceKind::Github,
        source_key: "acme/api:Makefile".to_string(),
        status: ChangeStatus::Added,
        metadata: ItemMetadata::default(),
    };
    assert!(!connector.is_supported(&no_extension));
}

#[tokio::test]
async fn missing_token_is_an_error() {
    let server = MockServer::start().await;
    let connector = connector(&server);

    let tenant = Tenant {
        id: "no-github".to_string(),
        github_token: None,
        notion_api_key: None,
        notion_database_id: None,
    };

    assert!(connector.list_all(&tenant).await.is_err());
}
