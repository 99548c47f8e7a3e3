//! Listen-history fixtures served through wiremock

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// User key the fixtures are served for
pub const FIXTURE_USER: &str = "6a1f0c";

/// Page size the default configuration requests
pub const PAGE_SIZE: u64 = 100;

/// One listen record as the API returns it
pub fn listen_json(i: u64) -> Value {
    json!({
        "id": format!("listen-{i}"),
        "date": 1_700_000_000_000_u64 + i * 1000,
        "song": {
            "name": format!("Track {i}"),
            "artists": [{ "name": "Fixture Artist" }]
        }
    })
}

/// Body of page `page` of a history holding `total` listens
pub fn history_page(page: u64, total: u64) -> Value {
    let start = page * PAGE_SIZE;
    let end = (start + PAGE_SIZE).min(total);
    json!({
        "tracks": (start..end).map(listen_json).collect::<Vec<_>>(),
        "totalTracks": total
    })
}

/// Serve a complete history of `total` listens for [`FIXTURE_USER`]
///
/// Every page is expected exactly once; the server checks on drop.
pub async fn mount_history(server: &MockServer, total: u64) {
    let pages = total.div_ceil(PAGE_SIZE).max(1);
    for page in 0..pages {
        Mock::given(method("GET"))
            .and(path(format!("/profile/listens/{FIXTURE_USER}")))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_page(page, total)))
            .expect(1)
            .mount(server)
            .await;
    }
}

/// Serve a user profile lookup
pub async fn mount_profile(server: &MockServer, username: &str) {
    Mock::given(method("GET"))
        .and(path("/profiles"))
        .and(query_param("username", username))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": FIXTURE_USER,
            "username": username,
            "displayName": "Fixture User"
        })))
        .mount(server)
        .await;
}
