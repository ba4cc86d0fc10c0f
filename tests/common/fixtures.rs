//! Mock redirect endpoints

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock endpoint serves
pub const RANDOM_PATH: &str = "/400/600";

/// Endpoint URL of a mock server
pub fn endpoint(server: &MockServer) -> String {
    format!("{}{}", server.uri(), RANDOM_PATH)
}

/// Answer every request with a 302 to a fixed image URL
pub async fn mount_redirect(server: &MockServer, location: &str) {
    Mock::given(method("GET"))
        .and(path(RANDOM_PATH))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", location))
        .mount(server)
        .await;
}

/// Answer the first `times` requests with `status`, before any other mock
pub async fn mount_failures(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(RANDOM_PATH))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .with_priority(1)
        .mount(server)
        .await;
}

/// Answer every request with `status`
pub async fn mount_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(RANDOM_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}
