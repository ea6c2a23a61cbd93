use mockito::{Matcher, Server};
use serde_json::json;
use soundcloud_gateway::api::session::SoundCloudSession;
use soundcloud_gateway::config::Config;
use soundcloud_gateway::models::Transcoding;

const STALE: &str = "StaleClientId000001";
const FRESH: &str = "FreshClientId123456";

fn config_for(server: &Server) -> Config {
    let mut cfg = Config::default();
    cfg.soundcloud.landing_page = format!("{}/", server.url());
    cfg.soundcloud.auth_token = "test-token".into();
    cfg
}

fn landing_html() -> String {
    r#"<html><head>
        <script crossorigin src="/assets/vendor.js"></script>
        <script crossorigin src="/assets/app.js"></script>
    </head><body></body></html>"#
        .to_string()
}

#[test]
fn rejected_credential_is_refreshed_once_and_retried() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(landing_html())
        .expect(1)
        .create();
    let _vendor = server
        .mock("GET", "/assets/vendor.js")
        .with_status(200)
        .with_body("var nothing_here = 1;")
        .create();
    let _app = server
        .mock("GET", "/assets/app.js")
        .with_status(200)
        .with_body(format!(r#"n.p="https://api-v2.soundcloud.com?client_id={}&app_version=1""#, FRESH))
        .create();
    let stale = server
        .mock("GET", "/v2/tracks/13158665")
        .match_query(Matcher::UrlEncoded("client_id".into(), STALE.into()))
        .with_status(403)
        .expect(1)
        .create();
    let fresh = server
        .mock("GET", "/v2/tracks/13158665")
        .match_query(Matcher::UrlEncoded("client_id".into(), FRESH.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": 13158665, "kind": "track"}).to_string())
        .expect(1)
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");
    session.set_client_id(Some(STALE.to_string()));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let res = rt.block_on(session.get("tracks/13158665", None));

    assert_eq!(res["id"], 13158665);
    assert_eq!(session.client_id().as_deref(), Some(FRESH));
    landing.assert();
    stale.assert();
    fresh.assert();
}

#[test]
fn second_rejection_is_not_retried_again() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(landing_html())
        .expect(1)
        .create();
    let _app = server
        .mock("GET", "/assets/app.js")
        .with_status(200)
        .with_body(format!("client_id={}", FRESH))
        .create();
    let rejected = server
        .mock("GET", "/v2/me/likes")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(2)
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");
    session.set_client_id(Some(STALE.to_string()));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let res = rt.block_on(session.get("me/likes", None));

    assert_eq!(res, json!({}));
    landing.assert();
    rejected.assert();
}

#[test]
fn credential_is_discovered_lazily_and_reused() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(landing_html())
        .expect(1)
        .create();
    let _app = server
        .mock("GET", "/assets/app.js")
        .with_status(200)
        .with_body(format!("client_id={}", FRESH))
        .create();
    let api = server
        .mock("GET", "/v2/mixed-selections")
        .match_query(Matcher::UrlEncoded("client_id".into(), FRESH.into()))
        .with_status(200)
        .with_body(json!({"collection": []}).to_string())
        .expect(2)
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");
    assert!(session.client_id().is_none());

    let rt = tokio::runtime::Runtime::new().expect("rt");
    rt.block_on(async {
        session.get("mixed-selections", None).await;
        session.get("mixed-selections", None).await;
    });

    assert_eq!(session.client_id().as_deref(), Some(FRESH));
    landing.assert();
    api.assert();
}

#[test]
fn failed_discovery_keeps_credential() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let _landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(r#"<script src="/assets/broken.js"></script>"#)
        .create();
    let _broken = server.mock("GET", "/assets/broken.js").with_status(404).create();
    let api = server
        .mock("GET", "/v2/tracks/1")
        .match_query(Matcher::Any)
        .with_status(403)
        .expect(1)
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");
    session.set_client_id(Some(STALE.to_string()));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let res = rt.block_on(session.get("tracks/1", None));

    assert_eq!(res, json!({}));
    assert_eq!(session.client_id().as_deref(), Some(STALE));
    // Unchanged credential: no pointless retry.
    api.assert();
}

#[test]
fn lazy_discovery_runs_once_per_call() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(landing_html())
        .expect(1)
        .create();
    let vendor = server
        .mock("GET", "/assets/vendor.js")
        .with_status(200)
        .with_body("var nothing_here = 1;")
        .expect(1)
        .create();
    let app = server
        .mock("GET", "/assets/app.js")
        .with_status(200)
        .with_body("var still_nothing = 2;")
        .expect(1)
        .create();
    let api = server
        .mock("GET", "/v2/tracks/1")
        .match_query(Matcher::Any)
        .with_status(401)
        .expect(1)
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let res = rt.block_on(session.get("tracks/1", None));

    assert_eq!(res, json!({}));
    assert!(session.client_id().is_none());
    landing.assert();
    vendor.assert();
    app.assert();
    api.assert();
}

fn stream_transcoding(server: &Server) -> Transcoding {
    Transcoding::new(
        &format!("{}/v2/media/7/stream/progressive", server.url()),
        "audio/ogg; codecs=\"opus\"",
        "progressive",
    )
}

#[test]
fn rejected_stream_resolution_retries_with_fresh_credential() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(landing_html())
        .expect(1)
        .create();
    let _app = server
        .mock("GET", "/assets/app.js")
        .with_status(200)
        .with_body(format!("client_id={}", FRESH))
        .create();
    let stale = server
        .mock("GET", "/v2/media/7/stream/progressive")
        .match_query(Matcher::UrlEncoded("client_id".into(), STALE.into()))
        .with_status(403)
        .expect(1)
        .create();
    let fresh = server
        .mock("GET", "/v2/media/7/stream/progressive")
        .match_query(Matcher::UrlEncoded("client_id".into(), FRESH.into()))
        .with_status(200)
        .with_body(json!({"url": "https://cf-media.test/7.ogg"}).to_string())
        .expect(1)
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");
    session.set_client_id(Some(STALE.to_string()));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let resp = rt.block_on(session.get_stream(&stream_transcoding(&server))).expect("stream");

    assert!(resp.is_success());
    assert_eq!(resp.json().expect("json")["url"], "https://cf-media.test/7.ogg");
    landing.assert();
    stale.assert();
    fresh.assert();
}

#[test]
fn stream_resolution_rejected_twice_is_returned() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(landing_html())
        .expect(1)
        .create();
    let _app = server
        .mock("GET", "/assets/app.js")
        .with_status(200)
        .with_body(format!("client_id={}", FRESH))
        .create();
    let stream = server
        .mock("GET", "/v2/media/7/stream/progressive")
        .match_query(Matcher::Any)
        .with_status(403)
        .expect(2)
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");
    session.set_client_id(Some(STALE.to_string()));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let resp = rt.block_on(session.get_stream(&stream_transcoding(&server))).expect("stream");

    assert_eq!(resp.status.as_u16(), 403);
    assert_eq!(session.client_id().as_deref(), Some(FRESH));
    landing.assert();
    stream.assert();
}

#[test]
fn concurrent_rejections_share_one_discovery() {
    let mut server = Server::new();
    let cfg = config_for(&server);

    let landing = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(landing_html())
        .expect(1)
        .create();
    let _app = server
        .mock("GET", "/assets/app.js")
        .with_status(200)
        .with_body(format!("client_id={}", FRESH))
        .create();
    let _stale = server
        .mock("GET", Matcher::Regex(r"^/v2/tracks/\d+$".into()))
        .match_query(Matcher::UrlEncoded("client_id".into(), STALE.into()))
        .with_status(429)
        .create();
    let _fresh = server
        .mock("GET", Matcher::Regex(r"^/v2/tracks/\d+$".into()))
        .match_query(Matcher::UrlEncoded("client_id".into(), FRESH.into()))
        .with_status(200)
        .with_body(json!({"kind": "track"}).to_string())
        .create();

    let session = SoundCloudSession::new(&cfg, &format!("{}/v2", server.url()), false).expect("session");
    session.set_client_id(Some(STALE.to_string()));

    let rt = tokio::runtime::Runtime::new().expect("rt");
    let (a, b, c) = rt.block_on(async {
        futures::join!(
            session.get("tracks/1", None),
            session.get("tracks/2", None),
            session.get("tracks/3", None)
        )
    });

    for res in [a, b, c] {
        assert_eq!(res["kind"], "track");
    }
    landing.assert();
}
