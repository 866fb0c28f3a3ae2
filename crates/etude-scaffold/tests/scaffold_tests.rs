use axum::body::Body;
use axum::http::{Request as HttpRequest, StatusCode, header};
use etude_core::prelude::*;
use etude_core::testing::TestClient;
use tower::ServiceExt;

fn config() -> Config {
    Config {
        secret_key: "scaffold-tests".to_string(),
        environment: "test".to_string(),
        ..Config::default()
    }
}

fn app() -> App {
    App::new(config(), etude_scaffold::routes()).expect("app")
}

fn signed_in(app: &App, name: &str, password: &str) -> TestClient {
    let mut client = app.test_client();
    client.get("/login");
    let res = client.submit_form("/login", &[("username", name), ("password", password)]);
    assert_eq!(res.status, 303, "{}", res.body_text());
    assert_eq!(res.header_value("Location"), Some("/home"));
    client
}

#[test]
fn test_manifest_matches_code_routes() {
    let manifest = RouteManifest::from_toml(include_str!("../routes.toml")).expect("parse");
    let from_file = manifest.build(&etude_scaffold::registry()).expect("build");
    let from_code = etude_scaffold::routes().build().expect("build");

    assert_eq!(from_file.len(), from_code.len());
    for (a, b) in from_file.routes().iter().zip(from_code.routes()) {
        assert_eq!(a.method, b.method);
        assert_eq!(a.pattern.as_str(), b.pattern.as_str());
        assert_eq!(format!("{:?}", a.guards), format!("{:?}", b.guards));
    }
}

#[test]
fn test_first_login_creates_account() {
    let app = app();
    let mut client = signed_in(&app, "ann", "hunter2");
    assert!(app.identity().find_by_name("ann").is_ok());

    let res = client.get("/home");
    assert_eq!(res.status, 200);
    assert!(res.body_text().contains("Welcome, ann."));
}

#[test]
fn test_wrong_password_rerenders_form() {
    let app = app();
    signed_in(&app, "ann", "hunter2");

    let mut other = app.test_client();
    other.get("/login");
    let res = other.submit_form("/login", &[("username", "ann"), ("password", "guess")]);
    assert_eq!(res.status, 401);
    assert!(res.body_text().contains("Wrong username/password combination"));
    assert!(other.cookie("login").is_none());
}

#[test]
fn test_user_name_is_escaped() {
    let app = app();
    let mut client = signed_in(&app, "<b>ann</b>", "pw");
    let body = client.get("/home").body_text();
    assert!(body.contains("&lt;b&gt;ann&lt;/b&gt;"));
    assert!(!body.contains("<b>ann</b>"));
}

#[test]
fn test_theme_round_trip() {
    let app = app();
    let mut client = signed_in(&app, "ann", "pw");

    assert_eq!(client.submit_form("/home/create", &[("theme", "dark")]).status, 303);
    assert_eq!(client.cookie("theme"), Some("dark"));
    assert!(client.get("/home").body_text().contains("Theme: dark."));

    assert_eq!(client.submit_form("/home/create", &[("theme", "plaid")]).status, 400);
    assert_eq!(client.cookie("theme"), Some("dark"));

    assert_eq!(client.submit_form("/home/delete", &[]).status, 303);
    assert_eq!(client.cookie("theme"), None);
}

#[test]
fn test_update_signs_out_other_devices() {
    let app = app();
    let mut laptop = signed_in(&app, "ann", "pw");
    let mut phone = signed_in(&app, "ann", "pw");

    assert_eq!(laptop.submit_form("/home/update", &[]).status, 303);
    assert_eq!(laptop.get("/home").status, 200);
    assert_eq!(phone.get("/home").status, 401);
}

#[test]
fn test_home_forms_require_token() {
    let app = app();
    let mut client = signed_in(&app, "ann", "pw");
    assert_eq!(client.post_form("/home/delete", &[]).status, 403);
    assert_eq!(client.post_form("/logout", &[]).status, 403);
    assert!(client.cookie("login").is_some());

    assert_eq!(client.submit_form("/logout", &[]).status, 303);
    assert!(client.cookie("login").is_none());
}

#[test]
fn test_unknown_page_is_404() {
    let app = app();
    let mut client = app.test_client();
    let res = client.get("/no/such/page");
    assert_eq!(res.status, 404);
    assert!(res.body_text().contains("No page at /no/such/page"));
}

#[tokio::test]
async fn test_served_over_axum() {
    let res = app()
        .router()
        .oneshot(HttpRequest::get("/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert_eq!(res.headers().get_all(header::SET_COOKIE).iter().count(), 1);
}
