use cookie::Cookie;
use cookie::time::Duration;
use etude_core::EtudeError;
use etude_core::cookie::{CookieJar, CookieOptions, MAX_COOKIE_SIZE, SameSite, parse_cookie_header};

#[test]
fn test_each_cookie_is_its_own_header() {
    let mut jar = CookieJar::new();
    for i in 0..5 {
        jar.add(format!("c{}", i), format!("v{}", i), CookieOptions::default())
            .expect("add");
    }
    let headers = jar.flush();
    assert_eq!(headers.len(), 5);
    for (i, header) in headers.iter().enumerate() {
        assert!(header.starts_with(&format!("c{}=v{};", i, i)));
        assert_eq!(header.matches('=').count(), 2, "one cookie per line: {}", header);
    }
}

#[test]
fn test_oversized_cookie_is_refused_and_jar_unchanged() {
    let mut jar = CookieJar::new();
    jar.add("small", "ok", CookieOptions::default()).expect("add");

    let err = jar
        .add("big", "x".repeat(MAX_COOKIE_SIZE), CookieOptions::default())
        .unwrap_err();
    assert!(matches!(err, EtudeError::CookieTooLarge { ref name, .. } if name == "big"));
    assert_eq!(err.status_code(), 500);

    let headers = jar.flush();
    assert_eq!(headers, vec!["small=ok; Path=/".to_string()]);
}

#[test]
fn test_size_limit_counts_attributes() {
    // "v=" + value + "; Path=/" lands exactly on the limit.
    let value = "x".repeat(MAX_COOKIE_SIZE - "v=; Path=/".len());
    let mut jar = CookieJar::new();
    assert!(matches!(
        jar.add("v", value.clone(), CookieOptions::default()),
        Err(EtudeError::CookieTooLarge { size, .. }) if size == MAX_COOKIE_SIZE
    ));
    let shorter = &value[1..];
    jar.add("v", shorter, CookieOptions::default()).expect("one byte under the limit");
}

#[test]
fn test_attributes_serialize_in_order() {
    let mut jar = CookieJar::new();
    jar.add(
        "pref",
        "compact",
        CookieOptions::default()
            .max_age(60)
            .domain("example.org")
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Strict),
    )
    .expect("add");
    let header = jar.flush().remove(0);
    assert_eq!(
        header,
        "pref=compact; HttpOnly; SameSite=Strict; Secure; Path=/; Domain=example.org; Max-Age=60"
    );

    let parsed = Cookie::parse(header.as_str()).expect("user agents can read it back");
    assert_eq!(parsed.name_value(), ("pref", "compact"));
    assert_eq!(parsed.max_age(), Some(Duration::seconds(60)));
    assert_eq!(parsed.same_site(), Some(SameSite::Strict));
    assert_eq!(parsed.domain(), Some("example.org"));
}

#[test]
fn test_delete_expires_at_epoch() {
    let mut jar = CookieJar::new();
    jar.delete("login").expect("delete");
    let header = jar.flush().remove(0);
    assert_eq!(
        header,
        "login=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    );
}

#[test]
fn test_invalid_names_and_values_are_rejected() {
    let mut jar = CookieJar::new();
    assert!(matches!(
        jar.add("bad name", "v", CookieOptions::default()),
        Err(EtudeError::InvalidCookie { .. })
    ));
    assert!(matches!(
        jar.add("name", "semi;colon", CookieOptions::default()),
        Err(EtudeError::InvalidCookie { .. })
    ));
    assert!(jar.is_empty());
}

#[test]
fn test_request_header_parsing() {
    let pairs = parse_cookie_header(r#"a=1; b="two"; junk; a=3; =x"#);
    assert_eq!(
        pairs,
        vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "two".to_string())
        ]
    );
}

#[test]
fn test_expires_is_written_as_http_date() {
    let at = chrono::DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp");
    let mut jar = CookieJar::new();
    jar.add("seen", "1", CookieOptions::default().expires(at))
        .expect("add");
    let header = jar.flush().remove(0);
    assert_eq!(header, "seen=1; Path=/; Expires=Tue, 14 Nov 2023 22:13:20 GMT");
}
