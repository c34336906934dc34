//! Turns an [`ApiRequest`] into an outbound `reqwest::Request`.
//!
//! URL resolution works in three steps: the path template is split from its
//! embedded query, the template path is joined onto the base URL's path, and
//! `{name}` placeholders are filled from the request's path parameters. Query
//! parameters from the base URL, the template and the request are merged and
//! emitted sorted by key.

use crate::{
    codec::JsonCodec,
    params::Location,
    request::{ApiRequest, RequestBody},
    Error, Result,
};
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::{form_urlencoded, Url};

/// Per-client settings that shape every outbound request.
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    pub(crate) base_url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) timeout: Option<Duration>,
}

/// Builds the headers sent with every request.
pub(crate) fn standard_headers(
    media_type: &str,
    charset: &str,
    user_agent: &str,
) -> Result<HeaderMap> {
    let header = |value: String| {
        HeaderValue::try_from(value)
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        header(format!("{}; charset={}", media_type, charset))?,
    );
    headers.insert(ACCEPT, header(media_type.to_string())?);
    headers.insert(USER_AGENT, header(user_agent.to_string())?);
    Ok(headers)
}

/// Composes the full outbound request: URL, standard headers, body and timeout.
pub(crate) fn compose<R>(
    request: &R,
    outbound: &Outbound,
    codec: &JsonCodec,
) -> Result<reqwest::Request>
where
    R: ApiRequest + ?Sized,
{
    let url = build_url(request, &outbound.base_url)?;
    let body = encode_body(request.body(), codec)?;

    let mut composed = reqwest::Request::new(request.method(), url);
    *composed.headers_mut() = outbound.headers.clone();
    *composed.body_mut() = body;
    *composed.timeout_mut() = outbound.timeout;
    Ok(composed)
}

/// Resolves the request's path template and parameters against `base_url`.
///
/// # Errors
///
/// Returns [`Error::Template`] if the template contains control characters or
/// a malformed percent-escape, or if a placeholder has no matching path
/// parameter.
///
/// # Examples
///
/// ```
/// use omniapi::{build_url, Param, RequestMetadata};
/// use http::Method;
/// use url::Url;
///
/// let base = Url::parse("https://api.example.com/v2/").unwrap();
/// let request = RequestMetadata::new(Method::GET, "/users/{id}?expand=teams")
///     .with_param(Param::path("id", &7u32))
///     .with_param(Param::query("limit", &10u32));
///
/// let url = build_url(&request, &base).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "https://api.example.com/v2/users/7?expand=teams&limit=10"
/// );
/// ```
pub fn build_url<R>(request: &R, base_url: &Url) -> Result<Url>
where
    R: ApiRequest + ?Sized,
{
    let template = request.path_template();
    validate_template(&template)?;
    let (template_path, template_query) = split_template(&template);

    let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in base_url.query_pairs() {
        query.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    if let Some(template_query) = template_query {
        for (key, value) in form_urlencoded::parse(template_query.as_bytes()) {
            query.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }

    let params = request.params();
    let mut path_params = HashMap::new();
    for param in params.iter().filter(|p| p.is_included()) {
        let value = param.value().unwrap_or_default();
        match param.location() {
            Location::Path => {
                path_params.insert(param.name(), value);
            }
            Location::Query => {
                query
                    .entry(param.name().to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }
    }

    let mut path = join_path(base_url.path(), template_path);
    let missing = params.iter().find(|p| {
        matches!(p.location(), Location::Path)
            && !p.is_included()
            && path.contains(&format!("{{{}}}", p.name()))
    });
    if let Some(param) = missing {
        return Err(Error::Template(format!(
            "no value for path parameter `{}` in `{}`",
            param.name(),
            template
        )));
    }
    if !path_params.is_empty() {
        path = render_template(&path, &path_params)?;
    }

    let mut url = base_url.clone();
    url.set_path(&path);
    url.set_fragment(None);
    if query.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &query {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        url.set_query(Some(&serializer.finish()));
    }

    Ok(url)
}

fn validate_template(template: &str) -> Result<()> {
    if let Some(c) = template.chars().find(char::is_ascii_control) {
        return Err(Error::Template(format!(
            "control character {:?} in `{}`",
            c, template
        )));
    }

    let bytes = template.as_bytes();
    for (i, _) in template.match_indices('%') {
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(Error::Template(format!(
                "malformed percent-escape in `{}`",
                template
            )));
        }
    }

    Ok(())
}

/// Splits off the embedded query; a fragment is dropped.
fn split_template(template: &str) -> (&str, Option<&str>) {
    let template = template.split('#').next().unwrap_or_default();
    match template.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (template, None),
    }
}

/// Joins two paths segment-wise, resolving `.` and `..`.
fn join_path(base: &str, tail: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(tail.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

fn render_template(path: &str, params: &HashMap<&str, &str>) -> Result<String> {
    let mut rendered = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(brace) = rest.find(['{', '}']) {
        let (literal, tail) = rest.split_at(brace);
        rendered.push_str(literal);

        if tail.starts_with('}') {
            return Err(Error::Template(format!("unmatched `}}` in `{}`", path)));
        }
        let close = tail
            .find('}')
            .ok_or_else(|| Error::Template(format!("unclosed `{{` in `{}`", path)))?;
        let name = &tail[1..close];
        if name.contains('{') {
            return Err(Error::Template(format!("unclosed `{{` in `{}`", path)));
        }

        let value = params.get(name).ok_or_else(|| {
            Error::Template(format!(
                "no path parameter for `{{{}}}` in `{}`",
                name, path
            ))
        })?;
        rendered.push_str(value);
        rest = &tail[close + 1..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

fn encode_body(body: Option<RequestBody<'_>>, codec: &JsonCodec) -> Result<Option<reqwest::Body>> {
    let body = match body {
        None => return Ok(None),
        Some(RequestBody::Stream(stream)) => stream,
        Some(RequestBody::Bytes(bytes)) => reqwest::Body::from(bytes),
        Some(RequestBody::Text(text)) => reqwest::Body::from(text.into_owned()),
        Some(RequestBody::Json(value)) => {
            reqwest::Body::from(codec.encode(value).map_err(Error::Encode)?)
        }
    };
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Param, RequestMetadata};
    use http::Method;
    use serde::Serialize;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    fn outbound(url: &str) -> Outbound {
        Outbound {
            base_url: base(url),
            headers: standard_headers("application/json", "utf-8", "omniapi-test").unwrap(),
            timeout: None,
        }
    }

    #[test]
    fn test_join_keeps_base_prefix() {
        let request = RequestMetadata::new(Method::GET, "/users/me");
        let url = build_url(&request, &base("https://api.example.com/api/v1")).unwrap();
        assert_eq!(url.path(), "/api/v1/users/me");
        assert_eq!(url.query(), None);

        let url = build_url(&request, &base("https://api.example.com/api/v1/")).unwrap();
        assert_eq!(url.path(), "/api/v1/users/me");
    }

    #[test]
    fn test_join_path_cleans_segments() {
        assert_eq!(join_path("/a/", "b//c/"), "/a/b/c");
        assert_eq!(join_path("/a/b", "../c/./d"), "/a/c/d");
        assert_eq!(join_path("/", ""), "/");
    }

    #[test]
    fn test_template_query_is_kept_without_params() {
        let request = RequestMetadata::new(Method::GET, "search?q=rust&sort=desc");
        let url = build_url(&request, &base("https://api.example.com")).unwrap();
        assert_eq!(url.path(), "/search");
        assert_eq!(url.query(), Some("q=rust&sort=desc"));
    }

    #[test]
    fn test_duplicate_query_keys_are_all_emitted() {
        let request = RequestMetadata::new(Method::GET, "/items?tag=a")
            .with_param(Param::query("tag", "b"))
            .with_param(Param::query("page", &2u32));
        let url = build_url(&request, &base("https://api.example.com?key=k")).unwrap();
        assert_eq!(url.query(), Some("key=k&page=2&tag=a&tag=b"));
    }

    #[test]
    fn test_omit_empty_query_param() {
        let request = RequestMetadata::new(Method::GET, "/items")
            .with_param(Param::query("offset", &0u32).omit_empty())
            .with_param(Param::query("limit", &0u32));
        let url = build_url(&request, &base("https://api.example.com")).unwrap();
        assert_eq!(url.query(), Some("limit=0"));
    }

    #[test]
    fn test_path_placeholders_are_rendered() {
        let request = RequestMetadata::new(Method::GET, "/orgs/{org}/repos/{repo}")
            .with_param(Param::path("org", "rust-lang"))
            .with_param(Param::path("repo", "cargo"));
        let url = build_url(&request, &base("https://api.example.com/v3")).unwrap();
        assert_eq!(url.path(), "/v3/orgs/rust-lang/repos/cargo");
    }

    #[test]
    fn test_unresolved_placeholder_is_an_error() {
        let request = RequestMetadata::new(Method::GET, "/orgs/{org}/repos/{repo}")
            .with_param(Param::path("org", "rust-lang"));
        let err = build_url(&request, &base("https://api.example.com")).unwrap_err();
        assert!(matches!(err, Error::Template(ref msg) if msg.contains("{repo}")));
    }

    #[test]
    fn test_unbalanced_braces_are_errors() {
        let params = HashMap::from([("id", "1")]);
        assert!(render_template("/a/{id", &params).is_err());
        assert!(render_template("/a/id}", &params).is_err());
        assert!(render_template("/a/{{id}", &params).is_err());
        assert_eq!(render_template("/a/{id}/b", &params).unwrap(), "/a/1/b");
    }

    #[test]
    fn test_omitted_path_param_is_an_error() {
        let missing: Option<u32> = None;
        let request = RequestMetadata::new(Method::GET, "/users/{id}")
            .with_param(Param::path("id", &missing));
        let err = build_url(&request, &base("https://api.example.com")).unwrap_err();
        assert!(matches!(err, Error::Template(ref msg) if msg.contains("`id`")));

        // Zero values dropped by omit_empty leave the placeholder unfilled too.
        let request = RequestMetadata::new(Method::GET, "/pages/{page}")
            .with_param(Param::path("page", &0u32).omit_empty());
        assert!(matches!(
            build_url(&request, &base("https://api.example.com")),
            Err(Error::Template(_))
        ));

        // A missing param whose placeholder is absent is ignored.
        let request = RequestMetadata::new(Method::GET, "/users")
            .with_param(Param::path("id", &missing));
        let url = build_url(&request, &base("https://api.example.com")).unwrap();
        assert_eq!(url.path(), "/users");
    }

    #[test]
    fn test_invalid_templates() {
        let request = RequestMetadata::new(Method::GET, "/a\u{7f}b");
        assert!(matches!(
            build_url(&request, &base("https://api.example.com")),
            Err(Error::Template(_))
        ));

        let request = RequestMetadata::new(Method::GET, "/a%zzb");
        assert!(matches!(
            build_url(&request, &base("https://api.example.com")),
            Err(Error::Template(_))
        ));
    }

    #[test]
    fn test_fragment_is_dropped() {
        let request = RequestMetadata::new(Method::GET, "/docs?page=1#intro");
        let url = build_url(&request, &base("https://api.example.com")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/docs?page=1");
    }

    #[derive(Serialize)]
    struct Payload {
        name: &'static str,
        count: u32,
    }

    #[test]
    fn test_compose_sets_standard_headers_and_json_body() {
        let payload = Payload {
            name: "x",
            count: 2,
        };
        let request = RequestMetadata::new(Method::POST, "/things").with_json(&payload)
            .unwrap();
        let composed = compose(&request, &outbound("https://api.example.com"), &JsonCodec::default())
            .unwrap();

        assert_eq!(composed.method(), &Method::POST);
        assert_eq!(
            composed.headers()[CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(composed.headers()[ACCEPT], "application/json");
        assert_eq!(composed.headers()[USER_AGENT], "omniapi-test");
        assert_eq!(
            composed.body().and_then(reqwest::Body::as_bytes),
            Some(&br#"{"count":2,"name":"x"}"#[..])
        );
    }

    #[test]
    fn test_compose_raw_bodies() {
        let codec = JsonCodec::default();
        let outbound = outbound("https://api.example.com");

        let request = RequestMetadata::new(Method::PUT, "/blob").with_body_bytes(vec![1u8, 2, 3]);
        let composed = compose(&request, &outbound, &codec).unwrap();
        assert_eq!(
            composed.body().and_then(reqwest::Body::as_bytes),
            Some(&[1u8, 2, 3][..])
        );

        let request = RequestMetadata::new(Method::PUT, "/note").with_body_text("hello");
        let composed = compose(&request, &outbound, &codec).unwrap();
        assert_eq!(
            composed.body().and_then(reqwest::Body::as_bytes),
            Some(&b"hello"[..])
        );

        let request = RequestMetadata::new(Method::GET, "/note");
        assert!(compose(&request, &outbound, &codec).unwrap().body().is_none());
    }

    #[test]
    fn test_compose_is_idempotent() {
        let payload = Payload {
            name: "same",
            count: 9,
        };
        let request = RequestMetadata::new(Method::POST, "/v/{id}?b=2&a=1")
            .with_param(Param::path("id", &5u8))
            .with_param(Param::query("c", "3"))
            .with_json(&payload)
            .unwrap();
        let codec = JsonCodec::default();
        let outbound = outbound("https://api.example.com/base");

        let first = compose(&request, &outbound, &codec).unwrap();
        let second = compose(&request, &outbound, &codec).unwrap();

        assert_eq!(first.method(), second.method());
        assert_eq!(first.url(), second.url());
        assert_eq!(first.headers(), second.headers());
        assert_eq!(
            first.body().and_then(reqwest::Body::as_bytes),
            second.body().and_then(reqwest::Body::as_bytes)
        );
        assert_eq!(first.url().as_str(), "https://api.example.com/base/v/5?a=1&b=2&c=3");
    }
}
