//! Redirect Handling
//!
//! A [`RedirectStrategy`] decides whether a response redirects, and builds
//! the request that follows it. The redirect stage of the client bounds the
//! chain by [`RequestConfig::max_redirects`](crate::RequestConfig::max_redirects)
//! and refuses circular chains unless the config allows them.
//!
//! The [`DefaultRedirectStrategy`] follows redirects of `GET` and `HEAD`
//! only; [`DefaultRedirectStrategy::lax`] also follows `POST` and `DELETE`.
//! `303 See Other` is always followed with a `GET`.

use http::header::{
    HeaderMap, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, PROXY_AUTHORIZATION,
    TRANSFER_ENCODING, WWW_AUTHENTICATE,
};
use http::{Method, Request, Response, StatusCode};
use url::Url;

use crate::context::ClientContext;
use crate::into_url::{try_uri, try_url};
use crate::Body;

/// Decides whether and where to follow a redirect.
pub trait RedirectStrategy: Send + Sync {
    /// Returns true if `response` to `request` should be followed.
    fn is_redirected(
        &self,
        request: &Request<Body>,
        response: &Response<Body>,
        ctx: &ClientContext,
    ) -> bool;

    /// The request that follows the redirect.
    ///
    /// Records the new location in the context.
    ///
    /// # Errors
    ///
    /// Fails if the `Location` is missing, invalid, a relative reference
    /// while those are not allowed, or a location already visited while
    /// circular redirects are not allowed.
    fn get_redirect(
        &self,
        request: &Request<Body>,
        response: &Response<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Request<Body>>;
}

/// The redirect strategy used by default.
#[derive(Clone, Debug)]
pub struct DefaultRedirectStrategy {
    redirect_methods: &'static [Method],
}

const STRICT: &[Method] = &[Method::GET, Method::HEAD];
const LAX: &[Method] = &[Method::GET, Method::POST, Method::HEAD, Method::DELETE];

impl DefaultRedirectStrategy {
    /// Follows redirects of `GET` and `HEAD`.
    pub fn new() -> DefaultRedirectStrategy {
        DefaultRedirectStrategy {
            redirect_methods: STRICT,
        }
    }

    /// Follows redirects of `GET`, `POST`, `HEAD` and `DELETE`.
    pub fn lax() -> DefaultRedirectStrategy {
        DefaultRedirectStrategy {
            redirect_methods: LAX,
        }
    }

    fn is_redirectable(&self, method: &Method) -> bool {
        self.redirect_methods.contains(method)
    }

    fn location(
        &self,
        request: &Request<Body>,
        response: &Response<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Url> {
        let base = try_url(request.uri())
            .ok_or_else(|| crate::error::builder("request URI is not absolute"))?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                crate::error::redirect(
                    format!(
                        "received redirect response {} but no location header",
                        response.status()
                    ),
                    base.clone(),
                )
            })?;
        log::debug!("redirect requested to location '{location}'");

        let config = ctx.request_config();
        let url = match Url::parse(location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                if !config.relative_redirects_allowed() {
                    return Err(crate::error::redirect(
                        format!("relative redirect location '{location}' not allowed"),
                        base,
                    ));
                }
                base.join(location).map_err(|e| {
                    crate::error::redirect(
                        format!("invalid redirect URI {location}: {e}"),
                        base.clone(),
                    )
                })?
            }
            Err(e) => {
                return Err(crate::error::redirect(
                    format!("invalid redirect URI {location}: {e}"),
                    base,
                ))
            }
        };
        if !config.circular_redirects_allowed() && ctx.redirect_locations().contains(&url) {
            return Err(crate::error::redirect(
                format!("circular redirect to '{url}'"),
                url,
            ));
        }
        ctx.redirect_locations_mut().push(url.clone());
        Ok(url)
    }
}

impl Default for DefaultRedirectStrategy {
    fn default() -> DefaultRedirectStrategy {
        DefaultRedirectStrategy::new()
    }
}

impl RedirectStrategy for DefaultRedirectStrategy {
    fn is_redirected(
        &self,
        request: &Request<Body>,
        response: &Response<Body>,
        _ctx: &ClientContext,
    ) -> bool {
        let method = request.method();
        match response.status() {
            StatusCode::FOUND => {
                self.is_redirectable(method) && response.headers().contains_key(LOCATION)
            }
            StatusCode::MOVED_PERMANENTLY
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT => self.is_redirectable(method),
            StatusCode::SEE_OTHER => true,
            _ => false,
        }
    }

    fn get_redirect(
        &self,
        request: &Request<Body>,
        response: &Response<Body>,
        ctx: &mut ClientContext,
    ) -> crate::Result<Request<Body>> {
        let url = self.location(request, response, ctx)?;
        let uri = try_uri(&url)?;

        let keep_method = response.status() == StatusCode::TEMPORARY_REDIRECT
            || response.status() == StatusCode::PERMANENT_REDIRECT;
        let (method, body) = match *request.method() {
            Method::HEAD => (Method::HEAD, None),
            Method::GET => (Method::GET, None),
            ref other if keep_method => {
                let body = request.body().try_clone().ok_or_else(|| {
                    crate::error::non_repeatable(Some(
                        "cannot redirect request with a non-repeatable body",
                    ))
                })?;
                (other.clone(), Some(body))
            }
            _ => (Method::GET, None),
        };

        let mut headers = request.headers().clone();
        if body.is_none() {
            headers.remove(CONTENT_LENGTH);
            headers.remove(CONTENT_TYPE);
            headers.remove(TRANSFER_ENCODING);
        }
        let mut redirect = Request::new(body.unwrap_or_else(Body::empty));
        *redirect.method_mut() = method;
        *redirect.uri_mut() = uri;
        *redirect.version_mut() = request.version();
        *redirect.headers_mut() = headers;
        *redirect.extensions_mut() = request.extensions().clone();
        Ok(redirect)
    }
}

/// Drops credentials copied from the previous request when a redirect
/// leaves its host.
pub(crate) fn remove_sensitive_headers(headers: &mut HeaderMap, next: &Url, previous: &Url) {
    let cross_host = next.host_str() != previous.host_str()
        || next.port_or_known_default() != previous.port_or_known_default();
    if cross_host {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
        headers.remove("cookie2");
        headers.remove(PROXY_AUTHORIZATION);
        headers.remove(WWW_AUTHENTICATE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestConfig;

    fn request(method: Method, uri: &str) -> Request<Body> {
        let mut req = Request::new(Body::from("payload"));
        *req.method_mut() = method;
        *req.uri_mut() = uri.parse().unwrap();
        req
    }

    fn redirect(status: StatusCode, location: Option<&str>) -> Response<Body> {
        let mut res = Response::new(Body::empty());
        *res.status_mut() = status;
        if let Some(location) = location {
            res.headers_mut()
                .insert(LOCATION, location.parse().unwrap());
        }
        res
    }

    #[test]
    fn redirected_statuses() {
        let strategy = DefaultRedirectStrategy::new();
        let ctx = ClientContext::new();
        let get = request(Method::GET, "http://a/");
        let post = request(Method::POST, "http://a/");

        let found = redirect(StatusCode::FOUND, Some("/b"));
        assert!(strategy.is_redirected(&get, &found, &ctx));
        assert!(!strategy.is_redirected(&post, &found, &ctx));
        assert!(!strategy.is_redirected(&get, &redirect(StatusCode::FOUND, None), &ctx));

        for status in [
            StatusCode::MOVED_PERMANENTLY,
            StatusCode::TEMPORARY_REDIRECT,
            StatusCode::PERMANENT_REDIRECT,
        ] {
            assert!(strategy.is_redirected(&get, &redirect(status, None), &ctx));
            assert!(!strategy.is_redirected(&post, &redirect(status, None), &ctx));
        }

        let see_other = redirect(StatusCode::SEE_OTHER, Some("/b"));
        assert!(strategy.is_redirected(&post, &see_other, &ctx));
        assert!(!strategy.is_redirected(&get, &redirect(StatusCode::OK, Some("/b")), &ctx));
    }

    #[test]
    fn lax_follows_post() {
        let strategy = DefaultRedirectStrategy::lax();
        let ctx = ClientContext::new();
        let post = request(Method::POST, "http://a/");
        let found = redirect(StatusCode::FOUND, Some("/b"));
        assert!(strategy.is_redirected(&post, &found, &ctx));
        let put = request(Method::PUT, "http://a/");
        assert!(!strategy.is_redirected(&put, &found, &ctx));
    }

    #[test]
    fn see_other_becomes_get() {
        let strategy = DefaultRedirectStrategy::new();
        let mut ctx = ClientContext::new();
        let mut post = request(Method::POST, "http://a/form");
        post.headers_mut()
            .insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        let res = redirect(StatusCode::SEE_OTHER, Some("/done"));
        let next = strategy.get_redirect(&post, &res, &mut ctx).unwrap();
        assert_eq!(next.method(), Method::GET);
        assert_eq!(next.uri(), "http://a/done");
        assert!(next.body().is_empty());
        assert!(next.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(ctx.redirect_locations().len(), 1);
    }

    #[test]
    fn temporary_redirect_keeps_method_and_body() {
        let strategy = DefaultRedirectStrategy::lax();
        let mut ctx = ClientContext::new();
        let post = request(Method::POST, "http://a/form");
        let res = redirect(StatusCode::TEMPORARY_REDIRECT, Some("http://b/form"));
        let next = strategy.get_redirect(&post, &res, &mut ctx).unwrap();
        assert_eq!(next.method(), Method::POST);
        assert_eq!(next.body().as_bytes(), Some(&b"payload"[..]));
    }

    #[test]
    fn temporary_redirect_of_streaming_body() {
        let strategy = DefaultRedirectStrategy::lax();
        let mut ctx = ClientContext::new();
        let mut post = request(Method::POST, "http://a/form");
        *post.body_mut() = Body::wrap_stream(futures_util::stream::iter(vec![Ok::<_, std::io::Error>(
            bytes::Bytes::from_static(b"x"),
        )]));
        let res = redirect(StatusCode::TEMPORARY_REDIRECT, Some("/other"));
        let err = strategy.get_redirect(&post, &res, &mut ctx).unwrap_err();
        assert!(err.is_non_repeatable());
    }

    #[test]
    fn location_errors() {
        let strategy = DefaultRedirectStrategy::new();
        let get = request(Method::GET, "http://a/");

        let mut ctx = ClientContext::new();
        let err = strategy
            .get_redirect(&get, &redirect(StatusCode::MOVED_PERMANENTLY, None), &mut ctx)
            .unwrap_err();
        assert!(err.is_redirect());

        ctx.set_request_config(
            RequestConfig::builder()
                .relative_redirects_allowed(false)
                .build(),
        );
        let err = strategy
            .get_redirect(&get, &redirect(StatusCode::FOUND, Some("/b")), &mut ctx)
            .unwrap_err();
        assert!(err.is_redirect());

        let mut ctx = ClientContext::new();
        let err = strategy
            .get_redirect(&get, &redirect(StatusCode::FOUND, Some("http://[::1")), &mut ctx)
            .unwrap_err();
        assert!(err.is_redirect());
    }

    #[test]
    fn circular_redirect() {
        let strategy = DefaultRedirectStrategy::new();
        let mut ctx = ClientContext::new();
        let get = request(Method::GET, "http://a/");
        let res = redirect(StatusCode::FOUND, Some("http://a/b"));
        strategy.get_redirect(&get, &res, &mut ctx).unwrap();
        let err = strategy.get_redirect(&get, &res, &mut ctx).unwrap_err();
        assert!(err.is_redirect());
        assert_eq!(err.url().map(Url::as_str), Some("http://a/b"));

        let mut ctx = ClientContext::new();
        ctx.set_request_config(
            RequestConfig::builder()
                .circular_redirects_allowed(true)
                .build(),
        );
        strategy.get_redirect(&get, &res, &mut ctx).unwrap();
        strategy.get_redirect(&get, &res, &mut ctx).unwrap();
    }

    #[test]
    fn test_remove_sensitive_headers() {
        use http::header::{HeaderValue, ACCEPT};

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("let me in"));
        headers.insert(COOKIE, HeaderValue::from_static("foo=bar"));

        let next = Url::parse("http://initial-domain.com/path").unwrap();
        let prev = Url::parse("http://initial-domain.com/new_path").unwrap();

        let mut filtered_headers = headers.clone();

        remove_sensitive_headers(&mut headers, &next, &prev);
        assert_eq!(headers, filtered_headers);

        let prev = Url::parse("http://new-domain.com/path").unwrap();
        filtered_headers.remove(AUTHORIZATION);
        filtered_headers.remove(COOKIE);

        remove_sensitive_headers(&mut headers, &next, &prev);
        assert_eq!(headers, filtered_headers);
    }
}
