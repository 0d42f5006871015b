use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;

/// Read the CSRF token cookie the server set for `url`.
pub fn csrf_token(jar: &Jar, url: &Url, cookie_name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    cookie_value(header, cookie_name).map(str::to_string)
}

/// Find `name` in a `Cookie` header value (`a=1; b=2`).
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
