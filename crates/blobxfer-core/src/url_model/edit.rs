//! In-place URL edits used when building and redirecting requests.

use url::Url;

/// Returns a copy of `url` with its host replaced by `host`. `host` may carry a
/// port (`name:port`). The original URL is left unchanged.
pub fn set_url_host(url: &Url, host: &str) -> Result<Url, url::ParseError> {
    let mut out = url.clone();
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (name, port.parse::<u16>().ok())
        }
        _ => (host, None),
    };
    out.set_host(Some(name))?;
    if port.is_some() {
        // Only fails for cannot-be-a-base URLs, which set_host already rejected.
        let _ = out.set_port(port);
    }
    Ok(out)
}

/// Sets query parameter `name` to `value`, replacing an existing one. With
/// `value == None` the parameter is removed. Other parameters (e.g. a SAS
/// token) keep their order.
pub fn set_url_parameter(url: &Url, name: &str, value: Option<&str>) -> Url {
    let mut out = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    out.set_query(None);
    if kept.is_empty() && value.is_none() {
        return out;
    }
    {
        let mut pairs = out.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        if let Some(v) = value {
            pairs.append_pair(name, v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn set_host_keeps_path_and_query() {
        let orig = u("https://acct.blob.core.windows.net/c/b?sv=1&sig=abc");
        let moved = set_url_host(&orig, "acct-secondary.blob.core.windows.net").unwrap();
        assert_eq!(
            moved.as_str(),
            "https://acct-secondary.blob.core.windows.net/c/b?sv=1&sig=abc"
        );
        assert_eq!(orig.host_str(), Some("acct.blob.core.windows.net"));
    }

    #[test]
    fn set_host_with_port() {
        let orig = u("http://127.0.0.1:10000/devstore/c/b");
        let moved = set_url_host(&orig, "127.0.0.1:10001").unwrap();
        assert_eq!(moved.as_str(), "http://127.0.0.1:10001/devstore/c/b");
    }

    #[test]
    fn set_parameter_replaces_and_removes() {
        let base = u("https://h/c/b?sv=1&comp=old");
        let set = set_url_parameter(&base, "comp", Some("block"));
        assert_eq!(set.as_str(), "https://h/c/b?sv=1&comp=block");
        let removed = set_url_parameter(&set, "comp", None);
        assert_eq!(removed.as_str(), "https://h/c/b?sv=1");
        let none = set_url_parameter(&u("https://h/c/b?comp=x"), "comp", None);
        assert_eq!(none.as_str(), "https://h/c/b");
    }

    #[test]
    fn set_parameter_encodes_base64_value() {
        let url = set_url_parameter(&u("https://h/c/b"), "blockid", Some("MDAwMDA="));
        assert_eq!(url.as_str(), "https://h/c/b?blockid=MDAwMDA%3D");
        let back: Vec<_> = url.query_pairs().collect();
        assert_eq!(back[0].1, "MDAwMDA=");
    }
}
