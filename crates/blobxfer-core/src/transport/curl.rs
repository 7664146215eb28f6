//! libcurl transport. Each request runs on a blocking worker thread with its
//! own `Easy` handle.

use std::str;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use curl::easy::{Easy, List};

use crate::http::{HttpRequest, HttpResponse, HttpSender, Method, TransportError};

/// Curl settings shared by every request.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Native per-transfer timeout. The retry policy also enforces its own.
    pub timeout: Option<Duration>,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurlSender {
    options: CurlOptions,
}

impl CurlSender {
    pub fn new(options: CurlOptions) -> Self {
        Self { options }
    }

    /// Transport whose native timeout matches the retry policy's per-try timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(CurlOptions {
            timeout: Some(timeout),
            ..CurlOptions::default()
        })
    }
}

#[async_trait]
impl HttpSender for CurlSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let options = self.options;
        let method = request.method;
        let path = request.url.path().to_string();
        let response = tokio::task::spawn_blocking(move || perform(&request, options))
            .await
            .map_err(|e| TransportError::Worker(e.to_string()))??;
        tracing::debug!(
            method = method.as_str(),
            path = %path,
            status = response.status,
            len = response.body.len(),
            "http response"
        );
        Ok(response)
    }
}

/// Runs one request to completion on the current thread.
fn perform(request: &HttpRequest, options: CurlOptions) -> Result<HttpResponse, TransportError> {
    let mut easy = Easy::new();
    easy.url(request.url.as_str())?;
    easy.connect_timeout(options.connect_timeout)?;
    if let Some(t) = options.timeout {
        easy.timeout(t)?;
    }

    match request.method {
        Method::Get => easy.get(true)?,
        Method::Head => easy.nobody(true)?,
        Method::Put => {
            easy.upload(true)?;
            easy.in_filesize(request.body.len() as u64)?;
        }
        Method::Post => {
            easy.post(true)?;
            easy.post_field_size(request.body.len() as u64)?;
        }
        Method::Options | Method::Delete => easy.custom_request(request.method.as_str())?,
    }

    let mut list = List::new();
    for (k, v) in &request.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if matches!(request.method, Method::Put | Method::Post) {
        // Send the body straight away instead of waiting for 100-continue.
        list.append("Expect:")?;
    }
    easy.http_headers(list)?;

    let mut header_lines: Vec<String> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    let mut upload = request.body.clone();
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                // A new status line starts a new header block (redirects, 100-continue).
                if line.starts_with("HTTP/") {
                    header_lines.clear();
                }
                header_lines.push(line.to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        if matches!(request.method, Method::Put | Method::Post) {
            transfer.read_function(|into| Ok(read_chunk(&mut upload, into)))?;
        }
        transfer.perform()?;
    }

    let status = easy.response_code()? as u16;
    Ok(HttpResponse {
        status,
        headers: parse_header_lines(&header_lines),
        body: Bytes::from(body),
    })
}

/// Copies the next piece of `remaining` into `into`, advancing it.
fn read_chunk(remaining: &mut Bytes, into: &mut [u8]) -> usize {
    let n = remaining.len().min(into.len());
    into[..n].copy_from_slice(&remaining[..n]);
    remaining.advance(n);
    n
}

/// `Name: value` pairs from raw header lines; the status line is skipped.
pub(crate) fn parse_header_lines(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with("HTTP/") {
                return None;
            }
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_header_lines_skips_status_and_blank() {
        let lines = [
            "HTTP/1.1 206 Partial Content".to_string(),
            "Content-Length: 12345".to_string(),
            "ETag: \"0x8D1\"".to_string(),
            "x-ms-error-code:   ".to_string(),
            "".to_string(),
        ];
        let headers = parse_header_lines(&lines);
        assert_eq!(
            headers,
            vec![
                ("Content-Length".to_string(), "12345".to_string()),
                ("ETag".to_string(), "\"0x8D1\"".to_string()),
                ("x-ms-error-code".to_string(), "".to_string()),
            ]
        );
    }

    #[test]
    fn read_chunk_advances_through_body() {
        let mut body = Bytes::from_static(b"abcdefg");
        let mut buf = [0u8; 3];
        assert_eq!(read_chunk(&mut body, &mut buf), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(&body[..], b"defg");
        assert_eq!(read_chunk(&mut body, &mut buf), 3);
        assert_eq!(read_chunk(&mut body, &mut buf), 1);
        assert!(body.is_empty());
        assert_eq!(buf[0], b'g');
        assert_eq!(read_chunk(&mut body, &mut buf), 0);
    }

    #[test]
    fn default_options_have_no_transfer_timeout() {
        let o = CurlOptions::default();
        assert_eq!(o.connect_timeout, Duration::from_secs(15));
        assert!(o.timeout.is_none());
        let s = CurlSender::with_timeout(Duration::from_secs(30));
        assert_eq!(s.options.timeout, Some(Duration::from_secs(30)));
    }
}
