//! REST implementation of `BlockBlobOperations`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use url::Url;

use crate::error::{TransferError, TransferResult};
use crate::http::{HttpRequest, HttpResponse, HttpSender, Method};
use crate::retry::{RetryOptions, RetryPolicy};
use crate::transport::CurlSender;
use crate::url_model::set_url_parameter;

use super::parse::{error_code, parse_content_headers, parse_properties, parse_response};
use super::{
    BlobProperties, BlobResponse, BlobWriteOptions, BlockBlobOperations, ByteRange,
    DownloadResponse,
};

/// REST API version sent with every request.
pub const SERVICE_VERSION: &str = "2018-03-28";

/// Size of the pieces a downloaded body is split into.
const BODY_PIECE: usize = 64 * 1024;

/// Client for one block blob. `url` may carry a SAS query string; it is kept
/// as-is on every request.
#[derive(Clone)]
pub struct BlockBlobClient {
    url: Url,
    sender: Arc<dyn HttpSender>,
}

impl std::fmt::Debug for BlockBlobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockBlobClient")
            .field("url", &self.url.path())
            .finish_non_exhaustive()
    }
}

impl BlockBlobClient {
    pub fn new(url: Url, sender: Arc<dyn HttpSender>) -> Self {
        Self { url, sender }
    }

    /// Client over curl, with every request going through `RetryPolicy`.
    pub fn with_retry(url: Url, options: RetryOptions) -> Self {
        let options = options.normalized();
        let transport = CurlSender::with_timeout(options.try_timeout);
        Self::new(url, Arc::new(RetryPolicy::new(transport, options)))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request(&self, method: Method, url: Url) -> HttpRequest {
        HttpRequest::new(method, url).with_header("x-ms-version", SERVICE_VERSION)
    }

    /// Sends `request`; any non-2xx response becomes `TransferError::Service`.
    async fn execute(&self, request: HttpRequest) -> TransferResult<HttpResponse> {
        let resp = self.sender.send(request).await?;
        if !resp.is_success() {
            return Err(TransferError::Service {
                status: resp.status,
                error_code: error_code(&resp),
            });
        }
        Ok(resp)
    }
}

fn with_write_options(mut req: HttpRequest, options: &BlobWriteOptions, prefix: &str) -> HttpRequest {
    let h = &options.headers;
    let fields = [
        ("content-type", &h.content_type),
        ("content-encoding", &h.content_encoding),
        ("content-language", &h.content_language),
        ("content-disposition", &h.content_disposition),
        ("cache-control", &h.cache_control),
        ("content-md5", &h.content_md5),
    ];
    for (name, value) in fields {
        if let Some(v) = value {
            req = req.with_header(format!("{prefix}{name}"), v.clone());
        }
    }
    for (k, v) in &options.metadata {
        req = req.with_header(format!("x-ms-meta-{k}"), v.clone());
    }
    req
}

/// `<BlockList>` body listing every id as `Latest`.
pub(crate) fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

/// Splits a received body into pieces, mirroring a streamed read.
fn body_pieces(mut body: Bytes) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(body.len() / BODY_PIECE + 1);
    while !body.is_empty() {
        let n = body.len().min(BODY_PIECE);
        pieces.push(body.split_to(n));
    }
    pieces
}

#[async_trait]
impl BlockBlobOperations for BlockBlobClient {
    async fn upload(&self, data: Bytes, options: &BlobWriteOptions) -> TransferResult<BlobResponse> {
        let len = data.len();
        let req = self
            .request(Method::Put, self.url.clone())
            .with_header("x-ms-blob-type", "BlockBlob")
            .with_body(data);
        let req = with_write_options(req, options, "x-ms-blob-");
        let resp = self.execute(req).await?;
        tracing::debug!(len, "put blob");
        Ok(parse_response(&resp))
    }

    async fn stage_block(&self, block_id: &str, data: Bytes) -> TransferResult<BlobResponse> {
        let url = set_url_parameter(&self.url, "comp", Some("block"));
        let url = set_url_parameter(&url, "blockid", Some(block_id));
        let len = data.len();
        let resp = self.execute(self.request(Method::Put, url).with_body(data)).await?;
        tracing::debug!(block_id, len, "put block");
        Ok(parse_response(&resp))
    }

    async fn commit_block_list(
        &self,
        block_ids: &[String],
        options: &BlobWriteOptions,
    ) -> TransferResult<BlobResponse> {
        let url = set_url_parameter(&self.url, "comp", Some("blocklist"));
        let req = self
            .request(Method::Put, url)
            .with_header("content-type", "application/xml")
            .with_body(Bytes::from(block_list_xml(block_ids)));
        let req = with_write_options(req, options, "x-ms-blob-");
        let resp = self.execute(req).await?;
        tracing::debug!(blocks = block_ids.len(), "put block list");
        Ok(parse_response(&resp))
    }

    async fn download(&self, range: ByteRange) -> TransferResult<DownloadResponse> {
        let mut req = self.request(Method::Get, self.url.clone());
        if let Some(value) = range.header_value() {
            req = req.with_header("x-ms-range", value);
        }
        let resp = self.execute(req).await?;
        let mut properties = parse_content_headers(&resp);
        // The size of a ranged body is what actually arrived.
        properties.content_length = resp.body.len() as u64;
        let pieces = body_pieces(resp.body);
        Ok(DownloadResponse {
            properties,
            body: stream::iter(pieces.into_iter().map(Ok)).boxed(),
        })
    }

    async fn get_properties(&self) -> TransferResult<BlobProperties> {
        let resp = self.execute(self.request(Method::Head, self.url.clone())).await?;
        parse_properties(&resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::TransportError;
    use futures::TryStreamExt;
    use std::sync::Mutex;

    /// Records requests and answers each with the same canned response.
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
        reply: HttpResponse,
    }

    #[async_trait]
    impl HttpSender for Recorder {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn client(reply: HttpResponse) -> (BlockBlobClient, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
            reply,
        });
        let url = Url::parse("https://acct.blob.example/photos/cat.jpg?sv=2018&sig=abc").unwrap();
        (BlockBlobClient::new(url, recorder.clone()), recorder)
    }

    fn last(recorder: &Recorder) -> HttpRequest {
        recorder.requests.lock().unwrap().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn upload_sets_blob_type_headers_and_metadata() {
        let (c, rec) = client(HttpResponse::new(201));
        let mut options = BlobWriteOptions::default();
        options.headers.content_type = Some("image/jpeg".to_string());
        options.metadata.insert("owner".to_string(), "ops".to_string());
        let r = c.upload(Bytes::from_static(b"hello"), &options).await.unwrap();
        assert_eq!(r.status, 201);

        let req = last(&rec);
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.header("x-ms-blob-type"), Some("BlockBlob"));
        assert_eq!(req.header("x-ms-version"), Some(SERVICE_VERSION));
        assert_eq!(req.header("x-ms-blob-content-type"), Some("image/jpeg"));
        assert_eq!(req.header("x-ms-meta-owner"), Some("ops"));
        assert_eq!(&req.body[..], b"hello");
        assert_eq!(req.url.query(), Some("sv=2018&sig=abc"));
    }

    #[tokio::test]
    async fn stage_block_adds_query_parameters() {
        let (c, rec) = client(HttpResponse::new(201));
        c.stage_block("MDAwMDA=", Bytes::from_static(b"xyz")).await.unwrap();
        let req = last(&rec);
        assert_eq!(
            req.url.query(),
            Some("sv=2018&sig=abc&comp=block&blockid=MDAwMDA%3D")
        );
        assert!(req.header("x-ms-blob-type").is_none());
    }

    #[tokio::test]
    async fn commit_sends_ordered_block_list() {
        let (c, rec) = client(HttpResponse::new(201));
        let ids = vec!["MDAwMDA=".to_string(), "MDAwMDE=".to_string()];
        c.commit_block_list(&ids, &BlobWriteOptions::default()).await.unwrap();
        let req = last(&rec);
        assert!(req.url.query().unwrap().ends_with("comp=blocklist"));
        let body = std::str::from_utf8(&req.body).unwrap();
        assert!(body.ends_with(
            "<BlockList><Latest>MDAwMDA=</Latest><Latest>MDAwMDE=</Latest></BlockList>"
        ));
    }

    #[tokio::test]
    async fn download_sends_range_and_streams_body() {
        let mut reply = HttpResponse::new(206);
        reply.body = Bytes::from(vec![9u8; BODY_PIECE + 10]);
        reply.headers.push(("ETag".to_string(), "\"e1\"".to_string()));
        let (c, rec) = client(reply);
        let resp = c.download(ByteRange::new(100, (BODY_PIECE + 10) as u64)).await.unwrap();
        assert_eq!(resp.properties.content_length, (BODY_PIECE + 10) as u64);
        assert_eq!(resp.properties.etag.as_deref(), Some("e1"));
        let pieces: Vec<Bytes> = resp.body.try_collect().await.unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[1].len(), 10);

        let req = last(&rec);
        assert_eq!(req.method, Method::Get);
        assert_eq!(
            req.header("x-ms-range").map(str::to_string),
            Some(format!("bytes=100-{}", 100 + BODY_PIECE + 9))
        );
    }

    #[tokio::test]
    async fn get_properties_uses_head() {
        let mut reply = HttpResponse::new(200);
        reply.headers.push(("Content-Length".to_string(), "777".to_string()));
        let (c, rec) = client(reply);
        let props = c.get_properties().await.unwrap();
        assert_eq!(props.content_length, 777);
        assert_eq!(last(&rec).method, Method::Head);
    }

    #[tokio::test]
    async fn open_ended_download_needs_the_blob_size() {
        let (c, rec) = client(HttpResponse::new(200));
        let c = Arc::new(c);
        let err = crate::transfer::download_to_buffer(&c, 0, None, Vec::new(), &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidResponse(_)), "{err}");
        // Only the properties request went out.
        assert_eq!(rec.requests.lock().unwrap().len(), 1);
        assert_eq!(last(&rec).method, Method::Head);
    }

    #[tokio::test]
    async fn non_success_maps_to_service_error() {
        let mut reply = HttpResponse::new(403);
        reply
            .headers
            .push(("x-ms-error-code".to_string(), "AuthenticationFailed".to_string()));
        let (c, _) = client(reply);
        let err = c.get_properties().await.unwrap_err();
        match err {
            TransferError::Service { status, error_code } => {
                assert_eq!(status, 403);
                assert_eq!(error_code.as_deref(), Some("AuthenticationFailed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_block_list_is_well_formed() {
        assert!(block_list_xml(&[]).ends_with("<BlockList></BlockList>"));
    }
}
