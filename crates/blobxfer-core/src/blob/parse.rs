//! Parse blob response headers into typed results.

use crate::error::{TransferError, TransferResult};
use crate::http::HttpResponse;

use super::{BlobProperties, BlobResponse};

/// Properties from a Get Blob Properties response. The blob size comes from
/// `Content-Length`, which must be present and numeric.
pub(crate) fn parse_properties(resp: &HttpResponse) -> TransferResult<BlobProperties> {
    let raw = resp.header("content-length").ok_or_else(|| {
        TransferError::InvalidResponse("blob properties response has no Content-Length".to_string())
    })?;
    let content_length = raw.trim().parse::<u64>().map_err(|_| {
        TransferError::InvalidResponse(format!("blob properties response has Content-Length {raw:?}"))
    })?;
    Ok(BlobProperties {
        content_length,
        ..parse_content_headers(resp)
    })
}

/// Content headers of any blob response. `content_length` is left at 0 for
/// the caller to fill in.
pub(crate) fn parse_content_headers(resp: &HttpResponse) -> BlobProperties {
    let mut props = BlobProperties::default();
    for (name, value) in &resp.headers {
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-type") {
            props.content_type = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-md5") {
            props.content_md5 = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("etag") {
            props.etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            props.last_modified = Some(value.to_string());
        }
    }
    props
}

pub(crate) fn parse_response(resp: &HttpResponse) -> BlobResponse {
    BlobResponse {
        status: resp.status,
        etag: resp.header("etag").map(|v| v.trim().trim_matches('"').to_string()),
        last_modified: resp.header("last-modified").map(str::to_string),
        request_id: resp.header("x-ms-request-id").map(str::to_string),
    }
}

/// Error code the service reports for a failed request.
pub(crate) fn error_code(resp: &HttpResponse) -> Option<String> {
    resp.header("x-ms-error-code")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}
