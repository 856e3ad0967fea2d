//! `GET /stream?hash=<hex>`: bytes of the selected file, from disk when the
//! download finished or through the live transfer while it is still running.

use std::io;
use std::sync::Arc;

use async_stream::try_stream;
use axum::{
    body::{Body, Bytes},
    extract::{Query, Request, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures_util::Stream;
use jubako_swarm_core::{ContentId, TransferReader, select_playable};
use jubako_telemetry::StreamSource;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

use crate::http::constants::{STREAM_CHUNK, STREAM_CONTENT_TYPE, STREAM_READ_AHEAD};
use crate::http::errors::ApiError;
use crate::state::ApiState;

/// Query parameters accepted by the stream route.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamQuery {
    hash: Option<String>,
}

pub(crate) async fn stream(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StreamQuery>,
    request: Request,
) -> Result<Response, ApiError> {
    let content_id = parse_hash(query.hash.as_deref())?;

    if let Some(path) = state.registry.get(&content_id).await {
        state.telemetry.inc_stream_request(StreamSource::Disk);
        debug!(content_id = %content_id, path = %path.display(), "serving stream from disk");
        let response = ServeFile::new(&path)
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});
        let mut response = response.map(Body::new);
        if response.status().is_success() {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(STREAM_CONTENT_TYPE));
        }
        return Ok(response);
    }

    let Some(transfer) = state.engine.transfer(&content_id) else {
        state.telemetry.inc_stream_request(StreamSource::Missing);
        return Err(not_found());
    };

    let files = transfer.files();
    if files.is_empty() {
        state.telemetry.inc_stream_request(StreamSource::Missing);
        debug!(content_id = %content_id, "transfer has no metadata yet");
        return Err(not_found());
    }
    let Some(file) = select_playable(&files) else {
        state.telemetry.inc_stream_request(StreamSource::Empty);
        info!(content_id = %content_id, "active transfer has no playable file to stream");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let reader = transfer
        .open_reader(file.index, STREAM_READ_AHEAD)
        .map_err(|err| {
            warn!(content_id = %content_id, error = %err, "failed to open transfer reader");
            ApiError::internal("failed to open transfer reader")
        })?;
    state.telemetry.inc_stream_request(StreamSource::Network);
    debug!(content_id = %content_id, file = %file.path, "serving stream from live transfer");

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, STREAM_CONTENT_TYPE)
        .header(CONTENT_LENGTH, file.length)
        .body(Body::from_stream(reader_stream(reader)))
        .map_err(|err| {
            warn!(error = %err, "failed to build stream response");
            ApiError::internal("failed to build stream response")
        })
}

fn not_found() -> ApiError {
    ApiError::not_found("content not found; it may be queued without metadata yet")
}

fn parse_hash(raw: Option<&str>) -> Result<ContentId, ApiError> {
    let raw = raw
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing hash query parameter"))?;
    ContentId::from_hex(raw).map_err(|err| {
        debug!(hash = raw, error = %err, "rejecting malformed stream hash");
        ApiError::bad_request("hash must be a 40 character hex content identifier")
    })
}

/// Copy the reader into body chunks until it is exhausted; dropping the
/// stream drops the reader.
fn reader_stream(mut reader: TransferReader) -> impl Stream<Item = io::Result<Bytes>> + Send {
    try_stream! {
        let mut buf = vec![0_u8; STREAM_CHUNK];
        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..read]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hash_rejects_missing_and_malformed() {
        assert_eq!(
            parse_hash(None).map_err(|err| err.status).err(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            parse_hash(Some("")).map_err(|err| err.status).err(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            parse_hash(Some("xyz")).map_err(|err| err.status).err(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert!(parse_hash(Some("DD8255ECDC7CA55FB0BBF81323D87062DB1F6D1C")).is_ok());
    }

    #[tokio::test]
    async fn reader_stream_yields_all_bytes() -> anyhow::Result<()> {
        use futures_util::StreamExt;

        let reader: TransferReader = Box::new(std::io::Cursor::new(vec![7_u8; STREAM_CHUNK + 10]));
        let chunks: Vec<_> = reader_stream(reader).collect().await;
        let total: usize = chunks
            .into_iter()
            .map(|chunk| chunk.map(|bytes| bytes.len()))
            .sum::<io::Result<usize>>()?;
        assert_eq!(total, STREAM_CHUNK + 10);
        Ok(())
    }
}
