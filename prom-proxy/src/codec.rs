//! Wire codec for remote-read bodies: protobuf framed in raw snappy blocks.

use prost::Message;

use crate::error::{Error, Result};
use crate::proto::{ReadRequest, ReadResponse};

/// Content type of remote-read request and response bodies.
pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";

/// Content encoding of remote-read request and response bodies.
pub const CONTENT_ENCODING_SNAPPY: &str = "snappy";

/// Decompress and decode a remote-read request body.
pub fn decode_read_request(body: &[u8]) -> Result<ReadRequest> {
    let raw = snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| Error::InvalidInput(format!("failed snappy decode: {}", e)))?;
    Ok(ReadRequest::decode(raw.as_slice())?)
}

/// Encode and compress a remote-read response body.
pub fn encode_read_response(response: &ReadResponse) -> Result<Vec<u8>> {
    let raw = response.encode_to_vec();
    snap::raw::Encoder::new()
        .compress_vec(&raw)
        .map_err(|e| Error::Encoding(format!("failed snappy encode: {}", e)))
}
