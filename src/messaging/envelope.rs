use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::RelayError;

// ============================================================================
// Envelope Normalization
// ============================================================================
//
// Every binding hands the listener an InboundMessage: the channel, the raw
// frame as the technology delivered it, and whatever metadata it carried.
// EnvelopeCodec turns that into a canonical (event, correlation id) pair:
//
//   frame ──► text ──► flat entity | {orderCorrelationId, payload} wrapper
//   headers ─┐                                    │
//            └──────── precedence ◄───────────────┘ ──► correlation id
//
// ============================================================================

/// Metadata key (header / property / attribute / wrapper field).
pub const CORRELATION_KEY: &str = "orderCorrelationId";

/// Body of a transport message before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Bytes(Vec<u8>),
    /// A frame shape the binding could not map to text or bytes.
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub frame: Frame,
    pub headers: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, frame: Frame) -> Self {
        Self {
            channel: channel.into(),
            frame,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn correlation_header(&self) -> Option<&str> {
        self.headers.get(CORRELATION_KEY).map(String::as_str)
    }
}

/// Payload-level wrapper used by transports without message metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageWrapper<T> {
    #[serde(default)]
    pub order_correlation_id: Option<String>,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Payload is the entity itself.
    Flat,
    /// Payload is `{orderCorrelationId, payload}`.
    Wrapped,
}

/// Which source wins when both header and wrapper carry a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationPrecedence {
    HeaderFirst,
    WrapperFirst,
}

/// What to do when neither source carries a correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingCorrelation {
    Reject,
    Empty,
    Generate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub event: T,
    pub correlation_id: String,
}

#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    format: WireFormat,
    precedence: CorrelationPrecedence,
    missing: MissingCorrelation,
}

impl EnvelopeCodec {
    pub fn new(
        format: WireFormat,
        precedence: CorrelationPrecedence,
        missing: MissingCorrelation,
    ) -> Self {
        Self { format, precedence, missing }
    }

    /// Decode an event whose handler needs a correlation id.
    pub fn decode<T: DeserializeOwned>(&self, message: &InboundMessage) -> Result<Decoded<T>, RelayError> {
        let (event, wrapped_id) = self.split::<T>(message)?;
        let correlation_id = self.resolve_correlation(message, wrapped_id)?;
        Ok(Decoded { event, correlation_id })
    }

    /// Decode an event whose handler ignores correlation.
    pub fn decode_event<T: DeserializeOwned>(&self, message: &InboundMessage) -> Result<T, RelayError> {
        self.split::<T>(message).map(|(event, _)| event)
    }

    fn split<T: DeserializeOwned>(&self, message: &InboundMessage) -> Result<(T, Option<String>), RelayError> {
        let text = payload_text(message)?;
        match self.format {
            WireFormat::Flat => {
                let event = serde_json::from_str::<T>(&text)
                    .map_err(|e| RelayError::decode(&message.channel, e))?;
                Ok((event, None))
            }
            WireFormat::Wrapped => {
                let wrapper = serde_json::from_str::<MessageWrapper<T>>(&text)
                    .map_err(|e| RelayError::decode(&message.channel, e))?;
                Ok((wrapper.payload, wrapper.order_correlation_id))
            }
        }
    }

    fn resolve_correlation(
        &self,
        message: &InboundMessage,
        wrapped_id: Option<String>,
    ) -> Result<String, RelayError> {
        let header_id = message.correlation_header().map(str::to_owned);
        let resolved = match self.precedence {
            CorrelationPrecedence::HeaderFirst => header_id.or(wrapped_id),
            CorrelationPrecedence::WrapperFirst => wrapped_id.or(header_id),
        };

        match (resolved, self.missing) {
            (Some(id), _) => Ok(id),
            (None, MissingCorrelation::Empty) => Ok(String::new()),
            (None, MissingCorrelation::Generate) => Ok(Uuid::new_v4().to_string()),
            (None, MissingCorrelation::Reject) => Err(RelayError::decode(
                &message.channel,
                format!("no {} in metadata or payload wrapper", CORRELATION_KEY),
            )),
        }
    }
}

/// Text content of a frame, whatever shape the transport delivered.
pub fn payload_text(message: &InboundMessage) -> Result<Cow<'_, str>, RelayError> {
    match &message.frame {
        Frame::Text(text) => Ok(Cow::Borrowed(text.as_str())),
        Frame::Bytes(bytes) => std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|e| RelayError::decode(&message.channel, format!("payload is not UTF-8: {}", e))),
        Frame::Unsupported(kind) => Err(RelayError::UnsupportedEnvelope {
            channel: message.channel.clone(),
            kind: kind.clone(),
        }),
    }
}

/// Wrap an encoded entity for transports that cannot carry metadata.
/// Non-JSON payloads are embedded as a string.
pub fn wrap(payload: &str, correlation_id: &str) -> Result<String, RelayError> {
    let payload = serde_json::from_str::<serde_json::Value>(payload)
        .unwrap_or_else(|_| serde_json::Value::String(payload.to_owned()));
    let wrapper = MessageWrapper {
        order_correlation_id: Some(correlation_id.to_owned()),
        payload,
    };
    serde_json::to_string(&wrapper).map_err(|source| RelayError::Serialization {
        entity: "MessageWrapper",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::CancelOrderRequest;

    fn codec(format: WireFormat, precedence: CorrelationPrecedence, missing: MissingCorrelation) -> EnvelopeCodec {
        EnvelopeCodec::new(format, precedence, missing)
    }

    fn flat() -> EnvelopeCodec {
        codec(WireFormat::Flat, CorrelationPrecedence::HeaderFirst, MissingCorrelation::Reject)
    }

    #[test]
    fn test_flat_text_frame_with_header() {
        let message = InboundMessage::new("to-be-cancelled-orders", Frame::Text(r#"{"id":7}"#.into()))
            .with_header(CORRELATION_KEY, "corr-1");

        let decoded = flat().decode::<CancelOrderRequest>(&message).unwrap();
        assert_eq!(decoded.event, CancelOrderRequest { id: 7 });
        assert_eq!(decoded.correlation_id, "corr-1");
    }

    #[test]
    fn test_byte_frame_is_read_as_utf8() {
        let message = InboundMessage::new("c", Frame::Bytes(br#"{"id":8}"#.to_vec()))
            .with_header(CORRELATION_KEY, "corr-2");

        let decoded = flat().decode::<CancelOrderRequest>(&message).unwrap();
        assert_eq!(decoded.event.id, 8);
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_failure() {
        let message = InboundMessage::new("c", Frame::Bytes(vec![0xff, 0xfe]));
        let err = flat().decode_event::<CancelOrderRequest>(&message).unwrap_err();
        assert!(matches!(err, RelayError::Decode { .. }));
    }

    #[test]
    fn test_unknown_frame_shape_is_unsupported_envelope() {
        let message = InboundMessage::new("c", Frame::Unsupported("MapMessage".into()));
        let err = flat().decode_event::<CancelOrderRequest>(&message).unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedEnvelope { ref kind, .. } if kind == "MapMessage"));
    }

    #[test]
    fn test_wrapper_supplies_correlation_when_header_absent() {
        let codec = codec(WireFormat::Wrapped, CorrelationPrecedence::HeaderFirst, MissingCorrelation::Reject);
        let message = InboundMessage::new(
            "c",
            Frame::Text(r#"{"orderCorrelationId":"from-wrapper","payload":{"id":3}}"#.into()),
        );

        let decoded = codec.decode::<CancelOrderRequest>(&message).unwrap();
        assert_eq!(decoded.event.id, 3);
        assert_eq!(decoded.correlation_id, "from-wrapper");
    }

    #[test]
    fn test_precedence_decides_between_header_and_wrapper() {
        let message = InboundMessage::new(
            "c",
            Frame::Text(r#"{"orderCorrelationId":"wrapper","payload":{"id":3}}"#.into()),
        )
        .with_header(CORRELATION_KEY, "header");

        let header_first = codec(WireFormat::Wrapped, CorrelationPrecedence::HeaderFirst, MissingCorrelation::Reject);
        let wrapper_first = codec(WireFormat::Wrapped, CorrelationPrecedence::WrapperFirst, MissingCorrelation::Reject);

        assert_eq!(header_first.decode::<CancelOrderRequest>(&message).unwrap().correlation_id, "header");
        assert_eq!(wrapper_first.decode::<CancelOrderRequest>(&message).unwrap().correlation_id, "wrapper");
    }

    #[test]
    fn test_missing_correlation_policies() {
        let message = InboundMessage::new("c", Frame::Text(r#"{"id":1}"#.into()));

        let err = flat().decode::<CancelOrderRequest>(&message).unwrap_err();
        assert!(matches!(err, RelayError::Decode { .. }));

        let empty = codec(WireFormat::Flat, CorrelationPrecedence::HeaderFirst, MissingCorrelation::Empty);
        assert_eq!(empty.decode::<CancelOrderRequest>(&message).unwrap().correlation_id, "");

        let generate = codec(WireFormat::Flat, CorrelationPrecedence::HeaderFirst, MissingCorrelation::Generate);
        let generated = generate.decode::<CancelOrderRequest>(&message).unwrap().correlation_id;
        assert!(Uuid::parse_str(&generated).is_ok());
    }

    #[test]
    fn test_decode_event_ignores_missing_correlation() {
        let message = InboundMessage::new("c", Frame::Text(r#"{"id":1}"#.into()));
        assert_eq!(flat().decode_event::<CancelOrderRequest>(&message).unwrap().id, 1);
    }

    #[test]
    fn test_flat_payload_rejected_by_wrapped_codec() {
        let codec = codec(WireFormat::Wrapped, CorrelationPrecedence::HeaderFirst, MissingCorrelation::Empty);
        let message = InboundMessage::new("c", Frame::Text(r#"{"id":1}"#.into()));
        assert!(codec.decode::<CancelOrderRequest>(&message).is_err());
    }

    #[test]
    fn test_wrap_embeds_entity_as_object() {
        let wrapped = wrap(r#"{"reference":5,"status":"CANCELLED"}"#, "corr-9").unwrap();
        let value: serde_json::Value = serde_json::from_str(&wrapped).unwrap();

        assert_eq!(value["orderCorrelationId"], "corr-9");
        assert_eq!(value["payload"]["reference"], 5);
    }

    #[test]
    fn test_wrapped_payload_decodes_back_with_correlation() {
        let codec = codec(WireFormat::Wrapped, CorrelationPrecedence::HeaderFirst, MissingCorrelation::Reject);
        let body = wrap(r#"{"id":999}"#, "corr").unwrap();
        let message = InboundMessage::new("retry-failed-cancelled-orders", Frame::Bytes(body.into_bytes()));

        let decoded = codec.decode::<CancelOrderRequest>(&message).unwrap();
        assert_eq!(decoded.event, CancelOrderRequest { id: 999 });
        assert_eq!(decoded.correlation_id, "corr");
    }
}
