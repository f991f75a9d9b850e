//! Codec negotiation: the one-shot handshake run per connection
//! before any frame is forwarded.
//!
//! The client opens with the list of wire identifiers it can decode;
//! the server walks its filtered preference order and picks the first
//! entry whose key or wire id appears in the offer, falling back to
//! the default image-sequence codec when nothing overlaps. A codec
//! forced by the operator short-circuits the whole exchange.

use serde::{Deserialize, Serialize};

use crate::registry::{AvailableCodecSet, CodecRegistry, DEFAULT_CODEC};

// ── Control-plane messages ───────────────────────────────────────

/// First message from the client: the codecs it can decode.
#[derive(Debug, Default, Deserialize)]
pub struct ClientHello {
    #[serde(default)]
    pub codecs: Vec<String>,
}

/// Server→client control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The codec chosen by negotiation.
    Config { codec: String },
    /// Confirmation of the codec actually in effect, sent once the
    /// pipeline (re)build succeeded.
    CodecInfo { codec: String },
}

/// Parse the client's offer. Absent, malformed, or non-JSON input is
/// treated as an empty offer.
pub fn parse_offer(text: &str) -> Vec<String> {
    serde_json::from_str::<ClientHello>(text)
        .map(|hello| hello.codecs)
        .unwrap_or_default()
}

/// Pick the codec key for this connection.
///
/// A forced codec wins unconditionally; otherwise the first entry of
/// the filtered preference order matched by key or wire id, else the
/// fixed default.
pub fn choose(
    offer: &[String],
    available: &AvailableCodecSet,
    registry: &CodecRegistry,
    forced: Option<&str>,
) -> String {
    if let Some(forced) = forced {
        return forced.to_string();
    }

    for key in available.preferred_order() {
        let wire = registry.wire_id(key);
        if offer
            .iter()
            .any(|o| o == key || Some(o.as_str()) == wire)
        {
            return key.clone();
        }
    }

    DEFAULT_CODEC.to_string()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CodecRegistry {
        CodecRegistry::builtin()
    }

    fn offer(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn picks_highest_preference_overlap() {
        let available = AvailableCodecSet::for_tests(&["vah264", "x264", "mjpeg"]);
        // avc1.42001E matches vah264 first, regardless of offer order.
        let chosen = choose(
            &offer(&["mjpeg", "avc1.42001E"]),
            &available,
            &registry(),
            None,
        );
        assert_eq!(chosen, "vah264");

        let chosen = choose(
            &offer(&["avc1.42001E", "mjpeg"]),
            &available,
            &registry(),
            None,
        );
        assert_eq!(chosen, "vah264");
    }

    #[test]
    fn matches_by_internal_key_too() {
        let available = AvailableCodecSet::for_tests(&["x264", "mjpeg"]);
        let chosen = choose(&offer(&["x264"]), &available, &registry(), None);
        assert_eq!(chosen, "x264");
    }

    #[test]
    fn empty_offer_falls_back_to_default() {
        let available = AvailableCodecSet::for_tests(&["x264", "mjpeg"]);
        assert_eq!(choose(&[], &available, &registry(), None), DEFAULT_CODEC);
    }

    #[test]
    fn non_overlapping_offer_falls_back_to_default() {
        let available = AvailableCodecSet::for_tests(&["x264"]);
        let chosen = choose(
            &offer(&["av01.0.04M.08", "theora"]),
            &available,
            &registry(),
            None,
        );
        assert_eq!(chosen, DEFAULT_CODEC);
    }

    #[test]
    fn forced_codec_ignores_offer_entirely() {
        let available = AvailableCodecSet::for_tests(&["vah264", "x264", "mjpeg"]);
        let chosen = choose(
            &offer(&["avc1.42001E"]),
            &available,
            &registry(),
            Some("vp8"),
        );
        assert_eq!(chosen, "vp8");
    }

    #[test]
    fn uninstalled_preference_entries_never_chosen() {
        // h264 preferred globally but not installed; offer only names
        // its wire id.
        let available = AvailableCodecSet::for_tests(&["mjpeg"]);
        let chosen = choose(&offer(&["avc1.42001E"]), &available, &registry(), None);
        assert_eq!(chosen, "mjpeg");
    }

    #[test]
    fn parse_offer_lenient() {
        assert_eq!(
            parse_offer(r#"{"codecs":["mjpeg","vp8"]}"#),
            offer(&["mjpeg", "vp8"])
        );
        assert!(parse_offer(r#"{"codecs":[]}"#).is_empty());
        assert!(parse_offer(r#"{}"#).is_empty());
        assert!(parse_offer("not json at all").is_empty());
    }

    #[test]
    fn server_message_wire_shape() {
        let config = ServerMessage::Config {
            codec: "avc1.42001E".into(),
        };
        assert_eq!(
            serde_json::to_string(&config).unwrap(),
            r#"{"type":"config","codec":"avc1.42001E"}"#
        );

        let info = ServerMessage::CodecInfo {
            codec: "mjpeg".into(),
        };
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"type":"codec_info","codec":"mjpeg"}"#
        );
    }
}
