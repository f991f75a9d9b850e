//! Codec registry: encoder descriptors, preference order, and the
//! startup probe that filters both against the installed encoders.
//!
//! A descriptor maps an internal `key` to the encoder fragment of a
//! pipeline description and to the wire identifier exchanged with the
//! client (a WebCodecs codec string). The registry is built once at
//! process start — the builtin table plus any operator-supplied
//! entries — and is immutable afterwards.

use crate::engine::EncoderEngine;
use crate::error::CastError;

/// The always-available fallback codec used when negotiation finds no
/// overlap with the client's offer.
pub const DEFAULT_CODEC: &str = "mjpeg";

// ── CodecDescriptor ──────────────────────────────────────────────

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    /// Internal selector, unique within the registry.
    pub key: String,
    /// Encoder fragment of the pipeline description. The first word
    /// names the encoder element and is what the probe checks for.
    pub pipeline_spec: String,
    /// Identifier exchanged with the client; must match a decoder the
    /// client understands.
    pub wire_id: String,
}

impl CodecDescriptor {
    pub fn new(
        key: impl Into<String>,
        pipeline_spec: impl Into<String>,
        wire_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            pipeline_spec: pipeline_spec.into(),
            wire_id: wire_id.into(),
        }
    }

    /// The encoder element the probe must find installed.
    pub fn plugin(&self) -> &str {
        self.pipeline_spec
            .split_whitespace()
            .next()
            .unwrap_or_default()
    }
}

// ── CodecRegistry ────────────────────────────────────────────────

/// Immutable table of codec descriptors plus the global preference
/// order used as the negotiation tie-break.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    entries: Vec<CodecDescriptor>,
    preference: Vec<String>,
}

impl CodecRegistry {
    /// The builtin encoder table, most-preferred hardware encoders
    /// first, with the software and image-sequence fallbacks behind.
    pub fn builtin() -> Self {
        let entries = vec![
            CodecDescriptor::new(
                "vah265",
                "vah265enc target-usage=7 rate-control=cbr bitrate=18000 key-int-max=1 ! \
                 h265parse config-interval=1 ! \
                 video/x-h265,stream-format=byte-stream,alignment=au",
                "hev1.1.6.L93.B0",
            ),
            CodecDescriptor::new(
                "vah264",
                "vah264enc target-usage=7 rate-control=cbr cabac=false bitrate=18000 key-int-max=1 ! \
                 h264parse config-interval=1 ! \
                 video/x-h264,stream-format=byte-stream,alignment=au",
                "avc1.42001E",
            ),
            CodecDescriptor::new(
                "vaapih264",
                "vaapih264enc rate-control=cbr bitrate=8000 ! \
                 h264parse config-interval=1 ! \
                 video/x-h264,stream-format=byte-stream,alignment=au",
                "avc1.42001E",
            ),
            CodecDescriptor::new(
                "nvh264",
                "nvh264enc bitrate=20000 ! \
                 h264parse config-interval=1 ! \
                 video/x-h264,stream-format=byte-stream,alignment=au",
                "avc1.42001E",
            ),
            CodecDescriptor::new(
                "x264",
                "x264enc tune=zerolatency speed-preset=ultrafast bitrate=18000 key-int-max=1 ! \
                 h264parse config-interval=1 ! \
                 video/x-h264,profile=baseline,stream-format=byte-stream,alignment=au",
                "avc1.42001E",
            ),
            CodecDescriptor::new(
                "vp8",
                "vp8enc deadline=1 cpu-used=8 keyframe-max-dist=5 target-bitrate=2000000 ! \
                 video/x-vp8,stream-format=byte-stream,alignment=au",
                "vp8",
            ),
            CodecDescriptor::new(
                "mjpeg",
                "jpegenc idct-method=float quality=40 ! image/jpeg",
                "mjpeg",
            ),
            CodecDescriptor::new(
                "vp9",
                "vp9enc deadline=1 keyframe-max-dist=5 target-bitrate=2000000 ! \
                 video/x-vp9,stream-format=byte-stream,alignment=au",
                "vp09.00.10.08",
            ),
            CodecDescriptor::new(
                "x265",
                "x265enc tune=zerolatency speed-preset=ultrafast key-int-max=1 bitrate=15000 ! \
                 h265parse config-interval=1 ! \
                 video/x-h265,profile=main,stream-format=byte-stream,alignment=au",
                "hev1.1.6.L93.B0",
            ),
        ];
        let preference = [
            "vah265", "vah264", "vaapih264", "nvh264", "x264", "mjpeg", "x265", "vp8", "vp9",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            entries,
            preference,
        }
    }

    /// Build a registry from explicit entries and a preference order.
    ///
    /// Every key in the preference order must name an entry.
    pub fn new(
        entries: Vec<CodecDescriptor>,
        preference: Vec<String>,
    ) -> Result<Self, CastError> {
        let registry = Self {
            entries,
            preference,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Add operator-supplied entries (replacing builtin ones with the
    /// same key) and optionally override the preference order.
    pub fn extend(
        mut self,
        extra: Vec<CodecDescriptor>,
        preference: Option<Vec<String>>,
    ) -> Result<Self, CastError> {
        for desc in extra {
            match self.entries.iter_mut().find(|e| e.key == desc.key) {
                Some(existing) => *existing = desc,
                None => self.entries.push(desc),
            }
        }
        if let Some(order) = preference {
            self.preference = order;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), CastError> {
        for key in &self.preference {
            if self.get(key).is_none() {
                return Err(CastError::UnknownCodec(key.clone()));
            }
        }
        Ok(())
    }

    /// Look up a descriptor by key.
    pub fn get(&self, key: &str) -> Option<&CodecDescriptor> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// The wire identifier for `key`, if registered.
    pub fn wire_id(&self, key: &str) -> Option<&str> {
        self.get(key).map(|e| e.wire_id.as_str())
    }

    /// All registered descriptors.
    pub fn entries(&self) -> &[CodecDescriptor] {
        &self.entries
    }

    /// Probe which encoders are actually installed.
    ///
    /// Fails with [`CastError::NoCodecsAvailable`] when the filtered
    /// set is empty — the process cannot start without at least one
    /// usable codec.
    pub fn probe_available(
        &self,
        engine: &dyn EncoderEngine,
    ) -> Result<AvailableCodecSet, CastError> {
        let mut installed = Vec::new();
        for desc in &self.entries {
            if engine.has_plugin(desc.plugin()) {
                installed.push(desc.key.clone());
            } else {
                tracing::warn!(
                    codec = %desc.key,
                    plugin = %desc.plugin(),
                    "encoder skipped: plugin not found"
                );
            }
        }
        if installed.is_empty() {
            return Err(CastError::NoCodecsAvailable);
        }

        // Preference order filtered to installed, then any remaining
        // installed codecs in registry order.
        let mut order: Vec<String> = self
            .preference
            .iter()
            .filter(|k| installed.contains(k))
            .cloned()
            .collect();
        for key in &installed {
            if !order.contains(key) {
                order.push(key.clone());
            }
        }

        Ok(AvailableCodecSet { order })
    }
}

// ── AvailableCodecSet ────────────────────────────────────────────

/// The preference-ordered set of usable codecs, computed once at
/// startup and immutable afterwards. Never empty.
#[derive(Debug, Clone)]
pub struct AvailableCodecSet {
    order: Vec<String>,
}

impl AvailableCodecSet {
    /// The filtered preference order driving negotiation fallback.
    pub fn preferred_order(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(order: &[&str]) -> Self {
        Self {
            order: order.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EncoderEngine, PipelineHandle};
    use crate::frame::SampleSink;
    use async_trait::async_trait;

    /// Engine stub that knows a fixed set of plugins.
    struct ProbeOnly(Vec<&'static str>);

    #[async_trait]
    impl EncoderEngine for ProbeOnly {
        fn has_plugin(&self, plugin: &str) -> bool {
            self.0.contains(&plugin)
        }

        async fn build(
            &self,
            _description: &str,
            _sink: SampleSink,
        ) -> Result<Box<dyn PipelineHandle>, CastError> {
            unreachable!("probe-only stub")
        }
    }

    #[test]
    fn builtin_preference_keys_all_registered() {
        let registry = CodecRegistry::builtin();
        assert!(registry.validate().is_ok());
        assert!(registry.get(DEFAULT_CODEC).is_some());
    }

    #[test]
    fn plugin_is_first_word_of_spec() {
        let registry = CodecRegistry::builtin();
        assert_eq!(registry.get("x264").unwrap().plugin(), "x264enc");
        assert_eq!(registry.get("mjpeg").unwrap().plugin(), "jpegenc");
    }

    #[test]
    fn probe_filters_and_preserves_preference() {
        let registry = CodecRegistry::builtin();
        let engine = ProbeOnly(vec!["x264enc", "jpegenc", "vp8enc"]);

        let available = registry.probe_available(&engine).unwrap();
        assert_eq!(available.preferred_order(), &["x264", "mjpeg", "vp8"]);
    }

    #[test]
    fn probe_with_nothing_installed_is_fatal() {
        let registry = CodecRegistry::builtin();
        let engine = ProbeOnly(vec![]);
        assert!(matches!(
            registry.probe_available(&engine),
            Err(CastError::NoCodecsAvailable)
        ));
    }

    #[test]
    fn probe_appends_installed_codecs_missing_from_preference() {
        let registry = CodecRegistry::new(
            vec![
                CodecDescriptor::new("a", "aenc ! caps", "wire-a"),
                CodecDescriptor::new("b", "benc ! caps", "wire-b"),
            ],
            vec!["a".into()],
        )
        .unwrap();
        let engine = ProbeOnly(vec!["aenc", "benc"]);

        let available = registry.probe_available(&engine).unwrap();
        assert_eq!(available.preferred_order(), &["a", "b"]);
    }

    #[test]
    fn preference_with_unknown_key_rejected() {
        let result = CodecRegistry::new(
            vec![CodecDescriptor::new("a", "aenc", "wire-a")],
            vec!["a".into(), "ghost".into()],
        );
        assert!(matches!(result, Err(CastError::UnknownCodec(k)) if k == "ghost"));
    }

    #[test]
    fn extend_replaces_and_appends() {
        let registry = CodecRegistry::builtin()
            .extend(
                vec![
                    CodecDescriptor::new("mjpeg", "jpegenc quality=80 ! image/jpeg", "mjpeg"),
                    CodecDescriptor::new("av1", "svtav1enc ! video/x-av1", "av01.0.04M.08"),
                ],
                Some(vec!["av1".into(), "mjpeg".into()]),
            )
            .unwrap();

        assert!(registry.get("mjpeg").unwrap().pipeline_spec.contains("quality=80"));
        assert_eq!(registry.wire_id("av1"), Some("av01.0.04M.08"));
        assert_eq!(registry.preference, vec!["av1", "mjpeg"]);
    }
}
