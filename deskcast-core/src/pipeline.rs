//! Pipeline builder: turns a codec key and a capture source into a
//! playing encoder pipeline, one at a time.
//!
//! At most one pipeline exists at any moment. A codec switch is
//! always teardown-then-build, never build-over-build, so two
//! encoders can never compete for the same capture source.

use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::{EncoderEngine, PipelineHandle};
use crate::error::CastError;
use crate::frame::SampleSink;
use crate::registry::CodecRegistry;

/// Lifecycle state of the active pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Playing,
}

struct ActivePipeline {
    codec_key: String,
    handle: Box<dyn PipelineHandle>,
    state: PipelineState,
}

/// Builds and tears down encoding pipelines for the capture source.
pub struct PipelineBuilder {
    engine: Arc<dyn EncoderEngine>,
    registry: Arc<CodecRegistry>,
    sink: SampleSink,
    active: Option<ActivePipeline>,
}

impl PipelineBuilder {
    pub fn new(
        engine: Arc<dyn EncoderEngine>,
        registry: Arc<CodecRegistry>,
        sink: SampleSink,
    ) -> Self {
        Self {
            engine,
            registry,
            sink,
            active: None,
        }
    }

    /// Codec key of the currently playing pipeline, if any.
    pub fn current_codec(&self) -> Option<&str> {
        self.active.as_ref().map(|p| p.codec_key.as_str())
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|p| p.state == PipelineState::Playing)
    }

    /// Build a pipeline for `codec_key` bound to `source_id` and set
    /// it playing. An existing pipeline is fully torn down first.
    pub async fn build(&mut self, codec_key: &str, source_id: u32) -> Result<(), CastError> {
        self.teardown().await;

        let description = self.describe(codec_key, source_id)?;
        debug!(codec = codec_key, %description, "building pipeline");

        let handle = self.engine.build(&description, self.sink.clone()).await?;
        info!(codec = codec_key, source_id, "pipeline playing");

        self.active = Some(ActivePipeline {
            codec_key: codec_key.to_string(),
            handle,
            state: PipelineState::Playing,
        });
        Ok(())
    }

    /// Stop and release the active pipeline. Idempotent.
    pub async fn teardown(&mut self) {
        if let Some(mut pipeline) = self.active.take() {
            pipeline.handle.stop().await;
            pipeline.state = PipelineState::Stopped;
            info!(codec = %pipeline.codec_key, "pipeline stopped");
        }
    }

    /// Assemble the full pipeline description for `codec_key`.
    ///
    /// Capacity-one leaky queues bracket the encoder fragment so that
    /// excess production is dropped rather than queued at any stage —
    /// freshness over completeness.
    fn describe(&self, codec_key: &str, source_id: u32) -> Result<String, CastError> {
        let descriptor = self
            .registry
            .get(codec_key)
            .ok_or_else(|| CastError::UnknownCodec(codec_key.to_string()))?;

        Ok(format!(
            "pipewiresrc path={source_id} ! \
             queue max-size-buffers=1 leaky=downstream ! \
             videorate drop-only=true ! video/x-raw,framerate=30/1 ! \
             videoconvert ! \
             {spec} ! \
             queue max-size-buffers=1 leaky=downstream",
            spec = descriptor.pipeline_spec,
        ))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::frame_slot;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Recorded engine events, shared between the fake engine and its
    /// handles so teardown/build ordering can be asserted.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Build(String),
        Stop(String),
    }

    struct FakeEngine {
        events: Arc<Mutex<Vec<Event>>>,
        fail_builds: bool,
    }

    struct FakeHandle {
        codec: String,
        events: Arc<Mutex<Vec<Event>>>,
        stopped: bool,
    }

    #[async_trait]
    impl PipelineHandle for FakeHandle {
        async fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.events
                    .lock()
                    .unwrap()
                    .push(Event::Stop(self.codec.clone()));
            }
        }
    }

    #[async_trait]
    impl EncoderEngine for FakeEngine {
        fn has_plugin(&self, _plugin: &str) -> bool {
            true
        }

        async fn build(
            &self,
            description: &str,
            _sink: SampleSink,
        ) -> Result<Box<dyn PipelineHandle>, CastError> {
            if self.fail_builds {
                return Err(CastError::PipelineBuild {
                    codec: "?".into(),
                    reason: "engine refused".into(),
                });
            }
            // Recover the codec key from the encoder element name.
            let codec = if description.contains("jpegenc") {
                "mjpeg"
            } else if description.contains("x264enc") {
                "x264"
            } else {
                "other"
            };
            self.events
                .lock()
                .unwrap()
                .push(Event::Build(codec.to_string()));
            Ok(Box::new(FakeHandle {
                codec: codec.to_string(),
                events: Arc::clone(&self.events),
                stopped: false,
            }))
        }
    }

    fn builder(fail_builds: bool) -> (PipelineBuilder, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let engine = Arc::new(FakeEngine {
            events: Arc::clone(&events),
            fail_builds,
        });
        let (sink, _slot) = frame_slot();
        let registry = Arc::new(CodecRegistry::builtin());
        (PipelineBuilder::new(engine, registry, sink), events)
    }

    #[tokio::test]
    async fn build_sets_playing() {
        let (mut b, _events) = builder(false);
        b.build("mjpeg", 42).await.unwrap();
        assert!(b.is_playing());
        assert_eq!(b.current_codec(), Some("mjpeg"));
    }

    #[tokio::test]
    async fn description_binds_source_and_leaky_queues() {
        let (b, _) = builder(false);
        let desc = b.describe("mjpeg", 42).unwrap();
        assert!(desc.starts_with("pipewiresrc path=42 !"));
        assert!(desc.contains("jpegenc"));
        assert_eq!(desc.matches("max-size-buffers=1 leaky=downstream").count(), 2);
    }

    #[tokio::test]
    async fn codec_switch_tears_down_before_building() {
        let (mut b, events) = builder(false);
        b.build("mjpeg", 1).await.unwrap();
        b.build("x264", 1).await.unwrap();

        let log = events.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                Event::Build("mjpeg".into()),
                Event::Stop("mjpeg".into()),
                Event::Build("x264".into()),
            ]
        );
        assert_eq!(b.current_codec(), Some("x264"));
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (mut b, events) = builder(false);
        b.build("mjpeg", 1).await.unwrap();
        b.teardown().await;
        b.teardown().await;

        let stops = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Stop(_)))
            .count();
        assert_eq!(stops, 1);
        assert!(!b.is_playing());
    }

    #[tokio::test]
    async fn unknown_codec_rejected_before_touching_engine() {
        let (mut b, events) = builder(false);
        assert!(matches!(
            b.build("ghost", 1).await,
            Err(CastError::UnknownCodec(_))
        ));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_build_leaves_no_active_pipeline() {
        let (mut b, _) = builder(true);
        assert!(b.build("mjpeg", 1).await.is_err());
        assert!(!b.is_playing());
        assert_eq!(b.current_codec(), None);
    }
}
