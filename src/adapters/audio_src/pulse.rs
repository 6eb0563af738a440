use anyhow::Context;
use gst::element_error;
use gst::prelude::*;

use crate::config::{CHANNELS, SAMPLE_RATE};
use crate::error::PipelineError;
use crate::ports::audio_src::*;

/// Microphone capture through GStreamer, converted to mono s16le at 16 kHz.
pub struct Pulse {
    element: gst::Element,
    pipeline: Option<gst::Pipeline>,
    appsink: Option<gst_app::AppSink>,
    carry: Vec<u8>,
}

fn unavailable(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::AudioDeviceUnavailable(e.to_string())
}

impl Pulse {
    pub fn list_available() -> anyhow::Result<Vec<String>> {
        gst::init()?;
        let monitor = gst::DeviceMonitor::new();
        monitor.add_filter(Some("Audio/Source"), None);
        monitor.set_show_all_devices(true);
        monitor.start().context("starting device monitor")?;
        let names = monitor
            .devices()
            .iter()
            .map(|d| d.display_name().to_string())
            .collect();
        monitor.stop();
        Ok(names)
    }

    pub fn default_device() -> Result<Self, PipelineError> {
        gst::init().map_err(unavailable)?;
        let element = gst::ElementFactory::make("autoaudiosrc")
            .build()
            .map_err(unavailable)?;
        Ok(Self::from_element(element))
    }

    pub fn from_device_name(name: &str) -> Result<Self, PipelineError> {
        gst::init().map_err(unavailable)?;
        let monitor = gst::DeviceMonitor::new();
        monitor.add_filter(Some("Audio/Source"), None);
        monitor.start().map_err(unavailable)?;
        let device = monitor
            .devices()
            .iter()
            .find(|d| d.display_name() == name)
            .cloned();
        monitor.stop();
        let device = device.ok_or_else(|| unavailable(format!("no capture device named {name:?}")))?;
        let element = device.create_element(None).map_err(unavailable)?;
        Ok(Self::from_element(element))
    }

    fn from_element(element: gst::Element) -> Self {
        Self {
            element,
            pipeline: None,
            appsink: None,
            carry: Vec::new(),
        }
    }

    fn build_pipeline(&mut self) -> anyhow::Result<gst_app::AppSink> {
        let pipeline = gst::Pipeline::new(Some("mic"));
        let convert = gst::ElementFactory::make("audioconvert").build()?;
        let resample = gst::ElementFactory::make("audioresample").build()?;

        let appsink = gst_app::AppSink::builder()
            .caps(
                &gst_audio::AudioCapsBuilder::new_interleaved()
                    .rate(SAMPLE_RATE as i32)
                    .format(gst_audio::AudioFormat::S16le)
                    .channels(CHANNELS as i32)
                    .build(),
            )
            .build();

        let chain = [&self.element, &convert, &resample, appsink.upcast_ref()];
        pipeline.add_many(&chain)?;
        gst::Element::link_many(&chain)?;

        let bus = pipeline
            .bus()
            .context("pipeline without bus")?;
        bus.set_sync_handler(|_, msg| {
            use gst::MessageView;

            match msg.view() {
                MessageView::Error(err) => {
                    log::error!("capture error: {} ({:?})", err.error(), err.debug());
                }
                MessageView::Eos(..) => log::info!("capture reached end of stream"),
                _ => (),
            }
            gst::BusSyncReply::Pass
        });

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink.clone());
        Ok(appsink)
    }

    fn play(&self) -> anyhow::Result<()> {
        if let Some(pipeline) = &self.pipeline {
            pipeline
                .set_state(gst::State::Playing)
                .context("starting capture pipeline")?;
        }
        Ok(())
    }
}

impl PushSource for Pulse {
    fn start(&mut self, mut on_audio: AudioCallback) -> anyhow::Result<()> {
        let appsink = self.build_pipeline()?;
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or_else(|| {
                        element_error!(
                            appsink,
                            gst::ResourceError::Failed,
                            ("Failed to get buffer from appsink")
                        );

                        gst::FlowError::Error
                    })?;

                    // The caps pin the layout to s16le, so the mapped bytes
                    // can go out untouched.
                    let map = buffer.map_readable().map_err(|_| {
                        element_error!(
                            appsink,
                            gst::ResourceError::Failed,
                            ("Failed to map buffer readable")
                        );

                        gst::FlowError::Error
                    })?;
                    on_audio(map.as_slice());

                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        self.play()
    }

    fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            // Null state joins the streaming thread, so no callback is in
            // flight once this returns.
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                log::warn!("stopping capture pipeline: {e}");
            }
            if let Err(e) = pipeline.remove(&self.element) {
                log::debug!("detaching capture element: {e}");
            }
        }
        if let Some(appsink) = self.appsink.take() {
            appsink.set_callbacks(gst_app::AppSinkCallbacks::builder().build());
        }
        self.carry.clear();
    }
}

impl PullSource for Pulse {
    fn drain_available(&mut self, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
        if self.appsink.is_none() {
            self.build_pipeline()?;
            self.play()?;
        }
        let Some(appsink) = self.appsink.as_ref() else {
            return Ok(Vec::new());
        };

        let mut out = std::mem::take(&mut self.carry);
        while out.len() < max_bytes {
            let Some(sample) = appsink.try_pull_sample(gst::ClockTime::ZERO) else {
                break;
            };
            let buffer = sample.buffer().context("sample without buffer")?;
            let map = buffer.map_readable().context("mapping capture buffer")?;
            out.extend_from_slice(map.as_slice());
        }
        if out.len() > max_bytes {
            self.carry = out.split_off(max_bytes);
        }
        Ok(out)
    }
}

impl Drop for Pulse {
    fn drop(&mut self) {
        PushSource::stop(self);
    }
}
