//! counterd - people counter daemon
//!
//! Reads frames from a video source, runs person detection on each frame,
//! tracks occupancy with debounced entry/exit edges, publishes telemetry
//! over MQTT, and forwards annotated frames to stdout as raw RGB24.
//!
//! Logs go to stderr; stdout carries only frame bytes, so the output can be
//! piped straight into ffmpeg or a streaming server.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use people_counter::{
    open_backend, CaptureConfig, CaptureSource, EngineConfig, InferenceSession, MqttPublisher,
    PipelineConfig, PipelineDriver, TelemetryConfig, UnsupportedLayerError,
};

#[derive(Parser, Debug)]
#[command(name = "counterd", version, about = "Edge people counter")]
struct Args {
    /// Path to the detection model, or a stub:// URL.
    #[arg(short = 'm', long)]
    model: String,

    /// Video file path, CAM for the default camera, or a stub:// URL.
    #[arg(short = 'i', long)]
    input: String,

    /// Target device for inference.
    #[arg(short = 'd', long, default_value = "CPU")]
    device: String,

    /// Extension library for devices missing operator support.
    #[arg(short = 'l', long = "cpu_extension")]
    cpu_extension: Option<PathBuf>,

    /// Probability threshold for detection filtering.
    #[arg(long = "prob_threshold", default_value_t = 0.5)]
    prob_threshold: f32,

    /// MQTT broker as host:port.
    #[arg(long, env = "MQTT_BROKER_ADDR", default_value = "127.0.0.1:3001")]
    mqtt_broker: String,

    /// MQTT client id.
    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "people-counter")]
    mqtt_client_id: String,

    /// MQTT keepalive in seconds.
    #[arg(long, env = "MQTT_KEEPALIVE_SECS", default_value_t = 60)]
    mqtt_keepalive_secs: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        report_failure(&err);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let backend = open_backend(&EngineConfig {
        model: args.model.clone(),
        device: args.device.clone(),
        cpu_extension: args.cpu_extension.clone(),
    })?;
    let session = InferenceSession::new(backend);

    let capture = CaptureSource::open(&CaptureConfig::for_source(&args.input))?;

    let telemetry = MqttPublisher::connect(&TelemetryConfig {
        broker_addr: args.mqtt_broker.clone(),
        client_id: args.mqtt_client_id.clone(),
        keepalive: Duration::from_secs(args.mqtt_keepalive_secs),
    })?;

    let mut driver = PipelineDriver::new(
        PipelineConfig {
            confidence_threshold: args.prob_threshold,
            ..PipelineConfig::default()
        },
        capture,
        session,
        Box::new(telemetry),
        Box::new(std::io::stdout()),
    )?;

    let cancel = driver.cancel_flag();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .context("set Ctrl-C handler")?;

    driver.run()?;
    Ok(())
}

fn report_failure(err: &anyhow::Error) {
    if let Some(layer_err) = err.downcast_ref::<UnsupportedLayerError>() {
        log::error!(
            "layers not supported by device {}: {}",
            layer_err.device,
            layer_err.layers.join(", ")
        );
        log::error!("specify an extensions library path with -l or --cpu_extension");
    } else {
        log::error!("{:#}", err);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_invocation_fills_defaults() {
        let args =
            Args::try_parse_from(["counterd", "-m", "stub://idle", "-i", "stub://people"]).unwrap();
        assert_eq!(args.device, "CPU");
        assert_eq!(args.prob_threshold, 0.5);
        assert_eq!(args.mqtt_broker, "127.0.0.1:3001");
        assert_eq!(args.mqtt_keepalive_secs, 60);
        assert!(args.cpu_extension.is_none());
    }

    #[test]
    fn long_flags_keep_their_underscored_names() {
        let args = Args::try_parse_from([
            "counterd",
            "--model",
            "model.onnx",
            "--input",
            "video.mp4",
            "--prob_threshold",
            "0.7",
            "--cpu_extension",
            "ext.so",
            "--device",
            "MYRIAD",
        ])
        .unwrap();
        assert_eq!(args.prob_threshold, 0.7);
        assert_eq!(args.cpu_extension, Some(PathBuf::from("ext.so")));
        assert_eq!(args.device, "MYRIAD");

        // The underscored spellings are the interface; kebab-case is not.
        assert!(Args::try_parse_from([
            "counterd",
            "-m",
            "m",
            "-i",
            "i",
            "--prob-threshold",
            "0.7"
        ])
        .is_err());
    }

    #[test]
    fn short_flags_match_the_classic_cli() {
        let args = Args::try_parse_from([
            "counterd", "-m", "model.xml", "-i", "CAM", "-d", "CPU", "-l", "ext.so",
        ])
        .unwrap();
        assert_eq!(args.model, "model.xml");
        assert_eq!(args.input, "CAM");
        assert_eq!(args.cpu_extension, Some(PathBuf::from("ext.so")));
    }
}
