//! Detection server: receives JPEG frames over TCP, runs MoveNet MultiPose,
//! assigns stable person ids and returns the people list for each frame.
//!
//! The spawn gate never runs here; this process is purely the
//! "estimatePoses" side of the request/response boundary. One frame in,
//! one people list out, in order.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;
use serde::Deserialize;
use tokio::net::TcpListener;

use hana_tracker::pose::{preprocess_for_multipose, MoveNetDetector, TrackAssigner};
use hana_tracker::protocol::{self, ClientMessage, ServerMessage};

const CONFIG_PATH: &str = "detection_server.toml";

// ---------------------------------------------------------------------------
// Config (reads detection_server.toml)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    #[serde(default = "default_model_path")]
    model_path: String,
    #[serde(default = "default_min_pose_score")]
    min_pose_score: f32,
    #[serde(default = "default_min_keypoint_score")]
    min_keypoint_score: f32,
    #[serde(default = "default_track_max_distance")]
    track_max_distance: f32,
    #[serde(default = "default_track_max_age")]
    track_max_age: u32,
    #[serde(default)]
    verbose: bool,
}

fn default_listen_addr() -> String { "0.0.0.0:9400".to_string() }
fn default_model_path() -> String { "models/movenet_multipose.onnx".to_string() }
fn default_min_pose_score() -> f32 { 0.3 }
fn default_min_keypoint_score() -> f32 { 0.3 }
fn default_track_max_distance() -> f32 { 64.0 }
fn default_track_max_age() -> u32 { 30 }

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            model_path: default_model_path(),
            min_pose_score: default_min_pose_score(),
            min_keypoint_score: default_min_keypoint_score(),
            track_max_distance: default_track_max_distance(),
            track_max_age: default_track_max_age(),
            verbose: false,
        }
    }
}

fn load_config() -> Config {
    match std::fs::read_to_string(CONFIG_PATH) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            eprintln!("[config] {} is invalid ({}), using defaults", CONFIG_PATH, e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

type LogFile = Arc<Mutex<std::io::BufWriter<std::fs::File>>>;

fn open_log_file() -> Result<LogFile> {
    std::fs::create_dir_all("logs")?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = format!("logs/detection_{}.log", ts);
    let file = std::fs::File::create(&path)?;
    eprintln!("Log: {}", path);
    Ok(Arc::new(Mutex::new(std::io::BufWriter::new(file))))
}

macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Ok(mut f) = $logfile.lock() {
            let _ = writeln!(f, "{}", msg);
            let _ = f.flush();
        }
    }};
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = load_config();
    let logfile = open_log_file()?;

    log!(logfile, "Detection Server ({})", env!("GIT_VERSION"));
    log!(logfile, "Model: {}", config.model_path);
    log!(logfile, "Listening on {}", config.listen_addr);

    let mut detector = MoveNetDetector::new(&config.model_path, config.min_pose_score)
        .context("model load failed")?;
    log!(logfile, "Model loaded");

    let listener = TcpListener::bind(&config.listen_addr).await?;

    // 1クライアントずつ順番に処理する。インスタレーションは常に1台
    loop {
        let (socket, peer) = listener.accept().await?;
        log!(logfile, "[conn] {} connected", peer);
        let mut stream = protocol::message_stream(socket);
        let mut assigner = TrackAssigner::new(config.track_max_distance, config.track_max_age);

        if let Err(e) = protocol::send_message(&mut stream, &ServerMessage::Ready).await {
            log!(logfile, "[conn] handshake failed: {}", e);
            continue;
        }

        loop {
            let msg: ClientMessage = match protocol::recv_message(&mut stream).await {
                Ok(m) => m,
                Err(e) => {
                    log!(logfile, "[conn] {} closed: {}", peer, e);
                    break;
                }
            };

            let ClientMessage::Frame {
                timestamp_us,
                width,
                height,
                jpeg_data,
            } = msg;

            let t0 = Instant::now();
            let people = match run_inference(
                &mut detector,
                &mut assigner,
                &jpeg_data,
                width as f32,
                height as f32,
                config.min_keypoint_score,
            ) {
                Ok(p) => p,
                Err(e) => {
                    log!(logfile, "[infer] frame {} failed: {}", timestamp_us, e);
                    Vec::new()
                }
            };

            if config.verbose {
                log!(
                    logfile,
                    "[infer] frame {}: {} people in {:.1}ms",
                    timestamp_us,
                    people.len(),
                    t0.elapsed().as_secs_f32() * 1000.0
                );
            }

            let reply = ServerMessage::People {
                timestamp_us,
                people,
            };
            if let Err(e) = protocol::send_message(&mut stream, &reply).await {
                log!(logfile, "[conn] send failed: {}", e);
                break;
            }
        }
    }
}

fn run_inference(
    detector: &mut MoveNetDetector,
    assigner: &mut TrackAssigner,
    jpeg_data: &[u8],
    width: f32,
    height: f32,
    min_keypoint_score: f32,
) -> Result<Vec<hana_tracker::pose::Person>> {
    let buf = Mat::from_slice(jpeg_data)?;
    let frame = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)?;
    if frame.empty() {
        anyhow::bail!("JPEG decode produced an empty frame");
    }

    let input = preprocess_for_multipose(&frame)?;
    let mut people = detector.detect(input, width, height)?;
    assigner.assign(&mut people, min_keypoint_score);
    Ok(people)
}
