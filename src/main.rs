//! Installation runner: camera frames are analyzed for wrist positions and
//! every accepted observation spawns a flower sprite over the active
//! architecture set. Detection runs either in-process or on a remote
//! detection server; in both cases at most one request is in flight and the
//! spawn gate runs on this thread once the result is back.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;

use hana_tracker::camera::CameraFeed;
use hana_tracker::config::Config;
use hana_tracker::pose::{preprocess_for_multipose, MoveNetDetector, Person, TrackAssigner};
use hana_tracker::protocol::{self, ClientMessage, MessageStream, ServerMessage};
use hana_tracker::region::RectRegion;
use hana_tracker::render::{load_background, InstallationWindow, SpriteStage, Texture};
use hana_tracker::scene::{Attractor, OverlayController, SceneRotator, SceneTransition};
use hana_tracker::tracker::{
    map_range, FrameDispatcher, GateConfig, SpawnEvent, SpawnGate, SpawnSink, Viewport,
};

const CONFIG_PATH: &str = "config.toml";

// ---------------------------------------------------------------------------
// Detection backend (local model or remote worker)
// ---------------------------------------------------------------------------

enum PoseBackend {
    Local {
        detector: MoveNetDetector,
        assigner: TrackAssigner,
        min_keypoint_score: f32,
    },
    Remote {
        rt: tokio::runtime::Runtime,
        stream: MessageStream,
        jpeg_quality: i32,
    },
}

impl PoseBackend {
    fn new(config: &Config) -> Result<Self> {
        match config.detection.mode.as_str() {
            "local" => {
                let detector = MoveNetDetector::new(
                    &config.detection.model_path,
                    config.detection.min_pose_score,
                )?;
                let assigner = TrackAssigner::new(
                    config.detection.track_max_distance,
                    config.detection.track_max_age,
                );
                Ok(Self::Local {
                    detector,
                    assigner,
                    min_keypoint_score: config.detection.min_keypoint_score,
                })
            }
            "remote" => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                let addr = config.detection.server_addr.clone();
                let mut stream = rt.block_on(async {
                    let tcp = tokio::net::TcpStream::connect(&addr)
                        .await
                        .with_context(|| format!("failed to connect to {}", addr))?;
                    Ok::<_, anyhow::Error>(protocol::message_stream(tcp))
                })?;
                // モデルロード完了を待つ
                let msg: ServerMessage = rt.block_on(protocol::recv_message(&mut stream))?;
                match msg {
                    ServerMessage::Ready => {}
                    other => bail!("unexpected handshake message: {:?}", other),
                }
                Ok(Self::Remote {
                    rt,
                    stream,
                    jpeg_quality: config.detection.jpeg_quality,
                })
            }
            other => bail!("unknown detection mode '{}' (use local or remote)", other),
        }
    }

    /// 1 フレーム分の検出。応答が返るまで呼び出し側は進まない
    fn estimate(&mut self, frame: &Mat, source_width: f32, source_height: f32) -> Result<Vec<Person>> {
        match self {
            Self::Local {
                detector,
                assigner,
                min_keypoint_score,
            } => {
                let input = preprocess_for_multipose(frame)?;
                let mut people = detector.detect(input, source_width, source_height)?;
                assigner.assign(&mut people, *min_keypoint_score);
                Ok(people)
            }
            Self::Remote {
                rt,
                stream,
                jpeg_quality,
            } => {
                let mut jpeg = Vector::<u8>::new();
                let mut params = Vector::<i32>::new();
                params.push(imgcodecs::IMWRITE_JPEG_QUALITY);
                params.push(*jpeg_quality);
                imgcodecs::imencode(".jpg", frame, &mut jpeg, &params)?;

                let timestamp_us = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_micros() as u64;

                let request = ClientMessage::Frame {
                    timestamp_us,
                    width: source_width as u16,
                    height: source_height as u16,
                    jpeg_data: jpeg.to_vec(),
                };

                rt.block_on(async {
                    protocol::send_message(stream, &request).await?;
                    loop {
                        match protocol::recv_message::<ServerMessage>(stream).await? {
                            ServerMessage::People { people, .. } => return Ok(people),
                            ServerMessage::Ready => continue,
                        }
                    }
                })
            }
        }
    }
}

fn load_textures(paths: &[std::path::PathBuf]) -> Result<Vec<Texture>> {
    paths.iter().map(Texture::load).collect()
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);

    println!("Hana Tracker - Installation ({})", env!("GIT_VERSION"));
    println!("Detection: {} ({})", config.detection.mode, config.detection.model_path);
    println!(
        "Gate: threshold={}px, throttle={}ms, bounds_check={}",
        config.gate.movement_threshold, config.gate.throttle_ms, config.gate.bounds_check
    );
    println!(
        "Stage: {}x{}, sets={}, set_duration={}s",
        config.stage.width,
        config.stage.height,
        config.scene.sets.len(),
        config.scene.set_duration_secs
    );

    let sets = config.scene_sets();
    if sets.is_empty() {
        bail!("no scene sets configured");
    }

    let mut camera = CameraFeed::start(
        config.camera.index,
        config.camera.width,
        config.camera.height,
    )?;
    let (cam_w, cam_h) = camera.resolution();
    println!("Camera: {}x{}", cam_w, cam_h);
    let source = Viewport::new(cam_w as f32, cam_h as f32);
    let stage_viewport = config.stage_viewport();

    let mut backend = PoseBackend::new(&config)?;
    println!("Detector ready");

    let start = Instant::now();
    let mut rotator = SceneRotator::new(
        sets,
        Duration::from_secs_f64(config.scene.set_duration_secs),
        Duration::from_secs_f64(config.scene.fade_secs),
        Duration::from_secs_f64(config.scene.hold_secs),
        start,
    );
    let mut overlay = OverlayController::new(
        Duration::from_secs_f64(config.overlay.idle_secs),
        Duration::from_secs_f64(config.overlay.fade_secs),
        start,
    );
    let mut attractor = Attractor::new(
        Duration::from_secs_f64(config.attractor.interval_secs),
        source,
        start,
    );

    let gate = SpawnGate::new(
        source,
        stage_viewport,
        GateConfig {
            movement_threshold: config.gate.movement_threshold,
            throttle: Duration::from_millis(config.gate.throttle_ms),
            bounds_check: config.gate.bounds_check,
        },
    );
    let mut dispatcher = FrameDispatcher::new(
        gate,
        config.detection.min_keypoint_score,
        config.gate.jitter,
        Duration::from_secs_f64(config.gate.evict_after_secs),
    );

    let mut stage = SpriteStage::new(
        config.sprite_timing(),
        rotator.active_set().flowers.len(),
        config.sprites.min_scale,
        config.sprites.max_scale,
    );

    let mut window = InstallationWindow::new(
        "Hana Tracker",
        config.stage.width as usize,
        config.stage.height as usize,
        config.sprites.size_px,
    )?;

    let active = rotator.active_set().clone();
    let mut background = load_background(
        &active.background,
        config.stage.width as usize,
        config.stage.height as usize,
    )?;
    let mut textures = load_textures(&active.flowers)?;
    let mut region = RectRegion::new(stage_viewport, active.foreground.clone());

    let mut rng = rand::thread_rng();
    let mut last_frame_id = 0u64;

    // FPS計測
    let mut frame_count = 0u32;
    let mut spawn_count = 0usize;
    let mut fps_timer = Instant::now();

    while window.is_open() {
        let now = Instant::now();

        if rotator.tick(now) == SceneTransition::SetChanged {
            // 暗転中にステージと素材を次セットへ入れ替える
            stage.clear();
            let set = rotator.active_set().clone();
            background = load_background(
                &set.background,
                config.stage.width as usize,
                config.stage.height as usize,
            )?;
            textures = load_textures(&set.flowers)?;
            stage.set_texture_count(set.flowers.len());
            region = RectRegion::new(stage_viewport, set.foreground.clone());
            if config.verbose {
                eprintln!("[scene] switched to set {}", rotator.active_index() + 1);
            }
        }

        if rotator.is_changing() {
            // 協調的な一時停止: 描画は続け、検出とゲートはスキップ
            overlay.force_show(now);
        } else {
            let frame_id = camera.frame_id();
            if frame_id != last_frame_id {
                last_frame_id = frame_id;
                if let Some(frame) = camera.get_frame() {
                    let people =
                        backend.estimate(&frame, source.width, source.height)?;
                    overlay.update(!people.is_empty(), now);
                    spawn_count +=
                        dispatcher.dispatch(&people, &region, &mut stage, &mut rng, now)?;
                }
            }

            if let Some((sx, sy)) = attractor.poll(&mut rng, now) {
                let x = map_range(sx, 0.0, source.width, 0.0, stage_viewport.width)?;
                let y = map_range(sy, 0.0, source.height, 0.0, stage_viewport.height)?;
                stage.spawn(
                    &SpawnEvent {
                        x,
                        y,
                        temporary: false,
                    },
                    now,
                );
            }
        }

        stage.retire(now);

        let scene_opacity = rotator.opacity(now);
        window.begin_frame(Some(&background), scene_opacity);
        window.draw_stage(&stage, &textures, now, scene_opacity);
        window.draw_overlay(overlay.opacity(now));
        window.present()?;

        frame_count += 1;
        let elapsed = fps_timer.elapsed().as_secs_f32();
        if config.verbose && elapsed >= 1.0 {
            eprintln!(
                "[loop] fps={:.1} sprites={} entities={} spawned={}",
                frame_count as f32 / elapsed,
                stage.len(),
                dispatcher.registry().len(),
                spawn_count
            );
            frame_count = 0;
            spawn_count = 0;
            fps_timer = Instant::now();
        }
    }

    println!("Shutting down...");
    camera.stop();
    Ok(())
}
