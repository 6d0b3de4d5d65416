//! Debug viewer: shows the camera feed with detected wrists and their
//! track ids. Useful for checking model output and id stability before
//! running the full installation.

use anyhow::Result;
use minifb::{Key, Window, WindowOptions};
use opencv::prelude::*;
use std::time::Instant;

use hana_tracker::camera::CameraFeed;
use hana_tracker::config::Config;
use hana_tracker::pose::{preprocess_for_multipose, KeypointIndex, MoveNetDetector, TrackAssigner};

const CONFIG_PATH: &str = "config.toml";

/// トラック ID ごとの識別色
const TRACK_COLORS: [u32; 6] = [
    0x00FF00, 0xFF8800, 0x00CCFF, 0xFF00FF, 0xFFFF00, 0xFF4444,
];

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);

    println!("Pose Viewer");
    println!("Press ESC to exit");

    let mut camera = CameraFeed::start(
        config.camera.index,
        config.camera.width,
        config.camera.height,
    )?;
    let (width, height) = camera.resolution();
    println!("Camera: {}x{}", width, height);

    println!("Loading model from {}...", config.detection.model_path);
    let mut detector = MoveNetDetector::new(
        &config.detection.model_path,
        config.detection.min_pose_score,
    )?;
    let mut assigner = TrackAssigner::new(
        config.detection.track_max_distance,
        config.detection.track_max_age,
    );
    println!("Model loaded");

    let mut window = Window::new(
        "Pose Viewer",
        width as usize,
        height as usize,
        WindowOptions::default(),
    )?;
    let mut buffer = vec![0u32; (width * height) as usize];

    let mut last_frame_id = 0u64;
    let mut frame_count = 0u32;
    let mut fps_timer = Instant::now();

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let frame_id = camera.frame_id();
        if frame_id == last_frame_id {
            std::thread::sleep(std::time::Duration::from_millis(1));
            window.update();
            continue;
        }
        last_frame_id = frame_id;

        let Some(frame) = camera.get_frame() else {
            continue;
        };

        let input = preprocess_for_multipose(&frame)?;
        let mut people = detector.detect(input, width as f32, height as f32)?;
        assigner.assign(&mut people, config.detection.min_keypoint_score);

        // カメラフレームを背景に
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let p = frame.at_2d::<opencv::core::Vec3b>(y, x)?;
                buffer[(y as u32 * width + x as u32) as usize] =
                    ((p[2] as u32) << 16) | ((p[1] as u32) << 8) | p[0] as u32;
            }
        }

        // 手首マーカー
        for person in &people {
            let color = TRACK_COLORS[person.id as usize % TRACK_COLORS.len()];
            for joint in KeypointIndex::WRISTS {
                if let Some(obs) = person.observe(joint, config.detection.min_keypoint_score) {
                    draw_marker(&mut buffer, width, height, obs.x as i32, obs.y as i32, color);
                }
            }
        }

        window.update_with_buffer(&buffer, width as usize, height as usize)?;

        frame_count += 1;
        let elapsed = fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            println!(
                "FPS: {:.1}, people: {}, tracks: {}",
                frame_count as f32 / elapsed,
                people.len(),
                assigner.track_count()
            );
            frame_count = 0;
            fps_timer = Instant::now();
        }
    }

    println!("Shutting down...");
    camera.stop();
    Ok(())
}

/// 塗りつぶし円のマーカー
fn draw_marker(buffer: &mut [u32], width: u32, height: u32, cx: i32, cy: i32, color: u32) {
    const RADIUS: i32 = 6;
    for dy in -RADIUS..=RADIUS {
        for dx in -RADIUS..=RADIUS {
            if dx * dx + dy * dy > RADIUS * RADIUS {
                continue;
            }
            let x = cx + dx;
            let y = cy + dy;
            if x >= 0 && x < width as i32 && y >= 0 && y < height as i32 {
                buffer[(y as u32 * width + x as u32) as usize] = color;
            }
        }
    }
}
