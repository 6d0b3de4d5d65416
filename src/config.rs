use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::render::sprite::SpriteTiming;
use crate::scene::SceneSet;
use crate::tracker::{GateConfig, SpawnGate, Viewport};

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub gate: GateSettings,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub sprites: SpriteConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub attractor: AttractorConfig,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// カメラデバイス番号
    #[serde(default)]
    pub index: i32,
    /// ソースフレーム幅（ゲートのソース空間）
    #[serde(default = "default_source_width")]
    pub width: u32,
    /// ソースフレーム高さ
    #[serde(default = "default_source_height")]
    pub height: u32,
}

fn default_source_width() -> u32 { 640 }
fn default_source_height() -> u32 { 480 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_source_width(),
            height: default_source_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// MoveNet MultiPose の ONNX モデル
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// ポーズ全体のスコア閾値
    #[serde(default = "default_min_pose_score")]
    pub min_pose_score: f32,
    /// 関節ごとのスコア閾値。未満は欠損扱い
    #[serde(default = "default_min_keypoint_score")]
    pub min_keypoint_score: f32,
    /// "local" か "remote"
    #[serde(default = "default_detection_mode")]
    pub mode: String,
    /// remote モードの接続先
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// remote モードの JPEG 品質
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
    /// トラッキングのマッチング距離上限（ソースピクセル）
    #[serde(default = "default_track_max_distance")]
    pub track_max_distance: f32,
    /// トラックを破棄するまでの不在フレーム数
    #[serde(default = "default_track_max_age")]
    pub track_max_age: u32,
}

fn default_model_path() -> String { "models/movenet_multipose.onnx".to_string() }
fn default_min_pose_score() -> f32 { 0.3 }
fn default_min_keypoint_score() -> f32 { 0.3 }
fn default_detection_mode() -> String { "local".to_string() }
fn default_server_addr() -> String { "127.0.0.1:9400".to_string() }
fn default_jpeg_quality() -> i32 { 80 }
fn default_track_max_distance() -> f32 { 64.0 }
fn default_track_max_age() -> u32 { 30 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            min_pose_score: default_min_pose_score(),
            min_keypoint_score: default_min_keypoint_score(),
            mode: default_detection_mode(),
            server_addr: default_server_addr(),
            jpeg_quality: default_jpeg_quality(),
            track_max_distance: default_track_max_distance(),
            track_max_age: default_track_max_age(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GateSettings {
    /// ソースピクセルでの移動閾値
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,
    /// エンティティごとの最小試行間隔
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// マッピング後の境界チェック
    #[serde(default = "default_bounds_check")]
    pub bounds_check: bool,
    /// 散らしの振幅（ソースピクセル）
    #[serde(default = "default_jitter")]
    pub jitter: f32,
    /// この秒数観測されないエンティティを破棄
    #[serde(default = "default_evict_after_secs")]
    pub evict_after_secs: f64,
}

fn default_movement_threshold() -> f32 { 3.0 }
fn default_throttle_ms() -> u64 { 10 }
fn default_bounds_check() -> bool { true }
fn default_jitter() -> f32 { 30.0 }
fn default_evict_after_secs() -> f64 { 10.0 }

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            movement_threshold: default_movement_threshold(),
            throttle_ms: default_throttle_ms(),
            bounds_check: default_bounds_check(),
            jitter: default_jitter(),
            evict_after_secs: default_evict_after_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StageConfig {
    /// 描画先ビューポート幅
    #[serde(default = "default_stage_width")]
    pub width: u32,
    #[serde(default = "default_stage_height")]
    pub height: u32,
}

fn default_stage_width() -> u32 { 1280 }
fn default_stage_height() -> u32 { 720 }

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            width: default_stage_width(),
            height: default_stage_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpriteConfig {
    #[serde(default = "default_entrance_secs")]
    pub entrance_secs: f64,
    #[serde(default = "default_exit_fade_secs")]
    pub exit_fade_secs: f64,
    /// 建築物上の花の寿命
    #[serde(default = "default_temporary_secs")]
    pub temporary_secs: f64,
    /// それ以外の花の寿命
    #[serde(default = "default_persistent_secs")]
    pub persistent_secs: f64,
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,
    /// スケール 1.0 の辺長（ピクセル）
    #[serde(default = "default_sprite_size")]
    pub size_px: f32,
}

fn default_entrance_secs() -> f64 { 0.15 }
fn default_exit_fade_secs() -> f64 { 0.5 }
fn default_temporary_secs() -> f64 { 0.25 }
fn default_persistent_secs() -> f64 { 15.0 }
fn default_min_scale() -> f32 { 0.35 }
fn default_max_scale() -> f32 { 0.85 }
fn default_sprite_size() -> f32 { 120.0 }

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            entrance_secs: default_entrance_secs(),
            exit_fade_secs: default_exit_fade_secs(),
            temporary_secs: default_temporary_secs(),
            persistent_secs: default_persistent_secs(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            size_px: default_sprite_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneConfig {
    /// 1 セットの表示時間
    #[serde(default = "default_set_duration_secs")]
    pub set_duration_secs: f64,
    #[serde(default = "default_fade_secs")]
    pub fade_secs: f64,
    /// 暗転保持時間
    #[serde(default = "default_hold_secs")]
    pub hold_secs: f64,
    #[serde(default = "default_scene_sets")]
    pub sets: Vec<SceneSetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneSetConfig {
    pub background: String,
    pub flowers: Vec<String>,
    /// 前景シルエット領域 [x, y, w, h]（ビューポート比率）
    #[serde(default)]
    pub foreground: Vec<[f32; 4]>,
}

fn default_set_duration_secs() -> f64 { 180.0 }
fn default_fade_secs() -> f64 { 2.0 }
fn default_hold_secs() -> f64 { 3.0 }

fn default_scene_sets() -> Vec<SceneSetConfig> {
    let flower_range = |lo: usize| -> Vec<String> {
        (lo..lo + 5)
            .map(|i| format!("assets/flower-{}.png", i))
            .collect()
    };
    vec![
        SceneSetConfig {
            background: "assets/set-1.jpg".to_string(),
            flowers: flower_range(11),
            foreground: vec![[0.2, 0.45, 0.6, 0.55]],
        },
        SceneSetConfig {
            background: "assets/set-2.jpg".to_string(),
            flowers: flower_range(1),
            foreground: vec![[0.15, 0.4, 0.7, 0.6]],
        },
        SceneSetConfig {
            background: "assets/set-3.jpg".to_string(),
            flowers: flower_range(6),
            foreground: vec![[0.25, 0.5, 0.5, 0.5]],
        },
    ]
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            set_duration_secs: default_set_duration_secs(),
            fade_secs: default_fade_secs(),
            hold_secs: default_hold_secs(),
            sets: default_scene_sets(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OverlayConfig {
    /// 不在がこの秒数続いたら表示
    #[serde(default = "default_idle_secs")]
    pub idle_secs: f64,
    #[serde(default = "default_overlay_fade_secs")]
    pub fade_secs: f64,
}

fn default_idle_secs() -> f64 { 30.0 }
fn default_overlay_fade_secs() -> f64 { 1.2 }

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            idle_secs: default_idle_secs(),
            fade_secs: default_overlay_fade_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AttractorConfig {
    #[serde(default = "default_attractor_interval_secs")]
    pub interval_secs: f64,
}

fn default_attractor_interval_secs() -> f64 { 3.0 }

impl Default for AttractorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_attractor_interval_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// ファイルが無い・壊れている場合は既定値で起動する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("[config] falling back to defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn source_viewport(&self) -> Viewport {
        Viewport::new(self.camera.width as f32, self.camera.height as f32)
    }

    pub fn stage_viewport(&self) -> Viewport {
        Viewport::new(self.stage.width as f32, self.stage.height as f32)
    }

    pub fn spawn_gate(&self) -> SpawnGate {
        SpawnGate::new(
            self.source_viewport(),
            self.stage_viewport(),
            GateConfig {
                movement_threshold: self.gate.movement_threshold,
                throttle: Duration::from_millis(self.gate.throttle_ms),
                bounds_check: self.gate.bounds_check,
            },
        )
    }

    pub fn sprite_timing(&self) -> SpriteTiming {
        SpriteTiming {
            entrance: Duration::from_secs_f64(self.sprites.entrance_secs),
            fade: Duration::from_secs_f64(self.sprites.exit_fade_secs),
            temporary_delay: Duration::from_secs_f64(self.sprites.temporary_secs),
            persistent_delay: Duration::from_secs_f64(self.sprites.persistent_secs),
        }
    }

    pub fn scene_sets(&self) -> Vec<SceneSet> {
        self.scene
            .sets
            .iter()
            .map(|s| SceneSet {
                background: PathBuf::from(&s.background),
                flowers: s.flowers.iter().map(PathBuf::from).collect(),
                foreground: s.foreground.clone(),
            })
            .collect()
    }
}
