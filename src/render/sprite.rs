use std::time::{Duration, Instant};

use rand::Rng;

use crate::tracker::{SpawnEvent, SpawnSink};

/// スプライトの時間パラメータ
#[derive(Debug, Clone, Copy)]
pub struct SpriteTiming {
    /// 出現時のスケールアップ時間
    pub entrance: Duration,
    /// フェードアウト自体の長さ
    pub fade: Duration,
    /// temporary な花がフェード開始まで生きる時間
    pub temporary_delay: Duration,
    /// persistent な花がフェード開始まで生きる時間
    pub persistent_delay: Duration,
}

impl Default for SpriteTiming {
    fn default() -> Self {
        Self {
            entrance: Duration::from_millis(150),
            fade: Duration::from_millis(500),
            temporary_delay: Duration::from_millis(250),
            persistent_delay: Duration::from_secs(15),
        }
    }
}

/// ステージ上のひとつの花
#[derive(Debug, Clone, Copy)]
pub struct Sprite {
    pub x: f32,
    pub y: f32,
    /// 出現アニメーション完了時のスケール
    pub scale_target: f32,
    /// アクティブなセットのテクスチャ配列へのインデックス
    pub texture: usize,
    pub temporary: bool,
    pub spawned_at: Instant,
}

impl Sprite {
    fn fade_delay(&self, timing: &SpriteTiming) -> Duration {
        if self.temporary {
            timing.temporary_delay
        } else {
            timing.persistent_delay
        }
    }

    /// 出現ランプ込みの現在スケール
    pub fn scale(&self, now: Instant, timing: &SpriteTiming) -> f32 {
        let elapsed = now.duration_since(self.spawned_at).as_secs_f32();
        let entrance = timing.entrance.as_secs_f32().max(f32::EPSILON);
        self.scale_target * (elapsed / entrance).clamp(0.0, 1.0)
    }

    /// フェード開始までは 1.0、以降は 3 乗のイーズインで 0 へ
    pub fn alpha(&self, now: Instant, timing: &SpriteTiming) -> f32 {
        let elapsed = now.duration_since(self.spawned_at);
        let delay = self.fade_delay(timing);
        if elapsed <= delay {
            return 1.0;
        }
        let fade = timing.fade.as_secs_f32().max(f32::EPSILON);
        let t = ((elapsed - delay).as_secs_f32() / fade).clamp(0.0, 1.0);
        1.0 - t * t * t
    }

    pub fn expired(&self, now: Instant, timing: &SpriteTiming) -> bool {
        now.duration_since(self.spawned_at) >= self.fade_delay(timing) + timing.fade
    }
}

/// 受理イベントをスプライトとして保持する描画ステージ
///
/// temporary / persistent の非対称な寿命はここで守られる。
pub struct SpriteStage {
    timing: SpriteTiming,
    sprites: Vec<Sprite>,
    texture_count: usize,
    min_scale: f32,
    max_scale: f32,
}

impl SpriteStage {
    pub fn new(timing: SpriteTiming, texture_count: usize, min_scale: f32, max_scale: f32) -> Self {
        Self {
            timing,
            sprites: Vec::new(),
            texture_count,
            min_scale,
            max_scale,
        }
    }

    pub fn timing(&self) -> &SpriteTiming {
        &self.timing
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    /// セット切り替え時にテクスチャ数を差し替える
    pub fn set_texture_count(&mut self, count: usize) {
        self.texture_count = count;
    }

    /// 寿命が尽きたスプライトを取り除く
    pub fn retire(&mut self, now: Instant) {
        let timing = self.timing;
        self.sprites.retain(|s| !s.expired(now, &timing));
    }

    /// セット切り替え時の全消去
    pub fn clear(&mut self) {
        self.sprites.clear();
    }
}

impl SpawnSink for SpriteStage {
    fn spawn(&mut self, event: &SpawnEvent, now: Instant) {
        let mut rng = rand::thread_rng();
        // 出現スケールは下限つきの乱数
        let scale_target = (rng.gen::<f32>() * self.max_scale).max(self.min_scale);
        let texture = rng.gen_range(0..self.texture_count.max(1));

        self.sprites.push(Sprite {
            x: event.x,
            y: event.y,
            scale_target,
            texture,
            temporary: event.temporary,
            spawned_at: now,
        });
    }
}
