use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::tracker::Viewport;

/// ひとつの情景セット: 背景画像、前景シルエット領域、花テクスチャ
#[derive(Debug, Clone)]
pub struct SceneSet {
    pub background: PathBuf,
    pub flowers: Vec<PathBuf>,
    /// 前景領域 [x, y, w, h]（ビューポート比率）
    pub foreground: Vec<[f32; 4]>,
}

/// セット切り替えの進行フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Steady,
    FadingOut,
    /// 暗転保持。この間に次セットへの差し替えが済んでいる
    Holding,
    FadingIn,
}

/// tick の結果。セットが切り替わった瞬間だけ通知される
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneTransition {
    None,
    /// ステージを空にして次セットの素材を読み直すべきタイミング
    SetChanged,
}

/// 情景セットを周期的に切り替える状態機械
///
/// 切り替え中 (`is_changing`) はフレームループが描画だけを続け、
/// 検出・ゲートのパイプラインを丸ごとスキップする協調的な一時停止。
pub struct SceneRotator {
    sets: Vec<SceneSet>,
    active: usize,
    set_duration: Duration,
    fade: Duration,
    hold: Duration,
    phase: Phase,
    phase_since: Instant,
}

impl SceneRotator {
    pub fn new(
        sets: Vec<SceneSet>,
        set_duration: Duration,
        fade: Duration,
        hold: Duration,
        now: Instant,
    ) -> Self {
        assert!(!sets.is_empty(), "scene rotator needs at least one set");
        Self {
            sets,
            active: 0,
            set_duration,
            fade,
            hold,
            phase: Phase::Steady,
            phase_since: now,
        }
    }

    pub fn active_set(&self) -> &SceneSet {
        &self.sets[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// 検出・ゲートを止めるべき間は true
    pub fn is_changing(&self) -> bool {
        self.phase != Phase::Steady
    }

    /// 手動でセット切り替えを開始する
    pub fn begin_change(&mut self, now: Instant) {
        if self.phase == Phase::Steady {
            self.phase = Phase::FadingOut;
            self.phase_since = now;
        }
    }

    /// フェーズを進める。セットが入れ替わった tick でだけ SetChanged を返す
    pub fn tick(&mut self, now: Instant) -> SceneTransition {
        let elapsed = now.duration_since(self.phase_since);

        match self.phase {
            Phase::Steady => {
                if elapsed >= self.set_duration {
                    self.phase = Phase::FadingOut;
                    self.phase_since = now;
                }
                SceneTransition::None
            }
            Phase::FadingOut => {
                if elapsed >= self.fade {
                    self.active = (self.active + 1) % self.sets.len();
                    self.phase = Phase::Holding;
                    self.phase_since = now;
                    return SceneTransition::SetChanged;
                }
                SceneTransition::None
            }
            Phase::Holding => {
                if elapsed >= self.hold {
                    self.phase = Phase::FadingIn;
                    self.phase_since = now;
                }
                SceneTransition::None
            }
            Phase::FadingIn => {
                if elapsed >= self.fade {
                    self.phase = Phase::Steady;
                    self.phase_since = now;
                }
                SceneTransition::None
            }
        }
    }

    /// 背景とステージ全体にかける不透明度
    pub fn opacity(&self, now: Instant) -> f32 {
        let t = now.duration_since(self.phase_since).as_secs_f32();
        let fade = self.fade.as_secs_f32().max(f32::EPSILON);
        match self.phase {
            Phase::Steady => 1.0,
            Phase::FadingOut => (1.0 - t / fade).clamp(0.0, 1.0),
            Phase::Holding => 0.0,
            Phase::FadingIn => (t / fade).clamp(0.0, 1.0),
        }
    }
}

/// 待機オーバーレイの表示制御
///
/// 人が検出されなくなってから idle_delay 経過で表示、人が現れたら即座に
/// フェードアウトする。
pub struct OverlayController {
    idle_delay: Duration,
    fade: Duration,
    visible: bool,
    toggled_at: Instant,
    idle_since: Option<Instant>,
}

impl OverlayController {
    pub fn new(idle_delay: Duration, fade: Duration, now: Instant) -> Self {
        // 起動時は誰もいない前提で表示から始める
        Self {
            idle_delay,
            fade,
            visible: true,
            toggled_at: now,
            idle_since: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn update(&mut self, people_present: bool, now: Instant) {
        if people_present {
            self.idle_since = None;
            if self.visible {
                self.visible = false;
                self.toggled_at = now;
            }
        } else {
            let since = *self.idle_since.get_or_insert(now);
            if !self.visible && now.duration_since(since) >= self.idle_delay {
                self.visible = true;
                self.toggled_at = now;
            }
        }
    }

    /// セット切り替え中は強制表示
    pub fn force_show(&mut self, now: Instant) {
        self.idle_since = None;
        if !self.visible {
            self.visible = true;
            self.toggled_at = now;
        }
    }

    pub fn opacity(&self, now: Instant) -> f32 {
        let t = now.duration_since(self.toggled_at).as_secs_f32();
        let fade = self.fade.as_secs_f32().max(f32::EPSILON);
        let progress = (t / fade).clamp(0.0, 1.0);
        if self.visible {
            progress
        } else {
            1.0 - progress
        }
    }
}

/// 一定間隔で誘引用の花をランダムなソース座標に発生させる
///
/// ゲートは通らず常に persistent。セット切り替え中は呼び出し側が止める。
pub struct Attractor {
    interval: Duration,
    source: Viewport,
    last: Instant,
}

impl Attractor {
    pub fn new(interval: Duration, source: Viewport, now: Instant) -> Self {
        Self {
            interval,
            source,
            last: now,
        }
    }

    /// 間隔が経過していればランダムなソース座標を返す
    pub fn poll<R: Rng>(&mut self, rng: &mut R, now: Instant) -> Option<(f32, f32)> {
        if now.duration_since(self.last) < self.interval {
            return None;
        }
        self.last = now;
        Some((
            rng.gen::<f32>() * self.source.width,
            rng.gen::<f32>() * self.source.height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sets(n: usize) -> Vec<SceneSet> {
        (0..n)
            .map(|i| SceneSet {
                background: PathBuf::from(format!("set-{}.jpg", i + 1)),
                flowers: vec![PathBuf::from(format!("flower-{}.png", i + 1))],
                foreground: Vec::new(),
            })
            .collect()
    }

    fn rotator(now: Instant) -> SceneRotator {
        SceneRotator::new(
            sets(3),
            Duration::from_secs(180),
            Duration::from_secs(2),
            Duration::from_secs(3),
            now,
        )
    }

    #[test]
    fn test_rotator_steady_until_set_duration() {
        let t0 = Instant::now();
        let mut rotator = rotator(t0);

        assert_eq!(rotator.tick(t0 + Duration::from_secs(100)), SceneTransition::None);
        assert!(!rotator.is_changing());
        assert_eq!(rotator.opacity(t0 + Duration::from_secs(100)), 1.0);
    }

    #[test]
    fn test_rotator_full_cycle() {
        let t0 = Instant::now();
        let mut rotator = rotator(t0);

        // 180s 経過でフェードアウト開始
        let t1 = t0 + Duration::from_secs(180);
        assert_eq!(rotator.tick(t1), SceneTransition::None);
        assert!(rotator.is_changing());
        assert_eq!(rotator.active_index(), 0);

        // フェードアウト完了でセットが入れ替わる
        let t2 = t1 + Duration::from_secs(2);
        assert_eq!(rotator.tick(t2), SceneTransition::SetChanged);
        assert_eq!(rotator.active_index(), 1);
        assert_eq!(rotator.opacity(t2), 0.0);

        // 暗転保持 → フェードイン → 定常
        let t3 = t2 + Duration::from_secs(3);
        assert_eq!(rotator.tick(t3), SceneTransition::None);
        let t4 = t3 + Duration::from_secs(2);
        assert_eq!(rotator.tick(t4), SceneTransition::None);
        assert!(!rotator.is_changing());
        assert_eq!(rotator.opacity(t4), 1.0);
    }

    #[test]
    fn test_rotator_wraps_to_first_set() {
        let t0 = Instant::now();
        let mut rotator = rotator(t0);
        let mut now = t0;

        for expected in [1usize, 2, 0] {
            rotator.begin_change(now);
            now += Duration::from_secs(2);
            assert_eq!(rotator.tick(now), SceneTransition::SetChanged);
            assert_eq!(rotator.active_index(), expected);
            now += Duration::from_secs(3);
            rotator.tick(now);
            now += Duration::from_secs(2);
            rotator.tick(now);
            assert!(!rotator.is_changing());
        }
    }

    #[test]
    fn test_fade_opacity_midpoints() {
        let t0 = Instant::now();
        let mut rotator = rotator(t0);

        rotator.begin_change(t0);
        let mid_out = rotator.opacity(t0 + Duration::from_secs(1));
        assert!((mid_out - 0.5).abs() < 1e-3);

        rotator.tick(t0 + Duration::from_secs(2));
        rotator.tick(t0 + Duration::from_secs(5));
        let mid_in = rotator.opacity(t0 + Duration::from_secs(6));
        assert!((mid_in - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_overlay_shows_after_idle_delay() {
        let t0 = Instant::now();
        let mut overlay = OverlayController::new(
            Duration::from_secs(30),
            Duration::from_millis(1200),
            t0,
        );

        // 人が来たら即座に非表示へ
        overlay.update(true, t0);
        assert!(!overlay.is_visible());

        // 不在でも 30s 未満なら非表示のまま
        overlay.update(false, t0 + Duration::from_secs(10));
        assert!(!overlay.is_visible());

        // 30s 経過で表示
        overlay.update(false, t0 + Duration::from_secs(41));
        assert!(overlay.is_visible());
    }

    #[test]
    fn test_overlay_idle_timer_resets_on_presence() {
        let t0 = Instant::now();
        let mut overlay = OverlayController::new(
            Duration::from_secs(30),
            Duration::from_millis(1200),
            t0,
        );

        overlay.update(true, t0);
        overlay.update(false, t0 + Duration::from_secs(20));
        // 29s 時点で人が戻るとタイマーはリセット
        overlay.update(true, t0 + Duration::from_secs(29));
        overlay.update(false, t0 + Duration::from_secs(30));
        overlay.update(false, t0 + Duration::from_secs(55));
        assert!(!overlay.is_visible());
        overlay.update(false, t0 + Duration::from_secs(61));
        assert!(overlay.is_visible());
    }

    #[test]
    fn test_overlay_fade_opacity() {
        let t0 = Instant::now();
        let mut overlay = OverlayController::new(
            Duration::from_secs(30),
            Duration::from_millis(1200),
            t0,
        );

        overlay.update(true, t0 + Duration::from_secs(5));
        let t_mid = t0 + Duration::from_secs(5) + Duration::from_millis(600);
        let opacity = overlay.opacity(t_mid);
        assert!((opacity - 0.5).abs() < 1e-3);
        let t_done = t0 + Duration::from_secs(5) + Duration::from_millis(1200);
        assert_eq!(overlay.opacity(t_done), 0.0);
    }

    #[test]
    fn test_attractor_respects_interval() {
        let t0 = Instant::now();
        let mut attractor = Attractor::new(
            Duration::from_secs(3),
            Viewport::new(640.0, 480.0),
            t0,
        );
        let mut rng = StdRng::seed_from_u64(9);

        assert!(attractor.poll(&mut rng, t0 + Duration::from_secs(1)).is_none());

        let (x, y) = attractor
            .poll(&mut rng, t0 + Duration::from_secs(3))
            .expect("interval elapsed");
        assert!((0.0..=640.0).contains(&x));
        assert!((0.0..=480.0).contains(&y));

        // 直後はまた待つ
        assert!(attractor
            .poll(&mut rng, t0 + Duration::from_secs(4))
            .is_none());
    }
}
