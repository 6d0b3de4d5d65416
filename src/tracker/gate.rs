use std::time::{Duration, Instant};

use anyhow::Result;

use crate::pose::Observation;
use crate::region::RegionClassifier;
use crate::tracker::mapper::{map_range, Viewport};
use crate::tracker::registry::{EntityKey, Registry};

/// スポーンゲートの調整値
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// ソースピクセル空間での移動閾値
    pub movement_threshold: f32,
    /// エンティティごとの最小試行間隔
    pub throttle: Duration,
    /// マッピング後の座標がビューポートを超えたら棄却するか
    pub bounds_check: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 3.0,
            throttle: Duration::from_millis(10),
            bounds_check: true,
        }
    }
}

/// 受理された観測。描画側に渡る唯一の出力
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnEvent {
    /// 描画先座標
    pub x: f32,
    pub y: f32,
    /// 対象領域上なら短寿命
    pub temporary: bool,
}

/// 観測ごとに 4 段のゲートを順に評価し、スポーンイベントを決定する
///
/// 状態は `Registry` として外から渡され、時刻も引数で注入される。
/// タイマーは持たないので、保留中のコールバックという概念が存在しない。
pub struct SpawnGate {
    source: Viewport,
    viewport: Viewport,
    config: GateConfig,
}

impl SpawnGate {
    pub fn new(source: Viewport, viewport: Viewport, config: GateConfig) -> Self {
        Self {
            source,
            viewport,
            config,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// ゲートを順に評価する。抑制は期待される制御フローでありエラーではない
    ///
    /// jitter はマッピング前のソース座標にのみ加算される。移動ゲートは
    /// 散らす前の生の観測位置で判定する。
    pub fn evaluate(
        &self,
        registry: &mut Registry,
        obs: &Observation,
        jitter: f32,
        now: Instant,
        region: &dyn RegionClassifier,
    ) -> Result<Option<SpawnEvent>> {
        let mapped_x = map_range(
            obs.x + jitter,
            0.0,
            self.source.width,
            0.0,
            self.viewport.width,
        )?;
        let mapped_y = map_range(
            obs.y + jitter,
            0.0,
            self.source.height,
            0.0,
            self.viewport.height,
        )?;

        // 1. 境界ゲート
        if self.config.bounds_check
            && (mapped_x > self.viewport.width || mapped_y > self.viewport.height)
        {
            return Ok(None);
        }

        let entity = registry.get_or_create(EntityKey::new(obs.person_id, obs.joint), now);

        // 2. スロットルゲート。後段で棄却されても試行枠を消費する
        if let Some(last) = entity.last_attempt {
            if now.duration_since(last) < self.config.throttle {
                return Ok(None);
            }
        }
        entity.last_attempt = Some(now);

        // 3. 移動ゲート。どちらか一方の軸が閾値内なら抑制（意図的な OR）
        let (last_x, last_y) = entity.last_position;
        if (last_x - obs.x).abs() <= self.config.movement_threshold
            || (last_y - obs.y).abs() <= self.config.movement_threshold
        {
            return Ok(None);
        }

        // 4. 受理
        entity.last_position = (obs.x, obs.y);
        let temporary = region.contains(mapped_x, mapped_y);

        Ok(Some(SpawnEvent {
            x: mapped_x,
            y: mapped_y,
            temporary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::KeypointIndex;
    use crate::region::NullRegion;

    struct EverywhereRegion;

    impl RegionClassifier for EverywhereRegion {
        fn contains(&self, _x: f32, _y: f32) -> bool {
            true
        }
    }

    fn gate() -> SpawnGate {
        SpawnGate::new(
            Viewport::new(640.0, 480.0),
            Viewport::new(1920.0, 1080.0),
            GateConfig {
                movement_threshold: 5.0,
                throttle: Duration::from_millis(10),
                bounds_check: true,
            },
        )
    }

    fn obs(x: f32, y: f32) -> Observation {
        Observation {
            person_id: 1,
            joint: KeypointIndex::LeftWrist,
            x,
            y,
        }
    }

    #[test]
    fn test_new_entity_is_accepted() {
        let gate = gate();
        let mut registry = Registry::new();
        let now = Instant::now();

        let event = gate
            .evaluate(&mut registry, &obs(320.0, 240.0), 0.0, now, &NullRegion)
            .unwrap();
        let event = event.expect("first observation away from origin must pass");
        assert_eq!(event.x, 960.0);
        assert_eq!(event.y, 540.0);
        assert!(!event.temporary);
    }

    #[test]
    fn test_first_sight_near_origin_is_suppressed() {
        // 既定の基準位置が (0,0) なので、原点付近の初観測は偽陰性になる。
        // 文書化された既知のエッジケース。
        let gate = gate();
        let mut registry = Registry::new();
        let now = Instant::now();

        let event = gate
            .evaluate(&mut registry, &obs(2.0, 400.0), 0.0, now, &NullRegion)
            .unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_movement_gate_or_semantics() {
        let gate = gate();
        let mut registry = Registry::new();
        let t0 = Instant::now();

        let key = EntityKey::new(1, KeypointIndex::LeftWrist);
        registry.get_or_create(key, t0).last_position = (100.0, 100.0);

        // |dx| = 2 <= 5 なので、Y がどれだけ動いていても抑制される
        let event = gate
            .evaluate(
                &mut registry,
                &obs(102.0, 100.0),
                0.0,
                t0,
                &NullRegion,
            )
            .unwrap();
        assert!(event.is_none());

        let event = gate
            .evaluate(
                &mut registry,
                &obs(102.0, 400.0),
                0.0,
                t0 + Duration::from_millis(20),
                &NullRegion,
            )
            .unwrap();
        assert!(event.is_none(), "large Y delta must not override X within threshold");

        // 両軸とも閾値を超えれば受理
        let event = gate
            .evaluate(
                &mut registry,
                &obs(200.0, 300.0),
                0.0,
                t0 + Duration::from_millis(40),
                &NullRegion,
            )
            .unwrap();
        assert!(event.is_some());
    }

    #[test]
    fn test_throttle_consumes_slot_on_rejection() {
        let gate = gate();
        let mut registry = Registry::new();
        let t0 = Instant::now();

        // 移動ゲートで棄却される観測 (dy = 1 <= 5) でもスロットルは武装される
        let event = gate
            .evaluate(&mut registry, &obs(200.0, 1.0), 0.0, t0, &NullRegion)
            .unwrap();
        assert!(event.is_none());

        // 1ms 後: 移動ゲートを通る観測でもスロットルで抑制
        let event = gate
            .evaluate(
                &mut registry,
                &obs(300.0, 300.0),
                0.0,
                t0 + Duration::from_millis(1),
                &NullRegion,
            )
            .unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_throttle_expiry_allows_next_accept() {
        let gate = gate();
        let mut registry = Registry::new();
        let t0 = Instant::now();

        assert!(gate
            .evaluate(&mut registry, &obs(100.0, 100.0), 0.0, t0, &NullRegion)
            .unwrap()
            .is_some());

        // ウィンドウ内は抑制
        assert!(gate
            .evaluate(
                &mut registry,
                &obs(200.0, 200.0),
                0.0,
                t0 + Duration::from_millis(5),
                &NullRegion,
            )
            .unwrap()
            .is_none());

        // ウィンドウが明ければ受理
        assert!(gate
            .evaluate(
                &mut registry,
                &obs(200.0, 200.0),
                0.0,
                t0 + Duration::from_millis(15),
                &NullRegion,
            )
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_bounds_gate_rejects_offscreen() {
        let gate = gate();
        let mut registry = Registry::new();
        let now = Instant::now();

        // jitter で右端の外へ押し出す
        let event = gate
            .evaluate(&mut registry, &obs(639.0, 240.0), 10.0, now, &NullRegion)
            .unwrap();
        assert!(event.is_none());
        // 境界ゲートはレジストリに触れない
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bounds_check_can_be_disabled() {
        let gate = SpawnGate::new(
            Viewport::new(640.0, 480.0),
            Viewport::new(1920.0, 1080.0),
            GateConfig {
                movement_threshold: 5.0,
                throttle: Duration::from_millis(10),
                bounds_check: false,
            },
        );
        let mut registry = Registry::new();
        let now = Instant::now();

        let event = gate
            .evaluate(&mut registry, &obs(639.0, 240.0), 10.0, now, &NullRegion)
            .unwrap()
            .expect("disabled bounds check lets off-viewport events through");
        assert!(event.x > 1920.0);
    }

    #[test]
    fn test_region_changes_only_classification() {
        let gate = gate();
        let now = Instant::now();

        let mut registry_a = Registry::new();
        let on_null = gate
            .evaluate(&mut registry_a, &obs(320.0, 240.0), 0.0, now, &NullRegion)
            .unwrap()
            .unwrap();

        let mut registry_b = Registry::new();
        let on_target = gate
            .evaluate(
                &mut registry_b,
                &obs(320.0, 240.0),
                0.0,
                now,
                &EverywhereRegion,
            )
            .unwrap()
            .unwrap();

        assert!(!on_null.temporary);
        assert!(on_target.temporary);
        assert_eq!(on_null.x, on_target.x);
        assert_eq!(on_null.y, on_target.y);
    }

    #[test]
    fn test_degenerate_source_is_an_error() {
        let gate = SpawnGate::new(
            Viewport::new(0.0, 480.0),
            Viewport::new(1920.0, 1080.0),
            GateConfig::default(),
        );
        let mut registry = Registry::new();

        let result = gate.evaluate(
            &mut registry,
            &obs(320.0, 240.0),
            0.0,
            Instant::now(),
            &NullRegion,
        );
        assert!(result.is_err());
    }
}
