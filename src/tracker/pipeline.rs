use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;

use crate::pose::{KeypointIndex, Person};
use crate::region::RegionClassifier;
use crate::tracker::gate::{SpawnEvent, SpawnGate};
use crate::tracker::mapper::scatter;
use crate::tracker::registry::Registry;

/// 受理イベントの受け口。描画側が実装する
///
/// シンクは自前のアニメーションと寿命管理を持つ。temporary な花は短く、
/// そうでない花は長く残すのが契約。
pub trait SpawnSink {
    fn spawn(&mut self, event: &SpawnEvent, now: Instant);
}

/// フレームごとのディスパッチ: 人物 → 手首の観測 → ゲート → シンク
///
/// ゲートとレジストリを所有する。検出呼び出しと同じ論理ターンで実行される
/// 前提なので内部にロックは持たない。
pub struct FrameDispatcher {
    gate: SpawnGate,
    registry: Registry,
    min_keypoint_score: f32,
    jitter_amplitude: f32,
    evict_after: Duration,
}

impl FrameDispatcher {
    pub fn new(
        gate: SpawnGate,
        min_keypoint_score: f32,
        jitter_amplitude: f32,
        evict_after: Duration,
    ) -> Self {
        Self {
            gate,
            registry: Registry::new(),
            min_keypoint_score,
            jitter_amplitude,
            evict_after,
        }
    }

    /// 1 フレーム分の検出結果を処理し、発行したイベント数を返す
    ///
    /// 関節が検出されていないのは欠損であってエラーではない。フレームの
    /// 最後に idle なエンティティを破棄する。
    pub fn dispatch<R: Rng>(
        &mut self,
        people: &[Person],
        region: &dyn RegionClassifier,
        sink: &mut dyn SpawnSink,
        rng: &mut R,
        now: Instant,
    ) -> Result<usize> {
        let mut emitted = 0;

        for person in people {
            for joint in KeypointIndex::WRISTS {
                let Some(obs) = person.observe(joint, self.min_keypoint_score) else {
                    continue;
                };
                let jitter = scatter(rng, self.jitter_amplitude);
                if let Some(event) = self.gate.evaluate(&mut self.registry, &obs, jitter, now, region)? {
                    sink.spawn(&event, now);
                    emitted += 1;
                }
            }
        }

        self.registry.evict_idle(now, self.evict_after);
        Ok(emitted)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gate(&self) -> &SpawnGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;
    use crate::region::NullRegion;
    use crate::tracker::gate::GateConfig;
    use crate::tracker::mapper::Viewport;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<SpawnEvent>,
    }

    impl SpawnSink for RecordingSink {
        fn spawn(&mut self, event: &SpawnEvent, _now: Instant) {
            self.events.push(*event);
        }
    }

    fn dispatcher() -> FrameDispatcher {
        let gate = SpawnGate::new(
            Viewport::new(640.0, 480.0),
            Viewport::new(640.0, 480.0),
            GateConfig {
                movement_threshold: 3.0,
                throttle: Duration::from_millis(10),
                bounds_check: false,
            },
        );
        // jitter 0 で決定的にする
        FrameDispatcher::new(gate, 0.3, 0.0, Duration::from_secs(10))
    }

    fn person(id: u32, wrist_x: f32, wrist_y: f32, score: f32) -> Person {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[KeypointIndex::LeftWrist as usize] = Keypoint::new(wrist_x, wrist_y, score);
        Person::new(id, 0.9, keypoints)
    }

    #[test]
    fn test_two_people_emit_independently() {
        let mut dispatcher = dispatcher();
        let mut sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();

        let people = vec![
            person(1, 100.0, 100.0, 0.9),
            person(2, 400.0, 300.0, 0.9),
        ];

        let emitted = dispatcher
            .dispatch(&people, &NullRegion, &mut sink, &mut rng, now)
            .unwrap();
        assert_eq!(emitted, 2);
        assert_eq!(sink.events.len(), 2);
        // レジストリには (person, joint) ごとのエントリ
        assert_eq!(dispatcher.registry().len(), 2);
    }

    #[test]
    fn test_missing_joint_is_absence() {
        let mut dispatcher = dispatcher();
        let mut sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();

        // 低信頼の手首は観測なし扱い
        let people = vec![person(1, 100.0, 100.0, 0.05)];
        let emitted = dispatcher
            .dispatch(&people, &NullRegion, &mut sink, &mut rng, now)
            .unwrap();
        assert_eq!(emitted, 0);
        assert!(dispatcher.registry().is_empty());
    }

    #[test]
    fn test_same_person_both_wrists() {
        let mut dispatcher = dispatcher();
        let mut sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();

        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[KeypointIndex::LeftWrist as usize] = Keypoint::new(100.0, 200.0, 0.9);
        keypoints[KeypointIndex::RightWrist as usize] = Keypoint::new(500.0, 200.0, 0.9);
        let people = vec![Person::new(1, 0.9, keypoints)];

        let emitted = dispatcher
            .dispatch(&people, &NullRegion, &mut sink, &mut rng, now)
            .unwrap();
        assert_eq!(emitted, 2);
    }

    #[test]
    fn test_idle_entities_are_evicted_between_frames() {
        let mut dispatcher = dispatcher();
        let mut sink = RecordingSink::default();
        let mut rng = StdRng::seed_from_u64(1);
        let t0 = Instant::now();

        dispatcher
            .dispatch(&[person(1, 100.0, 100.0, 0.9)], &NullRegion, &mut sink, &mut rng, t0)
            .unwrap();
        assert_eq!(dispatcher.registry().len(), 1);

        // 人物 1 が長時間現れないフレーム
        let t1 = t0 + Duration::from_secs(20);
        dispatcher
            .dispatch(&[person(2, 400.0, 300.0, 0.9)], &NullRegion, &mut sink, &mut rng, t1)
            .unwrap();
        assert_eq!(dispatcher.registry().len(), 1);
    }
}
