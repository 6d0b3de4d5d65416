use super::keypoint::Person;

/// フレーム間で検出結果に安定した人物 ID を割り当てる
///
/// 最近傍の貪欲マッチング。max_distance を超える検出は新規トラックになり、
/// max_age フレーム見つからなかったトラックは破棄される。
/// パイプライン側はこの ID を不透明な値として扱う。
pub struct TrackAssigner {
    tracks: Vec<Track>,
    next_id: u32,
    max_distance: f32,
    max_age: u32,
}

#[derive(Debug, Clone, Copy)]
struct Track {
    id: u32,
    center: (f32, f32),
    /// マッチしなかった連続フレーム数
    age: u32,
}

impl TrackAssigner {
    pub fn new(max_distance: f32, max_age: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            max_distance,
            max_age,
        }
    }

    /// 検出結果の id をトラック ID で書き換える
    pub fn assign(&mut self, people: &mut [Person], min_keypoint_score: f32) {
        let mut claimed = vec![false; self.tracks.len()];

        for person in people.iter_mut() {
            let center = person.center(min_keypoint_score);

            let mut best: Option<(usize, f32)> = None;
            for (i, track) in self.tracks.iter().enumerate() {
                if claimed[i] {
                    continue;
                }
                let dx = track.center.0 - center.0;
                let dy = track.center.1 - center.1;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist <= self.max_distance && best.map_or(true, |(_, d)| dist < d) {
                    best = Some((i, dist));
                }
            }

            match best {
                Some((i, _)) => {
                    claimed[i] = true;
                    self.tracks[i].center = center;
                    self.tracks[i].age = 0;
                    person.id = self.tracks[i].id;
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track { id, center, age: 0 });
                    claimed.push(true);
                    person.id = id;
                }
            }
        }

        // マッチしなかったトラックを老化させる
        for (i, track) in self.tracks.iter_mut().enumerate() {
            if !claimed[i] {
                track.age += 1;
            }
        }
        let max_age = self.max_age;
        self.tracks.retain(|t| t.age <= max_age);
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::keypoint::{Keypoint, KeypointIndex};

    fn person_at(x: f32, y: f32) -> Person {
        let keypoints = [Keypoint::new(x, y, 0.9); KeypointIndex::COUNT];
        Person::new(u32::MAX, 0.9, keypoints)
    }

    #[test]
    fn test_stable_id_across_frames() {
        let mut assigner = TrackAssigner::new(50.0, 3);

        let mut frame1 = vec![person_at(100.0, 100.0)];
        assigner.assign(&mut frame1, 0.3);
        let id = frame1[0].id;

        // 少し動いても同じトラック
        let mut frame2 = vec![person_at(110.0, 95.0)];
        assigner.assign(&mut frame2, 0.3);
        assert_eq!(frame2[0].id, id);
    }

    #[test]
    fn test_distant_detection_gets_new_id() {
        let mut assigner = TrackAssigner::new(50.0, 3);

        let mut frame1 = vec![person_at(100.0, 100.0)];
        assigner.assign(&mut frame1, 0.3);

        let mut frame2 = vec![person_at(400.0, 300.0)];
        assigner.assign(&mut frame2, 0.3);
        assert_ne!(frame2[0].id, frame1[0].id);
        assert_eq!(assigner.track_count(), 2);
    }

    #[test]
    fn test_two_people_keep_distinct_ids() {
        let mut assigner = TrackAssigner::new(50.0, 3);

        let mut frame = vec![person_at(100.0, 100.0), person_at(500.0, 100.0)];
        assigner.assign(&mut frame, 0.3);
        assert_ne!(frame[0].id, frame[1].id);

        let mut next = vec![person_at(505.0, 102.0), person_at(98.0, 101.0)];
        assigner.assign(&mut next, 0.3);
        assert_eq!(next[0].id, frame[1].id);
        assert_eq!(next[1].id, frame[0].id);
    }

    #[test]
    fn test_track_expires_after_max_age() {
        let mut assigner = TrackAssigner::new(50.0, 2);

        let mut frame = vec![person_at(100.0, 100.0)];
        assigner.assign(&mut frame, 0.3);
        assert_eq!(assigner.track_count(), 1);

        // 3フレーム不在で破棄される
        for _ in 0..3 {
            assigner.assign(&mut [], 0.3);
        }
        assert_eq!(assigner.track_count(), 0);
    }
}
