use serde::{Deserialize, Serialize};

/// MoveNet の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    /// インスタレーションが消費する関節
    pub const WRISTS: [KeypointIndex; 2] = [KeypointIndex::LeftWrist, KeypointIndex::RightWrist];

    pub fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    const ALL: [KeypointIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// pose-detection 互換のワイヤ名
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// 単一キーポイント（ソースフレームのピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub score: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, score: f32) -> Self {
        Self { x, y, score }
    }

    pub fn is_valid(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// 検出された一人分の姿勢。`id` は検出側のトラッキングが割り当てる
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: u32,
    /// ポーズ全体のスコア
    pub score: f32,
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Person {
    pub fn new(id: u32, score: f32, keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self {
            id,
            score,
            keypoints,
        }
    }

    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 指定関節の観測を返す。信頼度が閾値未満なら None（このフレームでは欠損扱い）
    pub fn observe(&self, joint: KeypointIndex, min_score: f32) -> Option<Observation> {
        let kp = self.get(joint);
        if !kp.is_valid(min_score) {
            return None;
        }
        Some(Observation {
            person_id: self.id,
            joint,
            x: kp.x,
            y: kp.y,
        })
    }

    /// 有効なキーポイントの重心。トラッキングのマッチングに使う
    pub fn center(&self, min_score: f32) -> (f32, f32) {
        let mut sum = (0.0f32, 0.0f32);
        let mut n = 0usize;
        for kp in &self.keypoints {
            if kp.is_valid(min_score) {
                sum.0 += kp.x;
                sum.1 += kp.y;
                n += 1;
            }
        }
        if n == 0 {
            // 全キーポイントが低信頼なら無条件の平均にフォールバック
            for kp in &self.keypoints {
                sum.0 += kp.x;
                sum.1 += kp.y;
            }
            n = KeypointIndex::COUNT;
        }
        (sum.0 / n as f32, sum.1 / n as f32)
    }
}

/// ゲートに渡される一回分の観測（ソースピクセル空間）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub person_id: u32,
    pub joint: KeypointIndex,
    pub x: f32,
    pub y: f32,
}
