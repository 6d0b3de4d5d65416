use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::keypoint::{Keypoint, KeypointIndex, Person};

/// MoveNet MultiPose が一度に返すポーズ数の上限
pub const MAX_POSES: usize = 6;

/// ポーズごとの出力要素数: 17 * (y, x, score) + bbox(4) + pose score
const VALUES_PER_POSE: usize = KeypointIndex::COUNT * 3 + 5;

/// MoveNet MultiPose Lightning を使用した複数人姿勢検出器
pub struct MoveNetDetector {
    session: Session,
    min_pose_score: f32,
}

impl MoveNetDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, min_pose_score: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session,
            min_pose_score,
        })
    }

    /// 前処理済みテンソルから姿勢を検出する
    ///
    /// 入力: [1, 256, 256, 3] の i32 テンソル
    /// 出力: min_pose_score を超えたポーズ。id は検出インデックスのままで、
    /// フレーム間の対応付けは `TrackAssigner` が行う
    pub fn detect(
        &mut self,
        input: Array4<i32>,
        source_width: f32,
        source_height: f32,
    ) -> Result<Vec<Person>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // MultiPose の出力は [1, 6, 56]
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut people = Vec::new();

        for pose_idx in 0..MAX_POSES {
            let pose_score = output[[0, pose_idx, VALUES_PER_POSE - 1]];
            if pose_score < self.min_pose_score {
                continue;
            }

            let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
            for (k, slot) in keypoints.iter_mut().enumerate() {
                // 正規化座標 (y, x, score) をソースピクセルに展開
                let y = output[[0, pose_idx, k * 3]];
                let x = output[[0, pose_idx, k * 3 + 1]];
                let score = output[[0, pose_idx, k * 3 + 2]];
                *slot = Keypoint::new(x * source_width, y * source_height, score);
            }

            people.push(Person::new(pose_idx as u32, pose_score, keypoints));
        }

        Ok(people)
    }
}
