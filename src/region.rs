use crate::tracker::Viewport;

/// 対象領域のヒットテスト
///
/// 点が「建築物の上」かどうかだけを答える。分類は temporary フラグにしか
/// 影響せず、イベントを発行するかどうかには関与しない。
pub trait RegionClassifier {
    /// 描画先座標の点が対象領域の内側か
    fn contains(&self, x: f32, y: f32) -> bool;
}

/// 対象領域なし。常に false を返す既定実装
pub struct NullRegion;

impl RegionClassifier for NullRegion {
    fn contains(&self, _x: f32, _y: f32) -> bool {
        false
    }
}

/// ビューポート比率で指定する矩形群
///
/// 前景シルエットのヒットテストの近似。各矩形は [x, y, w, h] の
/// 0.0〜1.0 比率で、リサイズしても意味が変わらない。
pub struct RectRegion {
    viewport: Viewport,
    rects: Vec<[f32; 4]>,
}

impl RectRegion {
    pub fn new(viewport: Viewport, rects: Vec<[f32; 4]>) -> Self {
        Self { viewport, rects }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

impl RegionClassifier for RectRegion {
    fn contains(&self, x: f32, y: f32) -> bool {
        let fx = x / self.viewport.width;
        let fy = y / self.viewport.height;
        self.rects
            .iter()
            .any(|[rx, ry, rw, rh]| fx >= *rx && fx <= rx + rw && fy >= *ry && fy <= ry + rh)
    }
}
