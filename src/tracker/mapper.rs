use anyhow::{bail, Result};
use rand::Rng;

/// 描画先の矩形範囲
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// 線形レンジマップ。クランプはしない
///
/// 範囲外の値はそのまま範囲外に写像される。境界チェックは呼び出し側の責務。
pub fn map_range(
    value: f32,
    source_min: f32,
    source_max: f32,
    dest_min: f32,
    dest_max: f32,
) -> Result<f32> {
    let span = source_max - source_min;
    if span == 0.0 {
        bail!(
            "degenerate source range {}..{} (would divide by zero)",
            source_min,
            source_max
        );
    }
    Ok((value - source_min) / span * (dest_max - dest_min) + dest_min)
}

/// ±amplitude/2 の一様な散らしオフセット
///
/// マッピング前のソース座標に加算して花の重なりを散らす。
pub fn scatter<R: Rng>(rng: &mut R, amplitude: f32) -> f32 {
    rng.gen::<f32>() * amplitude - amplitude * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_map_range_midpoint() {
        assert_eq!(map_range(320.0, 0.0, 640.0, 0.0, 1920.0).unwrap(), 960.0);
    }

    #[test]
    fn test_map_range_endpoints() {
        assert_eq!(map_range(0.0, 0.0, 640.0, 0.0, 1920.0).unwrap(), 0.0);
        assert_eq!(map_range(640.0, 0.0, 640.0, 0.0, 1920.0).unwrap(), 1920.0);
    }

    #[test]
    fn test_map_range_no_clamping() {
        assert_eq!(map_range(-640.0, 0.0, 640.0, 0.0, 1920.0).unwrap(), -1920.0);
        assert_eq!(map_range(1280.0, 0.0, 640.0, 0.0, 1920.0).unwrap(), 3840.0);
    }

    #[test]
    fn test_map_range_shifted_ranges() {
        assert_eq!(map_range(5.0, 0.0, 10.0, 100.0, 200.0).unwrap(), 150.0);
    }

    #[test]
    fn test_map_range_degenerate_source_fails() {
        assert!(map_range(1.0, 5.0, 5.0, 0.0, 100.0).is_err());
    }

    #[test]
    fn test_scatter_stays_in_half_amplitude() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let offset = scatter(&mut rng, 30.0);
            assert!((-15.0..=15.0).contains(&offset), "offset {}", offset);
        }
    }

    #[test]
    fn test_scatter_zero_amplitude() {
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(scatter(&mut rng, 0.0), 0.0);
    }
}
