use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::pose::KeypointIndex;

/// 追跡対象の複合キー（人物 ID + 関節）
///
/// 文字列連結ではなく構造化タプルにすることで、ID の付け直しによる
/// キー衝突が起きても関節違いと混ざらない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub person_id: u32,
    pub joint: KeypointIndex,
}

impl EntityKey {
    pub fn new(person_id: u32, joint: KeypointIndex) -> Self {
        Self { person_id, joint }
    }
}

/// ゲートが所有する関節ごとの状態
#[derive(Debug)]
pub struct TrackedEntity {
    /// 最後に受理された観測位置（ソースピクセル空間）
    pub last_position: (f32, f32),
    /// 最後にスロットルを消費した時刻
    pub last_attempt: Option<Instant>,
    /// 最後に観測された時刻。eviction 判定に使う
    pub last_seen: Instant,
}

impl TrackedEntity {
    fn new(now: Instant) -> Self {
        Self {
            last_position: (0.0, 0.0),
            last_attempt: None,
            last_seen: now,
        }
    }
}

/// 追跡エンティティのレジストリ
///
/// ゲートに明示的に渡される所有オブジェクト。グローバル状態は持たない。
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<EntityKey, TrackedEntity>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// キーで検索し、無ければ既定値 (位置 (0,0)、スロットルなし) で作成する
    pub fn get_or_create(&mut self, key: EntityKey, now: Instant) -> &mut TrackedEntity {
        let entity = self
            .entries
            .entry(key)
            .or_insert_with(|| TrackedEntity::new(now));
        entity.last_seen = now;
        entity
    }

    pub fn get(&self, key: &EntityKey) -> Option<&TrackedEntity> {
        self.entries.get(key)
    }

    /// max_idle の間観測されていないエンティティを破棄する
    pub fn evict_idle(&mut self, now: Instant, max_idle: Duration) {
        self.entries
            .retain(|_, e| now.duration_since(e.last_seen) <= max_idle);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
