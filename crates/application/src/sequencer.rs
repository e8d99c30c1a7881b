use std::sync::Arc;

use dashmap::DashMap;
use domain::ChatRoomId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 按会话串行化消息写入
///
/// 同一会话内「分配时间戳 -> 持久化 -> 广播」在锁内完成，
/// 保证广播顺序与持久化顺序一致；不同会话之间互不阻塞。
#[derive(Clone, Default)]
pub struct RoomSequencer {
    locks: Arc<DashMap<ChatRoomId, Arc<Mutex<()>>>>,
}

/// 持有期间独占该会话的写入顺序，释放时回收空闲的锁
pub struct SequenceGuard {
    room: ChatRoomId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<ChatRoomId, Arc<Mutex<()>>>>,
}

impl RoomSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, room: ChatRoomId) -> SequenceGuard {
        let lock = self
            .locks
            .entry(room)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        SequenceGuard {
            room,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// 当前持有或等待中的会话锁数量
    pub fn active_rooms(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for SequenceGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 表里的一份加上各个等待者的克隆；只剩表里那份时说明无人等待
        self.locks
            .remove_if(&self.room, |_, lock| Arc::strong_count(lock) == 1);
    }
}
