use serde::{Deserialize, Serialize};

/// # Summary
/// 固定容量的滚动环形缓冲区，保存每个周期最近的 K 线及其伴随数据。
///
/// # Invariants
/// - 内存空间在初始化时一次性分配，后续不再扩容。
/// - 始终保持最近 N 个元素；逻辑索引 0 为最旧，`len() - 1` 为最新。
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RollingBuffer<T> {
    // 内部存储容器
    data: Vec<T>,
    // 最大容量
    capacity: usize,
    // 已满时最旧元素所在的物理位置
    cursor: usize,
}

impl<T> RollingBuffer<T> {
    /// # Summary
    /// 创建一个新的滚动缓冲区。
    ///
    /// # Arguments
    /// * `capacity`: 固定容量上限，0 会被提升为 1。
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// # Summary
    /// 向缓冲区推送新元素。
    ///
    /// # Logic
    /// 1. 未满时直接 push。
    /// 2. 已满时覆盖 cursor 处最旧的数据，并递增（取模）cursor。
    pub fn push(&mut self, item: T) {
        if self.data.len() < self.capacity {
            self.data.push(item);
        } else {
            self.data[self.cursor] = item;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// # Summary
    /// 按逻辑索引（时间顺序）取元素。
    ///
    /// # Logic
    /// 物理位置 = (cursor + index) % len；未满时 cursor 恒为 0。
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.data.len() {
            return None;
        }
        self.data.get((self.cursor + index) % self.data.len())
    }

    /// 距最新元素 `back` 个位置的元素，`back = 0` 即最新。
    pub fn back(&self, back: usize) -> Option<&T> {
        let len = self.data.len();
        if back >= len {
            return None;
        }
        self.get(len - 1 - back)
    }

    /// 最新插入的元素。
    pub fn last(&self) -> Option<&T> {
        self.back(0)
    }

    /// # Summary
    /// 按插入顺序遍历全部元素。
    ///
    /// # Returns
    /// 从最旧到最新的迭代器，可 `rev()`。
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (tail, head) = self.data.split_at(self.cursor);
        head.iter().chain(tail.iter())
    }
}

impl<T: Clone> RollingBuffer<T> {
    /// # Summary
    /// 获取按插入顺序排序的完整数据列表。
    ///
    /// # Logic
    /// 已满时通过 cursor 切割并重组两段数据，确保返回的 Vec 有序。
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
