use crate::buffer::RollingBuffer;
use serde::{Deserialize, Serialize};
use shikake_core::analysis::entity::DisplacementMove;
use shikake_core::common::Direction;
use shikake_core::market::entity::PriceBar;

const MAX_MOVES: usize = 50;

/// 仍可被后续 K 线延伸的位移的起点信息。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct MoveAnchor {
    open: f64,
    atr: f64,
}

/// # Summary
/// 单个周期的位移历史。
///
/// # Invariants
/// - `anchor` 与 `moves` 的最后一条对应。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplacementState {
    moves: Vec<DisplacementMove>,
    anchor: Option<MoveAnchor>,
}

impl DisplacementState {
    pub fn moves(&self) -> &[DisplacementMove] {
        &self.moves
    }

    pub fn latest(&self, direction: Direction) -> Option<&DisplacementMove> {
        self.moves.iter().rev().find(|m| m.direction == direction)
    }
}

/// # Summary
/// 位移检测的产出。
#[derive(Debug, Clone, PartialEq)]
pub enum DisplacementUpdate {
    // 新的位移，需要随之寻找订单块
    New(DisplacementMove),
    // 紧邻的同向 K 线延伸了上一段位移
    Extended(DisplacementMove),
}

impl DisplacementUpdate {
    pub fn movement(&self) -> &DisplacementMove {
        match self {
            DisplacementUpdate::New(m) | DisplacementUpdate::Extended(m) => m,
        }
    }
}

/// # Summary
/// 位移检测器：最近 k 根同向实体 K 线的净移动达到 ATR 的若干倍即为位移。
#[derive(Debug, Clone, Copy)]
pub struct DisplacementDetector {
    // ATR 倍数阈值
    min_size: f64,
    // 最多几根 K 线
    max_bars: usize,
}

impl DisplacementDetector {
    pub fn new(min_size: f64, max_bars: usize) -> Self {
        Self {
            min_size,
            max_bars: max_bars.max(1),
        }
    }

    /// # Summary
    /// 在新 K 线写入窗口后判断位移。
    ///
    /// # Logic
    /// 1. 最新 K 线无实体方向时不构成位移。
    /// 2. 若上一段位移同向且恰好结束于前一根，延伸它并按起点重新计算幅度。
    /// 3. 否则从最长窗口开始尝试 k = max_bars..=1：窗口内实体同向、起点晚于上一段位移，
    ///    且 `|close_last − open_first| / ATR_prev ≥ min_size`。ATR 取窗口首根之前的值。
    ///
    /// # Arguments
    /// * `state`: 该周期的位移状态。
    /// * `bars`: 已包含最新 K 线的窗口。
    /// * `atr_before`: 与 `bars` 对齐，每根 K 线之前的 ATR（预热期为 `None`）。
    ///
    /// # Returns
    /// 检测结果，无位移返回 `None`。
    pub fn update(
        &self,
        state: &mut DisplacementState,
        bars: &RollingBuffer<PriceBar>,
        atr_before: &RollingBuffer<Option<f64>>,
    ) -> Option<DisplacementUpdate> {
        let latest = bars.last()?;
        let direction = latest.body_direction()?;

        if let (Some(anchor), Some(previous), Some(last_move)) =
            (state.anchor, bars.back(1), state.moves.last_mut())
            && last_move.direction == direction
            && last_move.end_time == previous.timestamp
        {
            last_move.end_time = latest.timestamp;
            last_move.magnitude = (latest.close - anchor.open).abs() / anchor.atr;
            return Some(DisplacementUpdate::Extended(last_move.clone()));
        }

        let last_end = state.moves.last().map(|m| m.end_time);
        let len = bars.len();
        for k in (1..=self.max_bars.min(len)).rev() {
            let first_idx = len - k;
            let Some(first) = bars.get(first_idx) else {
                continue;
            };
            if last_end.is_some_and(|end| first.timestamp <= end) {
                continue;
            }
            let aligned = (first_idx..len)
                .filter_map(|i| bars.get(i))
                .all(|b| b.body_direction() == Some(direction));
            if !aligned {
                continue;
            }
            let Some(Some(atr)) = atr_before.get(first_idx).copied() else {
                continue;
            };
            if atr <= 0.0 {
                continue;
            }
            let magnitude = (latest.close - first.open).abs() / atr;
            if magnitude >= self.min_size {
                let movement = DisplacementMove {
                    timeframe: latest.timeframe,
                    start_time: first.timestamp,
                    end_time: latest.timestamp,
                    magnitude,
                    direction,
                };
                state.anchor = Some(MoveAnchor {
                    open: first.open,
                    atr,
                });
                state.moves.push(movement.clone());
                if state.moves.len() > MAX_MOVES {
                    let excess = state.moves.len() - MAX_MOVES;
                    state.moves.drain(..excess);
                }
                return Some(DisplacementUpdate::New(movement));
            }
        }
        None
    }
}
