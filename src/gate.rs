/// 连接准入控制
///
/// 用互斥锁保护的计数器限制同时处理的连接数，满额时新连接直接关闭，不排队
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
struct GateState {
    in_use: usize,
    peak: usize,
}

/// 并发连接闸门
///
/// 克隆后共享同一个计数器，每个服务器实例各自持有一个
#[derive(Debug, Clone)]
pub struct ConnectionGate {
    state: Arc<Mutex<GateState>>,
    max_connections: usize,
}

impl ConnectionGate {
    /// 创建新的闸门
    pub fn new(max_connections: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState { in_use: 0, peak: 0 })),
            max_connections,
        }
    }

    /// 尝试占用一个连接槽位
    ///
    /// 检查与递增在同一个临界区内完成，满额时返回 false 且不改变计数
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.in_use >= self.max_connections {
            return false;
        }
        state.in_use += 1;
        state.peak = state.peak.max(state.in_use);
        true
    }

    /// 归还一个连接槽位
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.in_use == 0 {
            warn!("Connection gate released with no slot in use");
            return;
        }
        state.in_use -= 1;
    }

    /// 占用槽位并返回 RAII 守卫，drop 时自动归还
    pub fn try_admit(&self) -> Option<ConnectionSlot> {
        self.try_acquire().then(|| ConnectionSlot { gate: self.clone() })
    }

    /// 当前占用的槽位数
    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    /// 历史最高占用数
    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// 一个已占用的连接槽位
///
/// 无论连接正常结束、出错还是任务 panic，drop 时都只归还一次
#[derive(Debug)]
pub struct ConnectionSlot {
    gate: ConnectionGate,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_full() {
        let gate = ConnectionGate::new(2);
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert_eq!(gate.in_use(), 2);

        gate.release();
        assert_eq!(gate.in_use(), 1);
        assert!(gate.try_acquire());
        assert_eq!(gate.peak(), 2);
    }

    #[test]
    fn test_rejection_has_no_side_effect() {
        let gate = ConnectionGate::new(1);
        assert!(gate.try_acquire());
        for _ in 0..10 {
            assert!(!gate.try_acquire());
        }
        assert_eq!(gate.in_use(), 1);
    }

    #[test]
    fn test_release_never_goes_negative() {
        let gate = ConnectionGate::new(1);
        gate.release();
        assert_eq!(gate.in_use(), 0);
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn test_slot_releases_on_drop() {
        let gate = ConnectionGate::new(1);
        let slot = gate.try_admit().expect("slot available");
        assert!(gate.try_admit().is_none());
        drop(slot);
        assert_eq!(gate.in_use(), 0);
        assert!(gate.try_admit().is_some());
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let gate = ConnectionGate::new(0);
        assert!(!gate.try_acquire());
        assert!(gate.try_admit().is_none());
        assert_eq!(gate.peak(), 0);
    }

    #[test]
    fn test_clones_share_counter() {
        let gate = ConnectionGate::new(3);
        let other = gate.clone();
        let _a = gate.try_admit().unwrap();
        let _b = other.try_admit().unwrap();
        assert_eq!(gate.in_use(), 2);
        assert_eq!(other.in_use(), 2);
    }
}
