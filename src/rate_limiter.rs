/// 速率限制器模块
///
/// 使用 token bucket 算法限制新连接的接受速率，在连接闸门之前检查
use anyhow::{Context, Result};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;

/// 速率限制器包装器
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

impl RateLimiter {
    /// 创建新的速率限制器
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        let per_second = NonZeroU32::new(config.requests_per_second)
            .context("rate_limit.requests_per_second must be > 0")?;
        let burst =
            NonZeroU32::new(config.burst_size).context("rate_limit.burst_size must be > 0")?;
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Ok(Self {
            inner: Arc::new(GovernorLimiter::direct(quota)),
            config,
        })
    }

    /// 尝试获取一个令牌（非阻塞）
    /// 返回 Ok(()) 如果允许请求，否则返回 Err(Duration) 表示需要等待的时间
    pub fn check(&self) -> std::result::Result<(), Duration> {
        match self.inner.check() {
            Ok(_) => Ok(()),
            Err(not_until) => Err(not_until.wait_time_from(DefaultClock::default().now())),
        }
    }

    /// 获取配置信息
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 10,
            burst_size: 20,
        })
        .unwrap();
        assert_eq!(limiter.config().requests_per_second, 10);
        assert_eq!(limiter.config().burst_size, 20);
    }

    #[test]
    fn test_rate_limiter_rejects_zero() {
        assert!(RateLimiter::new(RateLimitConfig {
            requests_per_second: 0,
            burst_size: 1,
        })
        .is_err());
        assert!(RateLimiter::new(RateLimitConfig {
            requests_per_second: 1,
            burst_size: 0,
        })
        .is_err());
    }

    #[test]
    fn test_rate_limiter_check() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 1,
            burst_size: 10,
        })
        .unwrap();

        // 前 10 个请求应该立即通过（burst_size）
        for _ in 0..10 {
            assert!(limiter.check().is_ok());
        }

        // 第 11 个请求应该被限流
        let wait = limiter.check().unwrap_err();
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn test_rate_limiter_clone_shares_state() {
        let limiter1 = RateLimiter::new(RateLimitConfig {
            requests_per_second: 1,
            burst_size: 3,
        })
        .unwrap();
        let limiter2 = limiter1.clone();

        for _ in 0..3 {
            assert!(limiter1.check().is_ok());
        }
        assert!(limiter2.check().is_err());
    }
}
