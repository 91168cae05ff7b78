//! ManagerBuilder - TaskManager の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に設定を検証し、不正なら BuildError を返す
//! - Converter 未設定もここで弾く

use std::sync::Arc;

use crate::app::TaskManager;
use crate::config::ManagerConfig;
use crate::domain::BuildError;
use crate::ports::{Clock, Converter, IdGenerator, SystemClock, UlidGenerator};

/// Builds a [`TaskManager`].
///
/// # 使用例
/// ```ignore
/// let manager = ManagerBuilder::new()
///     .config(ManagerConfig::from_env())
///     .converter(Slp2Mp4Converter::new(ConverterConfig::from_env()))
///     .build()?;
/// manager.start().await?;
/// ```
pub struct ManagerBuilder {
    config: ManagerConfig,
    converter: Option<Arc<dyn Converter>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            converter: None,
            clock: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.config.max_queue_size = max_queue_size;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn converter<C: Converter + 'static>(self, converter: C) -> Self {
        self.shared_converter(Arc::new(converter))
    }

    pub fn shared_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Clock used for record timestamps and ids (defaults to the wall clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<TaskManager, BuildError> {
        let config = self.config;
        if config.max_queue_size == 0 {
            return Err(BuildError::ZeroQueueSize);
        }
        if config.workers == 0 {
            return Err(BuildError::ZeroWorkers);
        }
        if config.conversion_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BuildError::ZeroTimeout);
        }
        if config.eviction_interval.is_zero() {
            return Err(BuildError::ZeroEvictionInterval);
        }
        if config.retention.max_entries == Some(0) {
            // 0 件保持だと完了した瞬間に結果が消える
            return Err(BuildError::ZeroRetainedResults);
        }
        let converter = self.converter.ok_or(BuildError::MissingConverter)?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        Ok(TaskManager::new(config, converter, clock, ids))
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::ScriptedConverter;

    #[test]
    fn test_build_success() {
        let manager = ManagerBuilder::new()
            .converter(ScriptedConverter::new())
            .build();
        assert!(manager.is_ok());
    }

    #[test]
    fn test_build_missing_converter() {
        let manager = ManagerBuilder::new().build();
        assert!(matches!(manager, Err(BuildError::MissingConverter)));
    }

    #[test]
    fn test_build_rejects_zero_sizes() {
        let err = ManagerBuilder::new()
            .converter(ScriptedConverter::new())
            .max_queue_size(0)
            .build()
            .err();
        assert_eq!(err, Some(BuildError::ZeroQueueSize));

        let err = ManagerBuilder::new()
            .converter(ScriptedConverter::new())
            .workers(0)
            .build()
            .err();
        assert_eq!(err, Some(BuildError::ZeroWorkers));
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let config = ManagerConfig {
            conversion_timeout: Some(Duration::ZERO),
            ..ManagerConfig::default()
        };
        let err = ManagerBuilder::new()
            .converter(ScriptedConverter::new())
            .config(config)
            .build()
            .err();
        assert_eq!(err, Some(BuildError::ZeroTimeout));
    }

    #[test]
    fn test_build_rejects_zero_retained_results() {
        let mut config = ManagerConfig::default();
        config.retention.max_entries = Some(0);
        let err = ManagerBuilder::new()
            .converter(ScriptedConverter::new())
            .config(config)
            .build()
            .err();
        assert_eq!(err, Some(BuildError::ZeroRetainedResults));
    }
}
