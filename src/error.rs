//! 统一错误处理 - 迭代器误用与配置校验错误

/// 哈希表可能发生的错误
///
/// 容器本身的公共操作是全量的：键不存在以 end 迭代器或 `false` 表达，
/// 不会产生错误。错误仅覆盖迭代器误用与构造参数校验。
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("对 end 迭代器解引用")]
    EndIterator,

    #[error("通过读模式迭代器修改值")]
    ReadOnlyIterator,

    #[error("无效配置: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

impl MapError {
    /// 获取错误恢复建议
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::EndIterator => Some("解引用前先用 is_end 判断迭代器状态"),
            Self::ReadOnlyIterator => Some("使用 find_mut 获取写模式迭代器"),
            Self::InvalidConfig { .. } => Some("检查桶数量与压缩阈值参数"),
        }
    }

    /// 判断错误是否由迭代器误用引起
    pub fn is_iterator_error(&self) -> bool {
        matches!(self, Self::EndIterator | Self::ReadOnlyIterator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_suggestion_covers_all() {
        let errors = [
            MapError::EndIterator,
            MapError::ReadOnlyIterator,
            MapError::InvalidConfig { reason: "x".into() },
        ];
        for e in errors {
            assert!(e.recovery_suggestion().is_some());
        }
    }

    #[test]
    fn test_iterator_error_classification() {
        assert!(MapError::EndIterator.is_iterator_error());
        assert!(MapError::ReadOnlyIterator.is_iterator_error());
        assert!(!MapError::InvalidConfig { reason: "x".into() }.is_iterator_error());
    }
}
