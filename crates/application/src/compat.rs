//! 客户端版本建议
//!
//! 加入房间时客户端可以带上自己的版本号。配置了最低版本时，缺失、无法解析或更低的版本
//! 只会收到一条提示，加入流程照常进行。

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionAdvice {
    /// 未配置最低版本，或客户端版本足够新
    Current,
    Outdated {
        supplied: Option<String>,
        minimum: String,
    },
}

impl VersionAdvice {
    pub fn is_outdated(&self) -> bool {
        matches!(self, Self::Outdated { .. })
    }

    /// 发给客户端的提示文本
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Current => None,
            Self::Outdated {
                supplied: Some(supplied),
                minimum,
            } => Some(format!(
                "Your client version {supplied} is outdated, please update to {minimum} or newer."
            )),
            Self::Outdated {
                supplied: None,
                minimum,
            } => Some(format!(
                "Your client did not report a version, please update to {minimum} or newer."
            )),
        }
    }
}

pub fn check_client_version(minimum: Option<&str>, supplied: Option<&str>) -> VersionAdvice {
    let Some(minimum) = minimum else {
        return VersionAdvice::Current;
    };
    let outdated = || VersionAdvice::Outdated {
        supplied: supplied.map(str::to_owned),
        minimum: minimum.to_owned(),
    };

    let (Some(wanted), Some(have)) = (parse(minimum), supplied.and_then(parse)) else {
        return outdated();
    };

    match compare(&have, &wanted) {
        Ordering::Less => outdated(),
        Ordering::Equal | Ordering::Greater => VersionAdvice::Current,
    }
}

fn parse(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// 逐段比较，缺失的段按 0 处理（`1.1` 等于 `1.1.0`）
fn compare(left: &[u64], right: &[u64]) -> Ordering {
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| {
            let a = left.get(i).copied().unwrap_or(0);
            let b = right.get(i).copied().unwrap_or(0);
            a.cmp(&b)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
