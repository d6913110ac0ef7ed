use thiserror::Error;

/// # Summary
/// 行情数据源错误枚举，处理网络、解析及数据缺失等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum FeedError {
    // 读取数据源失败（文件、网络等）
    #[error("Io error: {0}")]
    Io(String),
    // 数据解析错误，如 JSON 格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求的数据未找到
    #[error("Data not found")]
    NotFound,
}
