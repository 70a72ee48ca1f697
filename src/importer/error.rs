// ==========================================
// POS 导入系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 格式错误必须指明出错位置（表头 / 行号）
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .csv/.xlsx/.xls/.xlsm/.ods）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    // ===== 格式错误（整文件不可解析）=====
    #[error("文件格式错误 ({location}): {message}")]
    FormatError { location: String, message: String },

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn format(location: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::FormatError {
            location: location.into(),
            message: message.into(),
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        let location = err
            .position()
            .map(|p| format!("第 {} 行", p.line()))
            .unwrap_or_else(|| "CSV".to_string());
        ImportError::FormatError {
            location,
            message: err.to_string(),
        }
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::FormatError {
            location: "工作簿".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
