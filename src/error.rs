use thiserror::Error;

/// 通信エラーの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ConnectionFailed,
    NotFound,
    RateLimited,
    Generic,
}

impl TransportErrorKind {
    /// HTTPステータスから分類
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => TransportErrorKind::NotFound,
            429 => TransportErrorKind::RateLimited,
            _ => TransportErrorKind::Generic,
        }
    }

    /// 利用者向けメッセージ
    pub fn user_message(&self) -> &'static str {
        match self {
            TransportErrorKind::ConnectionFailed => {
                "Could not connect to the analysis service. Please check your connection and try again."
            }
            TransportErrorKind::NotFound => "The requested analysis endpoint was not found.",
            TransportErrorKind::RateLimited => "Too many requests. Please wait a moment and try again.",
            TransportErrorKind::Generic => "The analysis request failed. Please try again.",
        }
    }
}

#[derive(Error, Debug)]
pub enum LocationInsightError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("無効な位置です: {0}")]
    InvalidLocation(String),

    #[error("{}: {message}", kind.user_message())]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("キャプチャ失敗: {0}")]
    Capture(String),

    #[error("PDF生成エラー: {0}")]
    PdfGeneration(String),

    #[error("failed to generate report, please retry ({0})")]
    ReportGeneration(String),

    #[error("ジオコーディング失敗: {0}")]
    Geocode(String),

    #[error("予期しないエラー: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Common(location_insight_common::Error),
}

impl LocationInsightError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        LocationInsightError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// 入力エラーか（呼び出し側が再入力を促す対象）
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LocationInsightError::InvalidLocation(_) | LocationInsightError::Geocode(_)
        )
    }
}

impl From<location_insight_common::Error> for LocationInsightError {
    fn from(err: location_insight_common::Error) -> Self {
        match err {
            location_insight_common::Error::InvalidLocation(msg) => {
                LocationInsightError::InvalidLocation(msg)
            }
            location_insight_common::Error::Parse(msg) => LocationInsightError::ApiParse(msg),
            other => LocationInsightError::Common(other),
        }
    }
}

impl From<reqwest::Error> for LocationInsightError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() || err.is_timeout() {
            TransportErrorKind::ConnectionFailed
        } else if let Some(status) = err.status() {
            TransportErrorKind::from_status(status.as_u16())
        } else {
            TransportErrorKind::Generic
        };
        LocationInsightError::transport(kind, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LocationInsightError>;
