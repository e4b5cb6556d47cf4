/// 生成サービス呼び出しのエラー分類とリトライ判定。
use anyhow::Error;
use reqwest::StatusCode;

/// エラーの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// 一時的なネットワークエラー、タイムアウト、不正な生成結果など
    Retryable,
    /// リクエスト自体が誤っている（4xx）
    NonRetryable,
    /// 認証・認可エラー
    Fatal,
}

/// 生成サービス由来のエラーを分類する。
///
/// HTTP 以外の失敗（タイムアウト、スキーマ違反の応答など）は
/// 同じ入力で再度生成すれば成功し得るため再試行可能とみなす。
#[must_use]
pub(crate) fn classify_error(error: &Error) -> ErrorKind {
    if let Some(reqwest_err) = error.downcast_ref::<reqwest::Error>() {
        if reqwest_err.is_timeout() || reqwest_err.is_connect() {
            return ErrorKind::Retryable;
        }

        if let Some(status) = reqwest_err.status() {
            return match status {
                StatusCode::TOO_MANY_REQUESTS => ErrorKind::Retryable,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Fatal,
                status if status.is_client_error() => ErrorKind::NonRetryable,
                _ => ErrorKind::Retryable,
            };
        }
    }

    ErrorKind::Retryable
}

#[must_use]
pub(crate) fn is_retryable(error: &Error) -> bool {
    matches!(classify_error(error), ErrorKind::Retryable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn non_http_failures_are_retryable() {
        let error = anyhow!("generation response failed schema validation");
        assert_eq!(classify_error(&error), ErrorKind::Retryable);
        assert!(is_retryable(&error));
    }
}
