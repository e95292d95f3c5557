//! 公共响应类型：代理接口信封、后端结构化错误与统一 HTTP 响应处理

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

/// 后端（PostgREST 风格）结构化错误体
///
/// 用于区分唯一键冲突（23505）等可恢复错误与其他失败
#[derive(Debug, Clone, Deserialize)]
pub struct StoreErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// PostgreSQL 唯一约束冲突错误码
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// 后端请求失败（带 HTTP 状态与机器可读错误码）
#[derive(Debug, Clone)]
pub struct StoreError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        self.code == UNIQUE_VIOLATION_CODE
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "后端错误 HTTP {} code={}: {}",
            self.status, self.code, self.message
        )
    }
}

impl std::error::Error for StoreError {}

/// 读取后端行存储响应并反序列化
///
/// 非 2xx 时尝试解析结构化错误体，转成 [`StoreError`] 返回，
/// 调用方可通过 `downcast_ref::<StoreError>()` 检查错误码
pub async fn handle_store_response<T: DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<T> {
    let status = response.status();
    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| anyhow::anyhow!("读取{}响应 body 失败: {}", operation_name, e))?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        let err_body: StoreErrorBody =
            serde_json::from_slice(&body_bytes).unwrap_or_else(|_| StoreErrorBody {
                code: String::new(),
                message: body_str.to_string(),
                details: None,
                hint: None,
            });
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 错误码: {}, 错误信息: {}",
            operation_name, status, err_body.code, err_body.message
        );
        return Err(anyhow::Error::new(StoreError {
            status: status.as_u16(),
            code: err_body.code,
            message: err_body.message,
        }));
    }

    serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化{}响应失败: {:?}", operation_name, e)
    })
}

/// 只检查状态不解析成功体（用于 `Prefer: return=minimal` 的写入请求）
pub async fn handle_store_status(response: reqwest::Response, operation_name: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        debug!("[HTTP] {}成功，HTTP状态: {}", operation_name, status);
        return Ok(());
    }

    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| anyhow::anyhow!("读取{}响应 body 失败: {}", operation_name, e))?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    let err_body: StoreErrorBody =
        serde_json::from_slice(&body_bytes).unwrap_or_else(|_| StoreErrorBody {
            code: String::new(),
            message: body_str.to_string(),
            details: None,
            hint: None,
        });
    error!(
        "[HTTP] {}失败，HTTP状态: {}, 错误码: {}, 错误信息: {}",
        operation_name, status, err_body.code, err_body.message
    );
    Err(anyhow::Error::new(StoreError {
        status: status.as_u16(),
        code: err_body.code,
        message: err_body.message,
    }))
}

/// 代理接口信封解包结果：条目列表与（可选的）服务端总数
#[derive(Debug)]
pub struct Unwrapped<T> {
    pub items: Vec<T>,
    pub total: Option<u64>,
}

/// 解包政府开放资料代理接口的响应信封
///
/// 同一语义的响应在不同来源有三种形状，全部在这里收敛：
/// - 裸数组 `[...]`
/// - `{ success, result: [...] }`
/// - `{ success, result: { results: [...], count: N } }`
///
/// `success: false` 视为硬错误，携带信封内的 `error` 信息
pub fn unwrap_envelope<T: DeserializeOwned>(body: Value, source: &str) -> Result<Unwrapped<T>> {
    // 裸数组
    if body.is_array() {
        return Ok(Unwrapped {
            items: deserialize_items(body, source),
            total: None,
        });
    }

    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("未知错误")
            .to_string();
        error!("[Envelope] {} 信封标记失败: {}", source, reason);
        return Err(anyhow::anyhow!("{} 代理接口返回失败: {}", source, reason));
    }

    match body.get("result") {
        Some(result) if result.is_array() => Ok(Unwrapped {
            items: deserialize_items(result.clone(), source),
            total: None,
        }),
        Some(result) if result.is_object() => {
            let total = result.get("count").and_then(Value::as_u64);
            let items = result
                .get("results")
                .cloned()
                .unwrap_or(Value::Array(Vec::new()));
            Ok(Unwrapped {
                items: deserialize_items(items, source),
                total,
            })
        }
        _ => {
            warn!("[Envelope] {} 信封缺少 result 字段，按空列表处理", source);
            Ok(Unwrapped {
                items: Vec::new(),
                total: None,
            })
        }
    }
}

/// 逐条反序列化，坏记录跳过而不是整批失败
fn deserialize_items<T: DeserializeOwned>(items: Value, source: &str) -> Vec<T> {
    let Value::Array(items) = items else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("[Envelope] {} 跳过无法解析的记录: {:?}", source, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Item {
        id: String,
    }

    #[test]
    fn envelope_tolerates_three_shapes() {
        let bare = json!([{"id": "1"}, {"id": "2"}]);
        let wrapped = json!({"success": true, "result": [{"id": "1"}, {"id": "2"}]});
        let paged = json!({
            "success": true,
            "result": {"results": [{"id": "1"}, {"id": "2"}], "count": 17}
        });

        let a: Unwrapped<Item> = unwrap_envelope(bare, "test").unwrap();
        let b: Unwrapped<Item> = unwrap_envelope(wrapped, "test").unwrap();
        let c: Unwrapped<Item> = unwrap_envelope(paged, "test").unwrap();

        assert_eq!(a.items, b.items);
        assert_eq!(b.items, c.items);
        assert_eq!(a.total, None);
        assert_eq!(c.total, Some(17));
    }

    #[test]
    fn envelope_failure_is_hard_error() {
        let failed = json!({"success": false, "error": "上游逾時"});
        let err = unwrap_envelope::<Item>(failed, "hospitals").unwrap_err();
        assert!(err.to_string().contains("上游逾時"));
    }

    #[test]
    fn envelope_skips_bad_records() {
        let mixed = json!({"success": true, "result": [{"id": "1"}, {"id": 5}, "junk"]});
        let out: Unwrapped<Item> = unwrap_envelope(mixed, "test").unwrap();
        // id: 5 数字无法进 String 字段，junk 不是对象，都跳过
        assert_eq!(out.items.len(), 1);
    }

    #[test]
    fn store_error_detects_unique_violation() {
        let e = StoreError {
            status: 409,
            code: UNIQUE_VIOLATION_CODE.to_string(),
            message: "duplicate key value violates unique constraint".to_string(),
        };
        assert!(e.is_unique_violation());
    }
}
